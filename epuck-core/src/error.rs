//! Errors in the library.
use thiserror::Error;

/// Errors raised by the replay buffer and the DDPG agent.
///
/// Fallible operations return [`anyhow::Result`]; callers that need to react
/// to a specific condition can `downcast_ref::<DdpgError>()` the error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DdpgError {
    /// Sampling was requested from a buffer holding no transitions.
    #[error("Cannot sample from an empty replay buffer")]
    EmptyStore,

    /// A training step was requested with no transitions in the batch.
    #[error("Cannot run a training step on an empty batch")]
    EmptyBatch,

    /// Input dimensionality does not match the configured one.
    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which input was malformed.
        what: String,

        /// Expected length or shape.
        expected: String,

        /// Received length or shape.
        actual: String,
    },

    /// A loss became NaN or infinite; training must stop.
    #[error("Training diverged: {loss} is {value}")]
    DivergedTraining {
        /// Name of the offending loss.
        loss: String,

        /// Non-finite value that was observed.
        value: f32,
    },

    /// Live and target networks do not share the same parameter structure.
    #[error("Parameter mismatch between live and target networks: {0}")]
    ParameterMismatch(String),

    /// Standard deviation of the exploration noise is negative or not finite.
    #[error("Invalid noise scale: {0}")]
    InvalidNoiseScale(f64),

    /// A configuration value is out of its admissible range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

impl DdpgError {
    /// Builds [`DdpgError::ShapeMismatch`] from anything printable.
    pub fn shape_mismatch(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }
}
