#![warn(missing_docs)]
//! Core types of the e-puck DDPG learner.
//!
//! This crate holds everything that does not depend on a tensor backend:
//! the [`Transition`] record produced by the robot controller, the ring
//! replay buffer in [`replay_buffer`], training [`record`]s and the
//! [`error::DdpgError`] taxonomy shared with the agent crate.
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{ExperienceBufferBase, ReplayBufferBase};

mod transition;
pub use transition::{Transition, TransitionBatch};

/// Number of inputs read by the e-puck controller per step.
///
/// Three ground sensors, eight proximity sensors and eight light sensors,
/// each normalised to `[0, 1]` by the controller.
pub const EPUCK_STATE_DIM: usize = 19;

/// Number of outputs of the e-puck policy: left and right wheel velocity.
pub const EPUCK_ACT_DIM: usize = 2;
