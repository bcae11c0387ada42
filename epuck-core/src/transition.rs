//! Transitions and batches of transitions.
use crate::error::DdpgError;
use anyhow::Result;

/// One interaction of the robot with its environment.
///
/// Created once per controller step and never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    state: Vec<f32>,
    action: Vec<f32>,
    reward: f32,
    next_state: Vec<f32>,
    done: bool,
}

impl Transition {
    /// Creates a transition.
    pub fn new(
        state: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }

    /// Observation before the action.
    pub fn state(&self) -> &[f32] {
        &self.state
    }

    /// Action taken.
    pub fn action(&self) -> &[f32] {
        &self.action
    }

    /// Reward received.
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Observation after the action.
    pub fn next_state(&self) -> &[f32] {
        &self.next_state
    }

    /// `true` if the episode terminated with this transition.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fails with [`DdpgError::ShapeMismatch`] unless the vectors have the given lengths.
    pub fn check_dims(&self, state_dim: usize, act_dim: usize) -> Result<()> {
        if self.state.len() != state_dim {
            return Err(DdpgError::shape_mismatch("state", state_dim, self.state.len()).into());
        }
        if self.next_state.len() != state_dim {
            return Err(
                DdpgError::shape_mismatch("next_state", state_dim, self.next_state.len()).into(),
            );
        }
        if self.action.len() != act_dim {
            return Err(DdpgError::shape_mismatch("action", act_dim, self.action.len()).into());
        }
        Ok(())
    }
}

/// A batch of transitions as five parallel sequences.
///
/// Vector fields are stored row-major, so `state` has `len() * state_dim`
/// elements and row `i` is `state[i * state_dim..(i + 1) * state_dim]`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch {
    pub(crate) state_dim: usize,
    pub(crate) act_dim: usize,
    pub(crate) state: Vec<f32>,
    pub(crate) action: Vec<f32>,
    pub(crate) reward: Vec<f32>,
    pub(crate) next_state: Vec<f32>,
    pub(crate) is_done: Vec<i8>,

    /// Buffer slots the rows were taken from.
    pub(crate) ix_sample: Option<Vec<usize>>,
}

impl TransitionBatch {
    /// Stacks transitions into a batch.
    ///
    /// Every transition must have the given dimensions.
    pub fn from_transitions(
        transitions: &[Transition],
        state_dim: usize,
        act_dim: usize,
    ) -> Result<Self> {
        let n = transitions.len();
        let mut batch = Self {
            state_dim,
            act_dim,
            state: Vec::with_capacity(n * state_dim),
            action: Vec::with_capacity(n * act_dim),
            reward: Vec::with_capacity(n),
            next_state: Vec::with_capacity(n * state_dim),
            is_done: Vec::with_capacity(n),
            ix_sample: None,
        };

        for tr in transitions.iter() {
            tr.check_dims(state_dim, act_dim)?;
            batch.state.extend_from_slice(&tr.state);
            batch.action.extend_from_slice(&tr.action);
            batch.reward.push(tr.reward);
            batch.next_state.extend_from_slice(&tr.next_state);
            batch.is_done.push(tr.done as i8);
        }

        Ok(batch)
    }

    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Dimension of states.
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Dimension of actions.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Row-major states, `len() * state_dim` values.
    pub fn states(&self) -> &[f32] {
        &self.state
    }

    /// Row-major actions, `len() * act_dim` values.
    pub fn actions(&self) -> &[f32] {
        &self.action
    }

    /// Rewards.
    pub fn rewards(&self) -> &[f32] {
        &self.reward
    }

    /// Row-major next states, `len() * state_dim` values.
    pub fn next_states(&self) -> &[f32] {
        &self.next_state
    }

    /// Termination flags, `1` for the last transition of an episode.
    pub fn is_done(&self) -> &[i8] {
        &self.is_done
    }

    /// Buffer slots of the sampled rows, if the batch came from a buffer.
    pub fn ix_sample(&self) -> Option<&[usize]> {
        self.ix_sample.as_deref()
    }

    /// State of row `i`.
    pub fn state(&self, i: usize) -> &[f32] {
        &self.state[i * self.state_dim..(i + 1) * self.state_dim]
    }

    /// Action of row `i`.
    pub fn action(&self, i: usize) -> &[f32] {
        &self.action[i * self.act_dim..(i + 1) * self.act_dim]
    }

    /// Next state of row `i`.
    pub fn next_state(&self, i: usize) -> &[f32] {
        &self.next_state[i * self.state_dim..(i + 1) * self.state_dim]
    }
}
