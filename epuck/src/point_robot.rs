//! One-dimensional robot that has to reach the origin.
use anyhow::Result;
use epuck_core::error::DdpgError;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration of [`PointRobot`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PointRobotConfig {
    /// Displacement for a unit action.
    pub step_size: f32,

    /// The episode terminates when `|x| < goal_tolerance`.
    pub goal_tolerance: f32,

    /// The episode is truncated after this number of steps.
    pub max_episode_steps: usize,

    /// Seed of the initial positions.
    pub seed: u64,
}

impl Default for PointRobotConfig {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            goal_tolerance: 0.05,
            max_episode_steps: 50,
            seed: 0,
        }
    }
}

impl PointRobotConfig {
    /// Sets the displacement for a unit action.
    pub fn step_size(mut self, v: f32) -> Self {
        self.step_size = v;
        self
    }

    /// Sets the goal tolerance.
    pub fn goal_tolerance(mut self, v: f32) -> Self {
        self.goal_tolerance = v;
        self
    }

    /// Sets the maximum length of an episode.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }
}

/// Outcome of [`PointRobot::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Observation after the action.
    pub next_state: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// The robot reached the goal.
    pub is_terminated: bool,

    /// The episode hit its step limit.
    pub is_truncated: bool,
}

impl Step {
    /// Terminated or truncated.
    pub fn is_done(&self) -> bool {
        self.is_terminated || self.is_truncated
    }
}

/// A point on `[-1, 1]` driven by a velocity command in `[-1, 1]`.
///
/// The state is the position `x`. An action `v` moves the robot to
/// `clamp(x + step_size * v, -1, 1)` and yields the reward `-|x'|`.
pub struct PointRobot {
    config: PointRobotConfig,
    x: f32,
    n_steps: usize,
    rng: StdRng,
}

impl PointRobot {
    /// Dimension of states.
    pub const STATE_DIM: usize = 1;

    /// Dimension of actions.
    pub const ACT_DIM: usize = 1;

    /// Constructs the environment. Call [`PointRobot::reset`] before stepping.
    pub fn build(config: &PointRobotConfig) -> Result<Self> {
        if !(config.step_size > 0.0) {
            return Err(DdpgError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                config.step_size
            ))
            .into());
        }
        // Episodes start at a distance in [goal_tolerance, 1).
        if !(config.goal_tolerance > 0.0 && config.goal_tolerance < 1.0) {
            return Err(DdpgError::InvalidConfig(format!(
                "goal_tolerance must be in (0, 1), got {}",
                config.goal_tolerance
            ))
            .into());
        }
        Ok(Self {
            config: config.clone(),
            x: 0.0,
            n_steps: 0,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Starts an episode at a random position away from the goal.
    pub fn reset(&mut self) -> Vec<f32> {
        let tol = self.config.goal_tolerance;
        let x = self.rng.gen_range(tol..1.0);
        self.x = match self.rng.gen_bool(0.5) {
            true => x,
            false => -x,
        };
        self.n_steps = 0;
        vec![self.x]
    }

    /// Applies a velocity command.
    pub fn step(&mut self, action: &[f32]) -> Result<Step> {
        if action.len() != Self::ACT_DIM {
            return Err(DdpgError::shape_mismatch("action", Self::ACT_DIM, action.len()).into());
        }
        let v = action[0].clamp(-1.0, 1.0);
        self.x = (self.x + self.config.step_size * v).clamp(-1.0, 1.0);
        self.n_steps += 1;

        let is_terminated = self.x.abs() < self.config.goal_tolerance;
        Ok(Step {
            next_state: vec![self.x],
            reward: -self.x.abs(),
            is_terminated,
            is_truncated: !is_terminated && self.n_steps >= self.config.max_episode_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_away_from_goal() -> Result<()> {
        let mut env = PointRobot::build(&PointRobotConfig::default())?;
        for _ in 0..100 {
            let x = env.reset()[0];
            assert!(x.abs() >= 0.05 && x.abs() <= 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_step_dynamics() -> Result<()> {
        let mut env = PointRobot::build(&PointRobotConfig::default())?;
        env.x = 0.5;

        let step = env.step(&[-1.0])?;
        assert!((step.next_state[0] - 0.4).abs() < 1e-6);
        assert!((step.reward + 0.4).abs() < 1e-6);
        assert!(!step.is_done());

        // Commands are clipped to the unit interval.
        let step = env.step(&[-30.0])?;
        assert!((step.next_state[0] - 0.3).abs() < 1e-6);

        env.x = 0.99;
        assert_eq!(env.step(&[1.0])?.next_state, vec![1.0]);
        Ok(())
    }

    #[test]
    fn test_termination_and_truncation() -> Result<()> {
        let config = PointRobotConfig::default().max_episode_steps(3);
        let mut env = PointRobot::build(&config)?;

        env.reset();
        env.x = 0.12;
        let step = env.step(&[-1.0])?;
        assert!(step.is_terminated && !step.is_truncated);

        env.reset();
        env.x = 1.0;
        assert!(!env.step(&[0.0])?.is_done());
        assert!(!env.step(&[0.0])?.is_done());
        let step = env.step(&[0.0])?;
        assert!(step.is_truncated && !step.is_terminated);
        Ok(())
    }

    #[test]
    fn test_build_rejects_goal_tolerance_out_of_range() {
        for tol in [0.0, -0.1, 1.0, 2.0, f32::NAN] {
            let config = PointRobotConfig::default().goal_tolerance(tol);
            let err = PointRobot::build(&config).err().unwrap();
            assert!(
                matches!(
                    err.downcast_ref::<DdpgError>(),
                    Some(DdpgError::InvalidConfig(_))
                ),
                "goal_tolerance = {}",
                tol
            );
        }

        // The largest accepted tolerance still leaves room for a reset.
        let config = PointRobotConfig::default().goal_tolerance(0.99);
        let x = PointRobot::build(&config).unwrap().reset()[0];
        assert!(x.abs() >= 0.99 && x.abs() < 1.0);
    }

    #[test]
    fn test_wrong_action_dim() -> Result<()> {
        let mut env = PointRobot::build(&PointRobotConfig::default())?;
        env.reset();
        assert!(env.step(&[0.0, 0.0]).is_err());
        Ok(())
    }
}
