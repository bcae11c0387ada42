//! Training demo of the e-puck DDPG learner.
//!
//! [`point_robot::PointRobot`] stands in for the simulated robot: the
//! [`trainer::Trainer`] drives it with a
//! [`Ddpg`](epuck_candle_agent::ddpg::Ddpg) agent and a
//! [`SimpleReplayBuffer`](epuck_core::replay_buffer::SimpleReplayBuffer)
//! the same way the robot controller does.
pub mod point_robot;
pub mod trainer;
