//! Replay buffer storing transitions in a fixed-capacity ring.
//!
//! [`SimpleReplayBuffer`] overwrites the slot at its write cursor once full
//! and samples uniformly with replacement. [`SharedReplayBuffer`] wraps it in
//! a mutex so that the controller loop and the trainer can use it from
//! different threads without tearing transitions.
mod base;
mod config;
mod shared;
pub use base::SimpleReplayBuffer;
pub use config::SimpleReplayBufferConfig;
pub use shared::SharedReplayBuffer;
