//! Deep deterministic policy gradient (DDPG) agent.
mod actor;
mod base;
mod config;
mod critic;
mod shared;
mod target;
pub use actor::{Actor, ActorConfig};
pub use base::{Ddpg, TrainStats};
pub use config::DdpgConfig;
pub use critic::{Critic, CriticConfig, FrozenCritic};
pub use shared::SharedDdpg;
pub use target::TargetNetwork;
