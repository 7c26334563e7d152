//! Episode-driven training for Deep Q-Network agents.
//!
//! [`trainer::Trainer`] runs a fixed number of whole episodes against an
//! [`env::Environment`], alternating the agent's forward (act) and backward
//! (learn) passes. [`policy`] holds the action-selection policies, notably
//! Boltzmann sampling with and without epsilon-greedy mixing.

pub mod agent;
pub mod batch;
pub mod buffer;
pub mod callbacks;
pub mod cartpole;
pub mod dqn;
pub mod env;
pub mod mock;
pub mod model;
pub mod policy;
pub mod processor;
pub mod trainer;

pub use agent::{Agent, AgentError};
pub use callbacks::{Callback, EpisodeLogs, History, StepLogs};
pub use env::{EnvError, Environment, Info, InfoValue, Step};
pub use policy::{BoltzmannQPolicy, EpsBoltzmannQPolicy, QPolicy};
pub use processor::{NoProcessor, Processor};
pub use trainer::{TrainError, Trainer, TrainerConfig};
