use crate::policy::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent has not been compiled")]
    NotCompiled,
    #[error("backward called before any forward pass")]
    NoRecentAction,
    #[error("observation has {got} features, expected {expected}")]
    ObservationShape { expected: usize, got: usize },
    #[error("variable store is poisoned")]
    Poisoned,
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// A learning agent driven by the trainer.
pub trait Agent {
    type Observation;
    type Action;

    fn name(&self) -> &str {
        "agent"
    }

    fn is_compiled(&self) -> bool;

    fn reset_states(&mut self);
    fn forward(&mut self, obs: &Self::Observation) -> Result<Self::Action, AgentError>;
    fn backward(&mut self, reward: f64, terminal: bool) -> Result<Vec<f64>, AgentError>;

    fn metrics_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn step(&self) -> usize;
    fn set_step(&mut self, step: usize);

    fn set_training(&mut self, _training: bool) {}
    fn on_train_begin(&mut self) {}
    fn on_train_end(&mut self) {}
}
