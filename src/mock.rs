use crate::agent::{Agent, AgentError};
use crate::env::{EnvResult, EnvSpec, Environment, Info, InfoValue, Step};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Counting environment: the observation goes 0 -> 1 -> 2 ... and the
/// episode ends after `max_steps` steps. Every step pays 1.0.
#[derive(Debug, Clone)]
pub struct MockEnv {
    obs: f64,
    count: usize,
    max_steps: usize,
    nb_actions: usize,
    info: Info,
    rng: StdRng,

    pub resets: usize,
    pub steps: usize,
    pub renders: usize,
}

impl MockEnv {
    pub fn new(max_steps: usize) -> Self {
        Self {
            obs: 0.0,
            count: 0,
            max_steps,
            nb_actions: 2,
            info: Info::new(),
            rng: StdRng::seed_from_u64(0),
            resets: 0,
            steps: 0,
            renders: 0,
        }
    }

    pub fn with_info(mut self, key: &str, value: impl Into<InfoValue>) -> Self {
        self.info.insert(key.to_string(), value.into());
        self
    }
}

impl Environment for MockEnv {
    type Observation = f64;
    type Action = usize;

    fn step(&mut self, _action: Self::Action) -> EnvResult<Step<Self::Observation>> {
        self.steps += 1;
        self.count += 1;
        self.obs += 1.0;
        let done = self.count >= self.max_steps;

        Ok(Step {
            obs: self.obs,
            reward: 1.0,
            done,
            info: self.info.clone(),
        })
    }

    fn reset(&mut self) -> EnvResult<Self::Observation> {
        self.resets += 1;
        self.obs = 0.0;
        self.count = 0;
        Ok(self.obs)
    }

    fn sample_action(&mut self) -> Self::Action {
        self.rng.gen_range(0..self.nb_actions)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn render(&mut self) -> EnvResult<()> {
        self.renders += 1;
        Ok(())
    }

    fn spec(&self) -> EnvSpec {
        EnvSpec {
            name: "mock".to_string(),
            nb_actions: Some(self.nb_actions),
        }
    }
}

/// Agent that always picks action 0 and records every call it receives.
#[derive(Debug, Default)]
pub struct MockAgent {
    compiled: bool,
    step: usize,

    pub observations: Vec<f64>,
    pub backward_calls: Vec<(f64, bool)>,
    pub reset_calls: usize,
    pub train_begin_calls: usize,
    pub train_end_calls: usize,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled() -> Self {
        Self {
            compiled: true,
            ..Self::default()
        }
    }

    pub fn forward_calls(&self) -> usize {
        self.observations.len()
    }
}

impl Agent for MockAgent {
    type Observation = f64;
    type Action = usize;

    fn name(&self) -> &str {
        "mock"
    }

    fn is_compiled(&self) -> bool {
        self.compiled
    }

    fn reset_states(&mut self) {
        self.reset_calls += 1;
    }

    fn forward(&mut self, obs: &Self::Observation) -> Result<Self::Action, AgentError> {
        self.observations.push(*obs);
        Ok(0)
    }

    fn backward(&mut self, reward: f64, terminal: bool) -> Result<Vec<f64>, AgentError> {
        self.backward_calls.push((reward, terminal));
        Ok(vec![reward])
    }

    fn metrics_names(&self) -> Vec<String> {
        vec!["reward".to_string()]
    }

    fn step(&self) -> usize {
        self.step
    }

    fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    fn on_train_begin(&mut self) {
        self.train_begin_calls += 1;
    }

    fn on_train_end(&mut self) {
        self.train_end_calls += 1;
    }
}
