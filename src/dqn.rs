use crate::agent::{Agent, AgentError};
use crate::batch::Batch;
use crate::buffer::SequentialMemory;
use crate::model::QNet;
use crate::policy::{GreedyQPolicy, QPolicy};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnConfig {
    pub obs_dim: usize,
    pub nb_actions: usize,
    pub hidden_dims: Vec<usize>,
    pub gamma: f64,
    pub memory_limit: usize,
    pub batch_size: usize,
    pub nb_steps_warmup: usize,
    pub train_interval: usize,
    /// At least 1: copy weights to the target network every that many
    /// steps. Below 1: blend them in at that rate after every update.
    pub target_model_update: f64,
    pub seed: Option<u64>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            obs_dim: 4,
            nb_actions: 2,
            hidden_dims: vec![64, 64],
            gamma: 0.99,
            memory_limit: 50_000,
            batch_size: 32,
            nb_steps_warmup: 50,
            train_interval: 1,
            target_model_update: 1e-2,
            seed: None,
        }
    }
}

pub struct DqnAgent {
    config: DqnConfig,

    // Model
    q_net: QNet,
    target_q_net: QNet,
    varmap: VarMap,
    target_varmap: VarMap,
    optimizer: Option<AdamW>,
    device: Device,

    policy: Box<dyn QPolicy>,
    test_policy: Box<dyn QPolicy>,
    memory: SequentialMemory<Vec<f64>, usize>,
    recent: Option<(Vec<f64>, usize)>,
    training: bool,
    step: usize,
    rng: StdRng,
}

impl DqnAgent {
    pub fn new(config: DqnConfig, policy: impl QPolicy + 'static) -> Result<Self, AgentError> {
        let device = Device::Cpu;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &device);
        let q_net = QNet::new(config.obs_dim, &config.hidden_dims, config.nb_actions, vb)?;

        // Same layer names in a separate store, so weights map one to one.
        let target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&target_varmap, DType::F64, &device);
        let target_q_net =
            QNet::new(config.obs_dim, &config.hidden_dims, config.nb_actions, target_vb)?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            memory: SequentialMemory::new(config.memory_limit),
            config,
            q_net,
            target_q_net,
            varmap,
            target_varmap,
            optimizer: None,
            device,
            policy: Box::new(policy),
            test_policy: Box::new(GreedyQPolicy),
            recent: None,
            training: false,
            step: 0,
            rng,
        })
    }

    pub fn with_test_policy(mut self, policy: impl QPolicy + 'static) -> Self {
        self.test_policy = Box::new(policy);
        self
    }

    pub fn compile(&mut self, lr: f64) -> Result<(), AgentError> {
        let params = ParamsAdamW {
            lr,
            ..Default::default()
        };
        self.optimizer = Some(AdamW::new(self.varmap.all_vars(), params)?);
        self.sync_target(1.0)?;
        Ok(())
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn QPolicy {
        &*self.policy
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<(), AgentError> {
        self.varmap.save(path)?;
        Ok(())
    }

    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<(), AgentError> {
        self.varmap.load(path)?;
        self.sync_target(1.0)
    }

    pub fn q_values(&self, obs: &[f64]) -> Result<Tensor, AgentError> {
        self.q_values_with(&self.q_net, obs)
    }

    fn q_values_with(&self, net: &QNet, obs: &[f64]) -> Result<Tensor, AgentError> {
        if obs.len() != self.config.obs_dim {
            return Err(AgentError::ObservationShape {
                expected: self.config.obs_dim,
                got: obs.len(),
            });
        }
        let xs = Tensor::from_vec(obs.to_vec(), (1, self.config.obs_dim), &self.device)?;
        Ok(net.forward(&xs)?.squeeze(0)?)
    }

    // target <- tau * online + (1 - tau) * target
    fn sync_target(&self, tau: f64) -> Result<(), AgentError> {
        let online = self.varmap.data().lock().map_err(|_| AgentError::Poisoned)?;
        let target = self
            .target_varmap
            .data()
            .lock()
            .map_err(|_| AgentError::Poisoned)?;
        for (name, var) in online.iter() {
            let Some(target_var) = target.get(name) else {
                continue;
            };
            if tau >= 1.0 {
                target_var.set(var.as_tensor())?;
            } else {
                let blended = var
                    .as_tensor()
                    .affine(tau, 0.0)?
                    .add(&target_var.as_tensor().affine(1.0 - tau, 0.0)?)?;
                target_var.set(&blended)?;
            }
        }
        Ok(())
    }

    fn train_on_batch(&mut self, batch: &Batch<Vec<f64>, usize>) -> Result<Vec<f64>, AgentError> {
        let b_size = batch.len();
        let dim = self.config.obs_dim;

        // 1. Prepare Tensors
        let obs = Tensor::from_vec(batch.obs.concat(), (b_size, dim), &self.device)?;
        let next_obs = Tensor::from_vec(batch.obs_next.concat(), (b_size, dim), &self.device)?;
        let acts_idx: Vec<u32> = batch.act.iter().map(|&a| a as u32).collect();
        let action_idx = Tensor::from_vec(acts_idx, (b_size, 1), &self.device)?;
        let reward = Tensor::from_vec(batch.rew.clone(), (b_size, 1), &self.device)?;
        let not_done: Vec<f64> = batch
            .done
            .iter()
            .map(|&d| if d { 0.0 } else { 1.0 })
            .collect();
        let not_done = Tensor::from_vec(not_done, (b_size, 1), &self.device)?;

        // 2. Target: r + gamma * max_a' Q_target(s', a'), zero past the end
        let max_next_q = self.target_q_net.forward(&next_obs)?.max_keepdim(1)?;
        let target_q = reward
            .add(&max_next_q.mul(&not_done)?.affine(self.config.gamma, 0.0)?)?
            .detach();

        // 3. Current Q for the taken actions
        let q_values = self.q_net.forward(&obs)?;
        let current_q = q_values.gather(&action_idx, 1)?;

        // 4. Loss
        let loss = current_q.sub(&target_q)?.sqr()?.mean_all()?;

        // 5. Optimize
        let optimizer = self.optimizer.as_mut().ok_or(AgentError::NotCompiled)?;
        optimizer.backward_step(&loss)?;

        let mean_q = q_values.max(1)?.mean_all()?.to_scalar::<f64>()?;
        Ok(vec![loss.to_scalar::<f64>()?, mean_q])
    }

    fn no_metrics(&self) -> Vec<f64> {
        vec![f64::NAN; 2]
    }
}

impl Agent for DqnAgent {
    type Observation = Vec<f64>;
    type Action = usize;

    fn name(&self) -> &str {
        "dqn"
    }

    fn is_compiled(&self) -> bool {
        self.optimizer.is_some()
    }

    fn reset_states(&mut self) {
        self.recent = None;
    }

    fn forward(&mut self, obs: &Self::Observation) -> Result<Self::Action, AgentError> {
        let q_values = self.q_values(obs)?;
        let action = if self.training {
            self.policy.select_action(&q_values)?
        } else {
            self.test_policy.select_action(&q_values)?
        };
        self.recent = Some((obs.clone(), action));
        Ok(action)
    }

    fn backward(&mut self, reward: f64, terminal: bool) -> Result<Vec<f64>, AgentError> {
        let (obs, action) = self.recent.take().ok_or(AgentError::NoRecentAction)?;
        if !self.training {
            return Ok(self.no_metrics());
        }
        self.memory.append(obs, action, reward, terminal);

        let interval = self.config.train_interval.max(1);
        if self.step <= self.config.nb_steps_warmup || self.step % interval != 0 {
            return Ok(self.no_metrics());
        }
        let Some(batch) = self.memory.sample(self.config.batch_size, &mut self.rng) else {
            return Ok(self.no_metrics());
        };
        let metrics = self.train_on_batch(&batch)?;

        let update = self.config.target_model_update;
        if update >= 1.0 {
            if self.step % (update as usize) == 0 {
                self.sync_target(1.0)?;
            }
        } else {
            self.sync_target(update)?;
        }
        Ok(metrics)
    }

    fn metrics_names(&self) -> Vec<String> {
        vec!["loss".to_string(), "mean_q".to_string()]
    }

    fn step(&self) -> usize {
        self.step
    }

    fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn on_train_begin(&mut self) {
        tracing::debug!(
            memory = self.memory.len(),
            policy = ?self.policy.config(),
            "dqn training begins"
        );
    }
}
