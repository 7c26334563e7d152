use crate::env::{EnvSpec, Info};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct FitParams {
    pub nb_episodes: usize,
    pub action_repetition: usize,
    pub nb_max_start_steps: usize,
    pub nb_max_episode_steps: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub metrics_names: Vec<String>,
}

pub struct StepLogs<'a, O, A> {
    pub action: &'a A,
    pub observation: &'a O,
    pub reward: f64,
    pub metrics: &'a [f64],
    pub episode: usize,
    pub info: &'a Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeLogs {
    pub episode_reward: f64,
    pub nb_episode_steps: usize,
    pub nb_steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainLogs {
    pub did_abort: bool,
}

/// Hooks invoked by the trainer. All default to no-ops.
pub trait Callback<O, A> {
    fn set_params(&mut self, _params: &FitParams) {}
    fn set_env(&mut self, _env: &EnvSpec) {}
    fn set_model(&mut self, _model: &ModelSpec) {}

    fn on_train_begin(&mut self) {}
    fn on_train_end(&mut self, _logs: &TrainLogs) {}
    fn on_episode_begin(&mut self, _episode: usize) {}
    fn on_episode_end(&mut self, _episode: usize, _logs: &EpisodeLogs) {}
    fn on_step_begin(&mut self, _step: usize) {}
    fn on_step_end(&mut self, _step: usize, _logs: &StepLogs<'_, O, A>) {}
    fn on_action_begin(&mut self, _action: &A) {}
    fn on_action_end(&mut self, _action: &A) {}
}

pub struct CallbackList<O, A> {
    callbacks: Vec<Box<dyn Callback<O, A>>>,
}

impl<O, A> CallbackList<O, A> {
    pub fn new(callbacks: Vec<Box<dyn Callback<O, A>>>) -> Self {
        Self { callbacks }
    }

    pub fn push(&mut self, callback: Box<dyn Callback<O, A>>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn into_inner(self) -> Vec<Box<dyn Callback<O, A>>> {
        self.callbacks
    }
}

impl<O, A> Callback<O, A> for CallbackList<O, A> {
    fn set_params(&mut self, params: &FitParams) {
        for cb in self.callbacks.iter_mut() {
            cb.set_params(params);
        }
    }

    fn set_env(&mut self, env: &EnvSpec) {
        for cb in self.callbacks.iter_mut() {
            cb.set_env(env);
        }
    }

    fn set_model(&mut self, model: &ModelSpec) {
        for cb in self.callbacks.iter_mut() {
            cb.set_model(model);
        }
    }

    fn on_train_begin(&mut self) {
        for cb in self.callbacks.iter_mut() {
            cb.on_train_begin();
        }
    }

    fn on_train_end(&mut self, logs: &TrainLogs) {
        for cb in self.callbacks.iter_mut() {
            cb.on_train_end(logs);
        }
    }

    fn on_episode_begin(&mut self, episode: usize) {
        for cb in self.callbacks.iter_mut() {
            cb.on_episode_begin(episode);
        }
    }

    fn on_episode_end(&mut self, episode: usize, logs: &EpisodeLogs) {
        for cb in self.callbacks.iter_mut() {
            cb.on_episode_end(episode, logs);
        }
    }

    fn on_step_begin(&mut self, step: usize) {
        for cb in self.callbacks.iter_mut() {
            cb.on_step_begin(step);
        }
    }

    fn on_step_end(&mut self, step: usize, logs: &StepLogs<'_, O, A>) {
        for cb in self.callbacks.iter_mut() {
            cb.on_step_end(step, logs);
        }
    }

    fn on_action_begin(&mut self, action: &A) {
        for cb in self.callbacks.iter_mut() {
            cb.on_action_begin(action);
        }
    }

    fn on_action_end(&mut self, action: &A) {
        for cb in self.callbacks.iter_mut() {
            cb.on_action_end(action);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub episode: usize,
    #[serde(flatten)]
    pub logs: EpisodeLogs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub episodes: Vec<EpisodeRecord>,
}

impl History {
    pub fn record(&mut self, episode: usize, logs: &EpisodeLogs) {
        self.episodes.push(EpisodeRecord {
            episode,
            logs: *logs,
        });
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn episode_rewards(&self) -> Vec<f64> {
        self.episodes.iter().map(|e| e.logs.episode_reward).collect()
    }

    pub fn mean_reward(&self) -> Option<f64> {
        mean(&self.episode_rewards())
    }
}

impl<O, A> Callback<O, A> for History {
    fn on_episode_end(&mut self, episode: usize, logs: &EpisodeLogs) {
        self.record(episode, logs);
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// Mean of each metric column, ignoring NaN entries (steps where the agent
// did not train).
fn metric_means(names: &[String], rows: &[Vec<f64>]) -> String {
    let mut parts = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let column: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.get(i).copied())
            .filter(|v| !v.is_nan())
            .collect();
        match mean(&column) {
            Some(m) => parts.push(format!("{}: {:.4}", name, m)),
            None => parts.push(format!("{}: --", name)),
        }
    }
    parts.join(", ")
}

/// Logs a summary every `interval` steps.
pub struct TrainIntervalLogger {
    interval: usize,
    step: usize,
    nb_episodes: usize,
    metrics_names: Vec<String>,
    train_start: Instant,
    interval_start: Instant,
    step_rewards: Vec<f64>,
    metrics: Vec<Vec<f64>>,
    episode_rewards: Vec<f64>,
}

impl TrainIntervalLogger {
    pub fn new(interval: usize) -> Self {
        let now = Instant::now();
        Self {
            interval: interval.max(1),
            step: 0,
            nb_episodes: 0,
            metrics_names: Vec::new(),
            train_start: now,
            interval_start: now,
            step_rewards: Vec::new(),
            metrics: Vec::new(),
            episode_rewards: Vec::new(),
        }
    }

    fn flush(&mut self) {
        let elapsed = self.interval_start.elapsed().as_secs_f64();
        let steps_per_sec = self.step_rewards.len() as f64 / elapsed.max(f64::EPSILON);
        let reward_mean = mean(&self.step_rewards).unwrap_or(0.0);
        match mean(&self.episode_rewards) {
            Some(episode_mean) => {
                let lo = self.episode_rewards.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = self
                    .episode_rewards
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                tracing::info!(
                    "step {} ({:.0} steps/s): {} episodes, episode reward {:.3} [{:.3}, {:.3}], step reward {:.3}, {}",
                    self.step,
                    steps_per_sec,
                    self.episode_rewards.len(),
                    episode_mean,
                    lo,
                    hi,
                    reward_mean,
                    metric_means(&self.metrics_names, &self.metrics)
                );
            }
            None => tracing::info!(
                "step {} ({:.0} steps/s): no episode finished, step reward {:.3}, {}",
                self.step,
                steps_per_sec,
                reward_mean,
                metric_means(&self.metrics_names, &self.metrics)
            ),
        }
        self.interval_start = Instant::now();
        self.step_rewards.clear();
        self.metrics.clear();
        self.episode_rewards.clear();
    }
}

impl<O, A> Callback<O, A> for TrainIntervalLogger {
    fn set_params(&mut self, params: &FitParams) {
        self.nb_episodes = params.nb_episodes;
    }

    fn set_model(&mut self, model: &ModelSpec) {
        self.metrics_names = model.metrics_names.clone();
    }

    fn on_train_begin(&mut self) {
        self.train_start = Instant::now();
        self.interval_start = self.train_start;
        tracing::info!("training for {} episodes", self.nb_episodes);
    }

    fn on_train_end(&mut self, _logs: &TrainLogs) {
        tracing::info!(
            "done, took {:.3}s",
            self.train_start.elapsed().as_secs_f64()
        );
    }

    fn on_episode_end(&mut self, _episode: usize, logs: &EpisodeLogs) {
        self.episode_rewards.push(logs.episode_reward);
    }

    fn on_step_end(&mut self, _step: usize, logs: &StepLogs<'_, O, A>) {
        self.step += 1;
        self.step_rewards.push(logs.reward);
        self.metrics.push(logs.metrics.to_vec());
        if self.step % self.interval == 0 {
            self.flush();
        }
    }
}

/// Logs one line per finished episode.
pub struct TrainEpisodeLogger {
    nb_episodes: usize,
    metrics_names: Vec<String>,
    train_start: Instant,
    episode_start: Instant,
    step_rewards: Vec<f64>,
    metrics: Vec<Vec<f64>>,
}

impl TrainEpisodeLogger {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            nb_episodes: 0,
            metrics_names: Vec::new(),
            train_start: now,
            episode_start: now,
            step_rewards: Vec::new(),
            metrics: Vec::new(),
        }
    }
}

impl Default for TrainEpisodeLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, A> Callback<O, A> for TrainEpisodeLogger {
    fn set_params(&mut self, params: &FitParams) {
        self.nb_episodes = params.nb_episodes;
    }

    fn set_model(&mut self, model: &ModelSpec) {
        self.metrics_names = model.metrics_names.clone();
    }

    fn on_train_begin(&mut self) {
        self.train_start = Instant::now();
        tracing::info!("training for {} episodes", self.nb_episodes);
    }

    fn on_train_end(&mut self, _logs: &TrainLogs) {
        tracing::info!(
            "done, took {:.3}s",
            self.train_start.elapsed().as_secs_f64()
        );
    }

    fn on_episode_begin(&mut self, _episode: usize) {
        self.episode_start = Instant::now();
        self.step_rewards.clear();
        self.metrics.clear();
    }

    fn on_episode_end(&mut self, episode: usize, logs: &EpisodeLogs) {
        let elapsed = self.episode_start.elapsed().as_secs_f64();
        tracing::info!(
            "episode {}/{}: steps {} (total {}), {:.3}s, reward {:.3}, mean step reward {:.3}, {}",
            episode + 1,
            self.nb_episodes,
            logs.nb_episode_steps,
            logs.nb_steps,
            elapsed,
            logs.episode_reward,
            mean(&self.step_rewards).unwrap_or(0.0),
            metric_means(&self.metrics_names, &self.metrics)
        );
    }

    fn on_step_end(&mut self, _step: usize, logs: &StepLogs<'_, O, A>) {
        self.step_rewards.push(logs.reward);
        self.metrics.push(logs.metrics.to_vec());
    }
}
