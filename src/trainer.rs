use crate::agent::{Agent, AgentError};
use crate::callbacks::{
    Callback, CallbackList, EpisodeLogs, FitParams, History, ModelSpec, StepLogs,
    TrainEpisodeLogger, TrainIntervalLogger, TrainLogs,
};
use crate::env::{accumulate_info, EnvError, Environment, Info};
use crate::processor::{NoProcessor, Processor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("tried to fit an agent that has not been compiled; call `compile()` before `fit()`")]
    NotCompiled,
    #[error("action_repetition must be >= 1, is {0}")]
    InvalidActionRepetition(usize),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub nb_episodes: usize,
    pub action_repetition: usize,
    /// 0 is silent, 1 logs every `log_interval` steps, 2 logs every episode.
    pub verbose: u8,
    pub visualize: bool,
    pub nb_max_start_steps: usize,
    pub log_interval: usize,
    /// Episodes are cut after this many steps. `Some(0)` means no bound.
    pub nb_max_episode_steps: Option<usize>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            nb_episodes: 1,
            action_repetition: 1,
            verbose: 1,
            visualize: false,
            nb_max_start_steps: 0,
            log_interval: 10_000,
            nb_max_episode_steps: None,
        }
    }
}

impl TrainerConfig {
    pub fn new(nb_episodes: usize) -> Self {
        Self {
            nb_episodes,
            ..Self::default()
        }
    }

    fn max_episode_steps(&self) -> Option<usize> {
        self.nb_max_episode_steps.filter(|&n| n > 0)
    }

    fn fit_params(&self) -> FitParams {
        FitParams {
            nb_episodes: self.nb_episodes,
            action_repetition: self.action_repetition,
            nb_max_start_steps: self.nb_max_start_steps,
            nb_max_episode_steps: self.max_episode_steps(),
        }
    }
}

pub type StartStepPolicy<O, A> = Box<dyn FnMut(&O) -> A>;

struct EpisodeState<O> {
    step: usize,
    reward: f64,
    observation: O,
}

/// Runs whole episodes of agent/environment interaction.
pub struct Trainer<O, A> {
    config: TrainerConfig,
    callbacks: Vec<Box<dyn Callback<O, A>>>,
    processor: Box<dyn Processor<O, A>>,
    start_step_policy: Option<StartStepPolicy<O, A>>,
    rng: StdRng,
}

impl<O, A> Trainer<O, A>
where
    A: Clone,
{
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            callbacks: Vec::new(),
            processor: Box::new(NoProcessor),
            start_step_policy: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_callback(mut self, callback: impl Callback<O, A> + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn with_processor(mut self, processor: impl Processor<O, A> + 'static) -> Self {
        self.processor = Box::new(processor);
        self
    }

    pub fn with_start_step_policy(mut self, policy: impl FnMut(&O) -> A + 'static) -> Self {
        self.start_step_policy = Some(Box::new(policy));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrainerConfig {
        &mut self.config
    }

    pub fn fit<G, E>(&mut self, agent: &mut G, env: &mut E) -> Result<History, TrainError>
    where
        G: Agent<Observation = O, Action = A>,
        E: Environment<Observation = O, Action = A>,
    {
        if !agent.is_compiled() {
            return Err(TrainError::NotCompiled);
        }
        if self.config.action_repetition < 1 {
            return Err(TrainError::InvalidActionRepetition(
                self.config.action_repetition,
            ));
        }

        let mut callbacks = CallbackList::new(std::mem::take(&mut self.callbacks));
        let user_callbacks = callbacks.len();
        match self.config.verbose {
            0 => {}
            1 => callbacks.push(Box::new(TrainIntervalLogger::new(self.config.log_interval))),
            _ => callbacks.push(Box::new(TrainEpisodeLogger::new())),
        }

        let result = self.run(agent, env, &mut callbacks);

        // Loggers are per-run; the caller's callbacks stay registered.
        let mut restored = callbacks.into_inner();
        restored.truncate(user_callbacks);
        self.callbacks = restored;
        result
    }

    fn run<G, E>(
        &mut self,
        agent: &mut G,
        env: &mut E,
        callbacks: &mut CallbackList<O, A>,
    ) -> Result<History, TrainError>
    where
        G: Agent<Observation = O, Action = A>,
        E: Environment<Observation = O, Action = A>,
    {
        let config = self.config.clone();
        let max_episode_steps = config.max_episode_steps();

        callbacks.set_model(&ModelSpec {
            name: agent.name().to_string(),
            metrics_names: agent.metrics_names(),
        });
        callbacks.set_env(&env.spec());
        callbacks.set_params(&config.fit_params());

        agent.set_training(true);
        agent.on_train_begin();
        callbacks.on_train_begin();
        agent.set_step(0);

        let mut history = History::default();
        for episode in 0..config.nb_episodes {
            callbacks.on_episode_begin(episode);
            agent.reset_states();
            let observation = self.start_episode(env, callbacks)?;
            let mut state = EpisodeState {
                step: 0,
                reward: 0.0,
                observation,
            };

            loop {
                callbacks.on_step_begin(state.step);
                let action = agent.forward(&state.observation)?;
                let action = self.processor.process_action(action);

                let mut reward = 0.0;
                let mut info = Info::new();
                let mut done = false;
                for _ in 0..config.action_repetition {
                    callbacks.on_action_begin(&action);
                    let outcome = self.processor.process_step(env.step(action.clone())?);
                    if config.visualize {
                        env.render()?;
                    }
                    accumulate_info(&mut info, &outcome.info);
                    callbacks.on_action_end(&action);
                    reward += outcome.reward;
                    state.observation = outcome.obs;
                    done = outcome.done;
                    if done {
                        break;
                    }
                }
                if let Some(max) = max_episode_steps {
                    if state.step + 1 >= max {
                        done = true;
                    }
                }

                let metrics = agent.backward(reward, done)?;
                state.reward += reward;
                callbacks.on_step_end(
                    state.step,
                    &StepLogs {
                        action: &action,
                        observation: &state.observation,
                        reward,
                        metrics: &metrics,
                        episode,
                        info: &info,
                    },
                );
                state.step += 1;
                agent.set_step(agent.step() + 1);

                if done {
                    // The agent has not seen the terminal observation yet.
                    // Terminal is false: the state after a reset never is.
                    agent.forward(&state.observation)?;
                    agent.backward(0.0, false)?;

                    let logs = EpisodeLogs {
                        episode_reward: state.reward,
                        nb_episode_steps: state.step,
                        nb_steps: agent.step(),
                    };
                    callbacks.on_episode_end(episode, &logs);
                    history.record(episode, &logs);
                    break;
                }
            }
        }

        callbacks.on_train_end(&TrainLogs { did_abort: false });
        agent.on_train_end();
        Ok(history)
    }

    // Resets the environment and performs the random warm-up steps, none
    // of which reach the agent.
    fn start_episode<E>(
        &mut self,
        env: &mut E,
        callbacks: &mut CallbackList<O, A>,
    ) -> Result<O, TrainError>
    where
        E: Environment<Observation = O, Action = A>,
    {
        let mut observation = self.processor.process_observation(env.reset()?);

        let nb_random_start_steps = if self.config.nb_max_start_steps == 0 {
            0
        } else {
            self.rng.gen_range(0..self.config.nb_max_start_steps)
        };
        for _ in 0..nb_random_start_steps {
            let action = match self.start_step_policy.as_mut() {
                Some(policy) => policy(&observation),
                None => env.sample_action(),
            };
            let action = self.processor.process_action(action);
            callbacks.on_action_begin(&action);
            let outcome = self.processor.process_step(env.step(action.clone())?);
            callbacks.on_action_end(&action);
            observation = outcome.obs;
            if outcome.done {
                tracing::warn!(
                    "env ended before {} random steps could be performed at the start, consider lowering nb_max_start_steps",
                    nb_random_start_steps
                );
                observation = self.processor.process_observation(env.reset()?);
                break;
            }
        }
        Ok(observation)
    }
}
