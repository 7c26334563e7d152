use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use episodic_dqn::cartpole::CartPole;
use episodic_dqn::dqn::{DqnAgent, DqnConfig};
use episodic_dqn::policy::{BoltzmannQPolicy, EpsBoltzmannQPolicy, EpsGreedyQPolicy, QPolicy};
use episodic_dqn::{Environment, History, Trainer, TrainerConfig};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyKind {
    Boltzmann,
    EpsBoltzmann,
    EpsGreedy,
}

/// Train a DQN agent on cart-pole, one batch of episodes per round.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Training rounds; each round is one `fit` on the same agent.
    #[arg(long, default_value_t = 1)]
    rounds: usize,
    /// Episodes per round.
    #[arg(long, default_value_t = 200)]
    episodes: usize,
    #[arg(long, value_enum, default_value_t = PolicyKind::EpsBoltzmann)]
    policy: PolicyKind,
    /// Exploration probability for the epsilon policies.
    #[arg(long, default_value_t = 0.1)]
    eps: f64,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 1e-3)]
    lr: f64,
    #[arg(long, default_value_t = 1.0)]
    gamma: f64,
    #[arg(long, default_value_t = 50)]
    warmup: usize,
    #[arg(long, default_value_t = 1)]
    action_repetition: usize,
    #[arg(long, default_value_t = 0)]
    max_start_steps: usize,
    /// Hard cap on steps per episode.
    #[arg(long)]
    max_episode_steps: Option<usize>,
    /// Cart-pole's own time limit.
    #[arg(long, default_value_t = 500)]
    env_max_steps: usize,
    #[arg(long, default_value_t = 10_000)]
    log_interval: usize,
    /// 0 = quiet, 1 = interval summaries, 2 = every episode, 3 = debug.
    #[arg(short, long, default_value_t = 2)]
    verbose: u8,
    #[arg(long)]
    visualize: bool,
    /// Write the per-episode history of the last round as JSON.
    #[arg(long)]
    history_out: Option<PathBuf>,
    /// Save the online network after every round.
    #[arg(long)]
    weights_out: Option<PathBuf>,
}

fn build_policy(args: &Args) -> Box<dyn QPolicy> {
    match (args.policy, args.seed) {
        (PolicyKind::Boltzmann, Some(seed)) => Box::new(BoltzmannQPolicy::with_seed(seed)),
        (PolicyKind::Boltzmann, None) => Box::new(BoltzmannQPolicy::new()),
        (PolicyKind::EpsBoltzmann, Some(seed)) => {
            Box::new(EpsBoltzmannQPolicy::with_seed(args.eps, seed))
        }
        (PolicyKind::EpsBoltzmann, None) => Box::new(EpsBoltzmannQPolicy::new(args.eps)),
        (PolicyKind::EpsGreedy, Some(seed)) => Box::new(EpsGreedyQPolicy::with_seed(args.eps, seed)),
        (PolicyKind::EpsGreedy, None) => Box::new(EpsGreedyQPolicy::new(args.eps)),
    }
}

fn write_history(path: &Path, history: &History) -> Result<()> {
    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 | 2 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut env = CartPole::new(args.env_max_steps);
    if let Some(seed) = args.seed {
        env.seed(seed);
    }
    let nb_actions = env.spec().nb_actions.unwrap_or(2);

    let dqn_config = DqnConfig {
        nb_actions,
        gamma: args.gamma,
        nb_steps_warmup: args.warmup,
        seed: args.seed,
        ..DqnConfig::default()
    };
    let mut agent = DqnAgent::new(dqn_config, build_policy(&args))?;
    agent.compile(args.lr)?;
    tracing::debug!(config = ?agent.config(), policy = ?agent.policy().config(), "agent ready");

    let trainer_config = TrainerConfig {
        nb_episodes: args.episodes,
        action_repetition: args.action_repetition,
        verbose: args.verbose.min(2),
        visualize: args.visualize,
        nb_max_start_steps: args.max_start_steps,
        log_interval: args.log_interval,
        nb_max_episode_steps: args.max_episode_steps,
    };
    let mut trainer = Trainer::new(trainer_config);
    if let Some(seed) = args.seed {
        trainer = trainer.with_seed(seed);
    }

    tracing::debug!(config = ?trainer.config(), "trainer ready");

    let mut history = History::default();
    for round in 0..args.rounds {
        tracing::info!("round {}/{}", round + 1, args.rounds);
        history = trainer.fit(&mut agent, &mut env)?;
        if let Some(mean) = history.mean_reward() {
            tracing::info!("round {} mean episode reward {:.2}", round + 1, mean);
        }
        if let Some(path) = &args.weights_out {
            agent
                .save_weights(path)
                .with_context(|| format!("saving weights to {}", path.display()))?;
        }
    }

    if let Some(path) = &args.history_out {
        write_history(path, &history)?;
    }
    Ok(())
}
