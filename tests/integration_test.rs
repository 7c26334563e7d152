use episodic_dqn::cartpole::CartPole;
use episodic_dqn::dqn::{DqnAgent, DqnConfig};
use episodic_dqn::policy::{BoltzmannQPolicy, EpsBoltzmannQPolicy};
use episodic_dqn::{Agent, Environment, TrainError, Trainer, TrainerConfig};

fn config() -> DqnConfig {
    DqnConfig {
        hidden_dims: vec![16],
        memory_limit: 1000,
        batch_size: 16,
        nb_steps_warmup: 10,
        seed: Some(1),
        ..DqnConfig::default()
    }
}

#[test]
fn test_integration_cartpole_dqn() {
    // 1. Env
    let mut env = CartPole::new(50);
    env.seed(5);

    // 2. Agent
    let mut agent = DqnAgent::new(config(), EpsBoltzmannQPolicy::with_seed(0.3, 2))
        .expect("Failed to create DQN agent");
    agent.compile(1e-3).expect("Failed to compile");

    // 3. Trainer: 4 episodes, each cut at 30 steps, some warm-up
    let mut trainer = Trainer::new(TrainerConfig {
        nb_episodes: 4,
        verbose: 0,
        nb_max_start_steps: 5,
        nb_max_episode_steps: Some(30),
        ..TrainerConfig::default()
    })
    .with_seed(3);

    // 4. Train
    let history = trainer.fit(&mut agent, &mut env).expect("Training failed");

    // 5. Verify
    assert_eq!(history.len(), 4);
    let mut total = 0;
    for record in &history.episodes {
        assert!(record.logs.nb_episode_steps >= 1);
        assert!(record.logs.nb_episode_steps <= 30);
        assert_eq!(record.logs.episode_reward, record.logs.nb_episode_steps as f64);
        total += record.logs.nb_episode_steps;
        assert_eq!(record.logs.nb_steps, total);
    }
    assert_eq!(agent.step(), total);
    // one memory entry per learning step plus the closing pair of each episode
    assert_eq!(agent.memory_len(), total + 4);
}

#[test]
fn test_uncompiled_agent_is_rejected() {
    let mut env = CartPole::new(50);
    let mut agent = DqnAgent::new(config(), BoltzmannQPolicy::with_seed(0)).unwrap();
    let mut trainer = Trainer::new(TrainerConfig::new(2));

    let result = trainer.fit(&mut agent, &mut env);

    assert!(matches!(result, Err(TrainError::NotCompiled)));
    assert_eq!(agent.memory_len(), 0);
}

#[test]
fn test_repeated_rounds_share_agent() {
    let mut env = CartPole::new(20);
    env.seed(9);
    let mut agent = DqnAgent::new(config(), BoltzmannQPolicy::with_seed(4)).unwrap();
    agent.compile(1e-3).unwrap();
    let mut trainer = Trainer::new(TrainerConfig {
        verbose: 0,
        action_repetition: 2,
        ..TrainerConfig::new(2)
    });

    let first = trainer.fit(&mut agent, &mut env).unwrap();
    let memory_after_first = agent.memory_len();
    let second = trainer.fit(&mut agent, &mut env).unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(agent.memory_len() > memory_after_first);
    let json = serde_json::to_value(&second).unwrap();
    assert_eq!(json["episodes"].as_array().unwrap().len(), 2);
}
