use crate::agent::{clamp_td_error, AgentPhase, DqnAgent, DqnAgentBuilder};
use crate::config::DqnConfig;
use crate::error::ReinforceError;
use crate::network::QWeights;
use crate::persistence::ModelStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn agent(num_states: usize, num_actions: usize, config: DqnConfig) -> DqnAgent {
    DqnAgentBuilder::new(num_states, num_actions)
        .config(config)
        .seed(42)
        .build()
        .unwrap()
}

fn snapshot(agent: &DqnAgent) -> QWeights {
    agent.weights().read().unwrap().clone()
}

#[test]
fn test_builder_validates_inputs() {
    assert!(DqnAgentBuilder::new(0, 2).build().is_err());
    assert!(DqnAgentBuilder::new(2, 0).build().is_err());

    let bad = DqnConfig { experience_size: 0, ..DqnConfig::default() };
    assert!(matches!(
        DqnAgentBuilder::new(2, 2).config(bad).build(),
        Err(ReinforceError::InvalidParameter { .. })
    ));

    let agent = DqnAgent::new(3, 2, DqnConfig::default()).unwrap();
    assert_eq!(agent.phase(), AgentPhase::Uninitialized);
    assert_eq!(agent.replay().capacity(), 5000);
    assert_eq!(agent.steps(), 0);
}

#[test]
fn test_shared_weights_must_match_topology() {
    let config = DqnConfig { num_hidden_units: 6, ..DqnConfig::default() };
    let shared = QWeights::new(3, 2, 6, &mut StdRng::seed_from_u64(1)).into_shared();

    let ok = DqnAgentBuilder::new(3, 2)
        .config(config.clone())
        .shared_weights(shared.clone())
        .build();
    assert!(ok.is_ok());

    let wrong = DqnAgentBuilder::new(4, 2)
        .config(config)
        .shared_weights(shared)
        .build();
    assert!(wrong.is_err());
}

#[test]
fn test_wrong_state_length_rejected() {
    let mut agent = agent(4, 2, DqnConfig { num_hidden_units: 5, ..DqnConfig::default() });
    assert!(matches!(
        agent.act(&[0.0, 1.0]),
        Err(ReinforceError::DimensionMismatch { .. })
    ));
    assert!(agent.q_values(&[0.0; 5]).is_err());
    assert_eq!(agent.q_values(&[0.0; 4]).unwrap().len(), 2);
}

#[test]
fn test_first_learn_is_warm_up() {
    let mut agent = agent(2, 2, DqnConfig { num_hidden_units: 4, ..DqnConfig::default() });
    let before = snapshot(&agent);

    agent.learn(5.0).unwrap();
    assert_eq!(agent.phase(), AgentPhase::WarmedUp);
    assert_eq!(agent.steps(), 0);
    assert_eq!(agent.last_td_error(), None);
    assert_eq!(snapshot(&agent), before);

    // a second learn without any act has no transition to train on
    assert!(matches!(agent.learn(1.0), Err(ReinforceError::MissingTransition)));
}

#[test]
fn test_single_act_is_not_a_transition() {
    let mut agent = agent(2, 2, DqnConfig { num_hidden_units: 4, ..DqnConfig::default() });
    agent.act(&[1.0, 0.0]).unwrap();
    agent.learn(0.0).unwrap();
    assert!(matches!(agent.learn(0.0), Err(ReinforceError::MissingTransition)));

    agent.act(&[0.0, 1.0]).unwrap();
    agent.learn(0.0).unwrap();
    assert_eq!(agent.phase(), AgentPhase::SteadyState);
    assert_eq!(agent.steps(), 1);
}

#[test]
fn test_td_error_is_clamped() {
    let config = DqnConfig {
        gamma: 0.0,
        epsilon: 0.0,
        alpha: 0.05,
        learning_steps_per_iteration: 0,
        num_hidden_units: 4,
        ..DqnConfig::default()
    };
    let mut agent = agent(2, 2, config);

    let a0 = agent.act(&[0.5, -0.5]).unwrap();
    agent.learn(100.0).unwrap();
    agent.act(&[0.1, 0.2]).unwrap();
    let b2_before = snapshot(&agent).b2.value().clone();
    agent.learn(0.0).unwrap();

    // raw error is about -100, only -1 reaches backward
    assert_eq!(agent.last_td_error(), Some(-1.0));
    let b2_after = snapshot(&agent).b2.value().clone();
    assert_eq!(b2_after[[a0, 0]], b2_before[[a0, 0]] + 0.05);
    assert_eq!(b2_after[[1 - a0, 0]], b2_before[[1 - a0, 0]]);

    let stored = agent.replay().get(0).unwrap();
    assert_eq!(stored.td_error(), -1.0);
    assert_eq!(stored.prior_reward(), 100.0);
}

#[test]
fn test_clamp_keeps_sign_and_small_errors() {
    assert_eq!(clamp_td_error(3.5, 1.0), 1.0);
    assert_eq!(clamp_td_error(-3.5, 1.0), -1.0);
    assert_eq!(clamp_td_error(0.25, 1.0), 0.25);
    assert_eq!(clamp_td_error(-0.25, 0.1), -0.1);
}

#[test]
fn test_reward_lags_one_step() {
    let config = DqnConfig {
        experience_add_every: 1,
        learning_steps_per_iteration: 0,
        num_hidden_units: 4,
        ..DqnConfig::default()
    };
    let mut agent = agent(1, 2, config);

    let a0 = agent.act(&[0.0]).unwrap();
    agent.learn(1.0).unwrap();
    let a1 = agent.act(&[1.0]).unwrap();
    agent.learn(2.0).unwrap();
    agent.act(&[2.0]).unwrap();
    agent.learn(3.0).unwrap();

    assert_eq!(agent.replay().len(), 2);

    let first = agent.replay().get(0).unwrap();
    assert_eq!(first.prior_state()[[0, 0]], 0.0);
    assert_eq!(first.prior_action(), a0);
    assert_eq!(first.prior_reward(), 1.0);
    assert_eq!(first.result_state()[[0, 0]], 1.0);

    let second = agent.replay().get(1).unwrap();
    assert_eq!(second.prior_state()[[0, 0]], 1.0);
    assert_eq!(second.prior_action(), a1);
    assert_eq!(second.prior_reward(), 2.0);
    assert_eq!(second.result_state()[[0, 0]], 2.0);
}

#[test]
fn test_experience_added_every_n_steps() {
    let config = DqnConfig {
        experience_add_every: 3,
        learning_steps_per_iteration: 2,
        num_hidden_units: 4,
        ..DqnConfig::default()
    };
    let mut agent = agent(2, 2, config);
    agent.learn(0.0).unwrap();
    for i in 0..10 {
        agent.act(&[i as f64, 1.0]).unwrap();
        if i > 0 {
            agent.learn(1.0).unwrap();
        }
    }
    // trained steps t = 0..8, stored at t = 0, 3, 6
    assert_eq!(agent.steps(), 9);
    assert_eq!(agent.replay().len(), 3);
}

#[test]
fn test_zero_alpha_disables_learning() {
    let config = DqnConfig {
        alpha: 0.0,
        experience_add_every: 1,
        num_hidden_units: 4,
        ..DqnConfig::default()
    };
    let mut agent = agent(2, 2, config);
    let before = snapshot(&agent);

    for i in 0..20 {
        agent.act(&[i as f64, 0.5]).unwrap();
        agent.learn(1.0).unwrap();
    }
    assert_eq!(snapshot(&agent), before);
    assert_eq!(agent.steps(), 0);
    assert!(agent.replay().is_empty());
    assert_eq!(agent.phase(), AgentPhase::WarmedUp);
}

#[test]
fn test_epsilon_greedy_exploration_rate() {
    let config = DqnConfig { epsilon: 0.1, num_hidden_units: 2, ..DqnConfig::default() };
    let mut agent = agent(2, 3, config);
    let n = 100_000;
    let mut explored = 0;
    for _ in 0..n {
        let selection = agent.select(&[0.3, -0.7]).unwrap();
        assert!(selection.action < 3);
        if selection.explored {
            explored += 1;
        }
    }
    let rate = explored as f64 / n as f64;
    assert!((rate - 0.1).abs() < 0.01, "explored fraction {}", rate);
}

#[test]
fn test_greedy_agent_is_deterministic() {
    let config = DqnConfig { epsilon: 0.0, num_hidden_units: 8, ..DqnConfig::default() };
    let mut agent = agent(3, 4, config);
    let state = [0.2, -0.4, 0.9];
    let first = agent.act(&state).unwrap();
    for _ in 0..50 {
        assert_eq!(agent.act(&state).unwrap(), first);
    }
}

#[test]
fn test_constant_reward_td_error_shrinks() {
    let config = DqnConfig {
        gamma: 0.9,
        epsilon: 0.0,
        num_hidden_units: 10,
        ..DqnConfig::default()
    };
    let mut agent = agent(4, 2, config);
    let zero = [0.0; 4];

    let mut errors = Vec::new();
    for _ in 0..500 {
        agent.act(&zero).unwrap();
        agent.learn(1.0).unwrap();
        if let Some(td) = agent.last_td_error() {
            errors.push(td.abs());
        }
    }

    assert_eq!(errors.len(), 499);
    for pair in errors.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9, "{} then {}", pair[0], pair[1]);
    }
    let last = *errors.last().unwrap();
    assert!(last < 1e-3, "final td error {}", last);
}

#[test]
fn test_periodic_save_and_resume() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.json");
    let config = DqnConfig { save_interval: 2, num_hidden_units: 4, ..DqnConfig::default() };

    let mut agent = DqnAgentBuilder::new(2, 2)
        .config(config.clone())
        .seed(3)
        .model_store(ModelStore::new(&path))
        .build()
        .unwrap();

    agent.act(&[0.0, 1.0]).unwrap();
    agent.learn(1.0).unwrap();
    agent.act(&[1.0, 0.0]).unwrap();
    agent.learn(1.0).unwrap();
    assert!(!path.exists());

    agent.act(&[1.0, 1.0]).unwrap();
    agent.learn(1.0).unwrap();
    assert!(path.exists());
    let saved = snapshot(&agent);

    let resumed = DqnAgentBuilder::new(2, 2)
        .config(config)
        .seed(4)
        .model_store(ModelStore::new(&path))
        .resume(true)
        .build()
        .unwrap();
    assert_eq!(snapshot(&resumed), saved);
}

#[test]
fn test_disabled_periodic_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.bin");
    let config = DqnConfig { save_interval: -1, num_hidden_units: 4, ..DqnConfig::default() };
    let mut agent = DqnAgentBuilder::new(2, 2)
        .config(config)
        .model_store(ModelStore::new(&path))
        .build()
        .unwrap();

    for i in 0..10 {
        agent.act(&[i as f64, 0.0]).unwrap();
        agent.learn(0.5).unwrap();
    }
    assert!(!path.exists());
    agent.save().unwrap();
    assert!(path.exists());
}

#[test]
fn test_load_replaces_live_weights() {
    let dir = tempdir().unwrap();
    let config = DqnConfig { save_interval: -1, num_hidden_units: 4, ..DqnConfig::default() };
    let mut agent = DqnAgentBuilder::new(2, 2)
        .config(config)
        .seed(9)
        .model_store(ModelStore::new(dir.path().join("model.json")))
        .build()
        .unwrap();

    assert!(!agent.load().unwrap());
    agent.save().unwrap();
    let saved = snapshot(&agent);

    for i in 0..5 {
        agent.act(&[i as f64, -1.0]).unwrap();
        agent.learn(2.0).unwrap();
    }
    assert_ne!(snapshot(&agent), saved);

    assert!(agent.load().unwrap());
    assert_eq!(snapshot(&agent), saved);
}

#[test]
fn test_save_without_store_is_an_error() {
    let agent = agent(2, 2, DqnConfig { num_hidden_units: 4, ..DqnConfig::default() });
    assert!(agent.save().is_err());
}

#[test]
fn test_failed_save_is_reported() {
    let dir = tempdir().unwrap();
    // a regular file where the model directory should be
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let config = DqnConfig { save_interval: 1, num_hidden_units: 4, ..DqnConfig::default() };
    let mut agent = DqnAgentBuilder::new(2, 2)
        .config(config)
        .seed(5)
        .model_store(ModelStore::new(blocker.join("model.json")))
        .build()
        .unwrap();

    assert!(matches!(agent.save(), Err(ReinforceError::IoError(_))));

    agent.act(&[0.0, 1.0]).unwrap();
    agent.learn(1.0).unwrap();
    agent.act(&[1.0, 0.0]).unwrap();
    // first trained step makes the periodic save due
    assert!(matches!(agent.learn(1.0), Err(ReinforceError::IoError(_))));
    assert_eq!(agent.steps(), 1);
}
