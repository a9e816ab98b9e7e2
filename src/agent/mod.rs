//! # Q-Learning Agent Module
//!
//! An online Deep Q-Learning agent driven by alternating `act` / `learn`
//! calls from the environment.
//!
//! ## Core Concepts
//!
//! - **Epsilon-greedy**: with probability `epsilon` a uniformly random action,
//!   otherwise the action with the largest Q-value (lowest index on ties)
//! - **TD update**: one SGD step on the clamped error
//!   `Q(s)[a] - (r + gamma * max Q(s'))`
//! - **Prioritized replay**: every `experience_add_every` trained steps the
//!   live transition is stored in a ring, and each `learn` call replays
//!   `learning_steps_per_iteration` transitions picked by descending `|td|`
//! - **Reward lag**: `learn(r)` trains on the previous transition with the
//!   reward from the previous call; the first call only records its reward
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use reinforce::agent::DqnAgentBuilder;
//! use reinforce::config::DqnConfig;
//! use reinforce::persistence::ModelStore;
//!
//! let mut agent = DqnAgentBuilder::new(4, 2)
//!     .config(DqnConfig { gamma: 0.9, ..DqnConfig::default() })
//!     .model_store(ModelStore::new("model.json"))
//!     .resume(true)
//!     .build()
//!     .unwrap();
//!
//! let state = [0.1, 0.2, -0.3, 0.4];
//! let action = agent.act(&state).unwrap();
//! agent.learn(if action == 0 { 1.0 } else { -1.0 }).unwrap();
//! agent.save().unwrap();
//! ```

mod dqn;
pub use dqn::{clamp_td_error, AgentPhase, DqnAgent, DqnAgentBuilder, Selection};
