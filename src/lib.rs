//! # Reinforce - Online Deep Q-Learning on a Hand-Rolled Autodiff Graph
//!
//! Reinforce is a small reinforcement learning library: a reverse-mode
//! automatic differentiation engine over dense 2-D matrices, a two-layer tanh
//! Q-network built on top of it, and an online DQN agent with prioritized
//! experience replay.
//!
//! ## Key Features
//!
//! - **Autodiff**: a tape-based graph over `Add`, `Matmul` and `Tanh`
//! - **Q-Network**: `Q(s) = W2 . tanh(W1 . s + B1) + B2`
//! - **DQN Agent**: epsilon-greedy acting, clamped TD updates, ring replay
//!   with rank-based prioritized sampling
//! - **Multi-Agent**: many agents training one shared weight set in parallel
//! - **Persistence**: JSON or bincode weight snapshots with atomic writes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reinforce::agent::DqnAgentBuilder;
//! use reinforce::config::DqnConfig;
//!
//! let config = DqnConfig { gamma: 0.9, epsilon: 0.1, ..DqnConfig::default() };
//! let mut agent = DqnAgentBuilder::new(4, 2).config(config).seed(42).build().unwrap();
//!
//! let mut state = vec![0.0; 4];
//! for _ in 0..1000 {
//!     let action = agent.act(&state).unwrap();
//!     state[action] += 0.1;
//!     agent.learn(if action == 1 { 1.0 } else { 0.0 }).unwrap();
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`tensor`] - Matrices with gradient accumulators
//! - [`graph`] - Computation graph and backward pass
//! - [`initialization`] - Weight initialization
//! - [`network`] - The two-layer Q-network
//! - [`replay_buffer`] - Experience ring and prioritized sampling
//! - [`agent`] - The DQN agent
//! - [`multi_agent`] - Shared-weight agent coordination
//! - [`config`] - Hyperparameters
//! - [`persistence`] - Weight snapshots and model files
//! - [`debug`] - Gradient and numerical checks
//! - [`error`] - Error types and result handling

pub mod agent;
pub mod config;
pub mod debug;
pub mod error;
pub mod graph;
pub mod initialization;
pub mod multi_agent;
pub mod network;
pub mod persistence;
pub mod replay_buffer;
pub mod tensor;

#[cfg(test)]
mod tests;
