//! # Multi-Agent Module
//!
//! Several [`DqnAgent`](crate::agent::DqnAgent)s acting in the same
//! environment while training one shared Q-network.
//!
//! ## Core Concepts
//!
//! - **Shared weights**: one `Arc<RwLock<QWeights>>` handed to every agent;
//!   passes run concurrently under the read lock, SGD steps are serialized
//!   under the write lock
//! - **Data-parallel steps**: `act` and `learn` run one agent per rayon task
//! - **Unified persistence**: one snapshot covers all agents; loading rebuilds
//!   every agent against the reloaded set

pub mod coordinator;

pub use coordinator::{MultiAgents, MultiAgentsBuilder};
