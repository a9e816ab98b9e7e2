use ndarray::parallel::prelude::*;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::agent::{DqnAgent, DqnAgentBuilder};
use crate::config::DqnConfig;
use crate::error::{ReinforceError, Result};
use crate::network::{QWeights, SharedWeights};
use crate::persistence::ModelStore;

/// N agents training one shared Q-network.
///
/// Every agent holds the same [`SharedWeights`] handle, so an update made by
/// one agent is seen by all of them on their next pass. `act` and `learn` fan
/// out over the rayon pool, one agent per task.
pub struct MultiAgents {
    agents: Vec<DqnAgent>,
    weights: SharedWeights,
    num_states: usize,
    num_actions: usize,
    config: DqnConfig,
    seed: Option<u64>,
    store: Option<ModelStore>,
    last_saved_step: usize,
}

impl MultiAgents {
    pub fn new(
        num_agents: usize,
        num_states: usize,
        num_actions: usize,
        config: DqnConfig,
    ) -> Result<Self> {
        MultiAgentsBuilder::new(num_agents, num_states, num_actions)
            .config(config)
            .build()
    }

    /// One action per agent; `states[i]` goes to agent `i`.
    pub fn act<S>(&mut self, states: &[S]) -> Result<Vec<usize>>
    where
        S: AsRef<[f64]> + Sync,
    {
        self.check_count("states", states.len())?;
        self.agents
            .par_iter_mut()
            .zip(states.par_iter())
            .map(|(agent, state)| agent.act(state.as_ref()))
            .collect()
    }

    /// `rewards[i]` goes to agent `i`. Saves the shared weights every
    /// `save_interval` trained rounds when a model store is attached.
    ///
    /// Every agent runs its `learn` even when another one fails, so the
    /// agents stay in lockstep; the first error in agent order is returned.
    pub fn learn(&mut self, rewards: &[f64]) -> Result<()> {
        self.check_count("rewards", rewards.len())?;
        let outcomes: Vec<Result<()>> = self
            .agents
            .par_iter_mut()
            .zip(rewards.par_iter())
            .map(|(agent, &reward)| agent.learn(reward))
            .collect();

        let mut failures = outcomes
            .into_iter()
            .enumerate()
            .filter_map(|(i, outcome)| outcome.err().map(|e| (i, e)));
        if let Some((first, err)) = failures.next() {
            let others = failures.count();
            log::error!("agent {} failed to learn: {} ({} more failed)", first, err, others);
            return Err(err);
        }

        let steps = self.steps();
        if let (Some(_), Some(every)) = (&self.store, self.config.save_every()) {
            if steps > 0 && steps % every == 0 && steps != self.last_saved_step {
                self.save()?;
                self.last_saved_step = steps;
            }
        }
        Ok(())
    }

    /// Save the shared weights; all agents reference them, so one snapshot
    /// covers every agent.
    pub fn save(&self) -> Result<()> {
        let store = self.store.as_ref().ok_or_else(|| {
            ReinforceError::invalid_parameter("model_store", "no model store attached")
        })?;
        let weights = self.weights.read().map_err(|_| ReinforceError::LockPoisoned)?;
        store.save(&weights).map_err(|e| {
            log::error!("failed to save shared model to {}: {}", store.path().display(), e);
            e
        })
    }

    /// Reload the stored weights and rebuild every agent against them.
    /// Returns `false` (keeping the current agents) when nothing usable is stored.
    pub fn load(&mut self) -> Result<bool> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(false),
        };
        let loaded = match store.load_compatible(
            self.num_states,
            self.num_actions,
            self.config.num_hidden_units,
        ) {
            Some(weights) => weights,
            None => return Ok(false),
        };

        let weights = loaded.into_shared();
        self.agents = build_agents(
            self.agents.len(),
            self.num_states,
            self.num_actions,
            &self.config,
            &weights,
            self.seed,
        )?;
        self.weights = weights;
        self.last_saved_step = 0;
        log::info!("rebuilt {} agents against reloaded weights", self.agents.len());
        Ok(true)
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, index: usize) -> Option<&DqnAgent> {
        self.agents.get(index)
    }

    pub fn agent_mut(&mut self, index: usize) -> Option<&mut DqnAgent> {
        self.agents.get_mut(index)
    }

    pub fn agents(&self) -> &[DqnAgent] {
        &self.agents
    }

    pub fn weights(&self) -> &SharedWeights {
        &self.weights
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn model_store(&self) -> Option<&ModelStore> {
        self.store.as_ref()
    }

    /// Trained steps of the representative (first) agent.
    pub fn steps(&self) -> usize {
        self.agents.first().map_or(0, DqnAgent::steps)
    }

    fn check_count(&self, what: &str, actual: usize) -> Result<()> {
        if actual != self.agents.len() {
            return Err(ReinforceError::dimension_mismatch(
                format!("{} {}", self.agents.len(), what),
                format!("{} {}", actual, what),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MultiAgents`].
pub struct MultiAgentsBuilder {
    num_agents: usize,
    num_states: usize,
    num_actions: usize,
    config: DqnConfig,
    seed: Option<u64>,
    store: Option<ModelStore>,
    resume: bool,
}

impl MultiAgentsBuilder {
    pub fn new(num_agents: usize, num_states: usize, num_actions: usize) -> Self {
        MultiAgentsBuilder {
            num_agents,
            num_states,
            num_actions,
            config: DqnConfig::default(),
            seed: None,
            store: None,
            resume: false,
        }
    }

    pub fn config(mut self, config: DqnConfig) -> Self {
        self.config = config;
        self
    }

    /// Base seed; each agent gets its own stream derived from it.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn model_store(mut self, store: ModelStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from the stored model when one fits.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn build(self) -> Result<MultiAgents> {
        if self.num_agents == 0 {
            return Err(ReinforceError::invalid_parameter("num_agents", "must be > 0"));
        }
        if self.num_states == 0 || self.num_actions == 0 {
            return Err(ReinforceError::invalid_parameter(
                "topology",
                "states and actions must be > 0",
            ));
        }
        self.config.validate()?;

        let hidden = self.config.num_hidden_units;
        let loaded = match (&self.store, self.resume) {
            (Some(store), true) => store.load_compatible(self.num_states, self.num_actions, hidden),
            _ => None,
        };
        let initial = match loaded {
            Some(weights) => weights,
            None => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                QWeights::new(self.num_states, self.num_actions, hidden, &mut rng)
            }
        };
        let weights = initial.into_shared();

        let agents = build_agents(
            self.num_agents,
            self.num_states,
            self.num_actions,
            &self.config,
            &weights,
            self.seed,
        )?;
        log::info!(
            "created {} agents sharing a {}-{}-{} Q-network",
            agents.len(),
            self.num_states,
            hidden,
            self.num_actions
        );

        Ok(MultiAgents {
            agents,
            weights,
            num_states: self.num_states,
            num_actions: self.num_actions,
            config: self.config,
            seed: self.seed,
            store: self.store,
            last_saved_step: 0,
        })
    }
}

fn build_agents(
    num_agents: usize,
    num_states: usize,
    num_actions: usize,
    config: &DqnConfig,
    weights: &SharedWeights,
    seed: Option<u64>,
) -> Result<Vec<DqnAgent>> {
    // one seed stream per agent, offset from the weight-init stream
    let mut seeds = seed.map(|s| StdRng::seed_from_u64(s.wrapping_add(1)));
    (0..num_agents)
        .map(|_| {
            let mut builder = DqnAgentBuilder::new(num_states, num_actions)
                .config(config.clone())
                .shared_weights(weights.clone());
            if let Some(rng) = seeds.as_mut() {
                builder = builder.seed(rng.next_u64());
            }
            builder.build()
        })
        .collect()
}
