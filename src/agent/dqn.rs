use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::config::DqnConfig;
use crate::error::{ReinforceError, Result};
use crate::network::{greedy_action, max_q, state_column, QWeights, SharedWeights};
use crate::persistence::ModelStore;
use crate::replay_buffer::{Experience, ReplayBuffer};

/// Where the agent is in its act/learn cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentPhase {
    /// `learn` has never been called
    Uninitialized,
    /// The first reward is recorded, nothing trained yet
    WarmedUp,
    /// At least one transition has been trained on
    SteadyState,
}

/// Outcome of one action selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub action: usize,
    /// `true` when the action came from the epsilon branch
    pub explored: bool,
}

/// Online Deep Q-Learning agent with prioritized replay.
///
/// The environment drives the agent with alternating calls:
///
/// ```
/// use reinforce::agent::DqnAgentBuilder;
/// use reinforce::config::DqnConfig;
///
/// let config = DqnConfig { num_hidden_units: 8, ..DqnConfig::default() };
/// let mut agent = DqnAgentBuilder::new(4, 2)
///     .config(config)
///     .seed(7)
///     .build()
///     .unwrap();
///
/// for step in 0..10 {
///     let state = [step as f64 * 0.1, 0.0, 1.0, -1.0];
///     let action = agent.act(&state).unwrap();
///     let reward = if action == 0 { 1.0 } else { 0.0 };
///     agent.learn(reward).unwrap();
/// }
/// assert_eq!(agent.steps(), 9);
/// ```
///
/// `learn(r)` trains on the transition that ended with the latest `act`, using
/// the reward passed to the *previous* `learn` call. The very first `learn`
/// only records its reward.
pub struct DqnAgent {
    config: DqnConfig,
    num_states: usize,
    num_actions: usize,
    weights: SharedWeights,
    replay: ReplayBuffer,
    store: Option<ModelStore>,
    rng: StdRng,

    t: usize,
    phase: AgentPhase,
    prior_state: Option<Array2<f64>>,
    prior_action: usize,
    prior_reward: f64,
    current_state: Option<Array2<f64>>,
    current_action: usize,
    last_td_error: Option<f64>,
}

impl DqnAgent {
    /// Agent with fresh random weights and an entropy-seeded RNG.
    pub fn new(num_states: usize, num_actions: usize, config: DqnConfig) -> Result<Self> {
        DqnAgentBuilder::new(num_states, num_actions).config(config).build()
    }

    /// Epsilon-greedy action for `state`.
    pub fn act(&mut self, state: &[f64]) -> Result<usize> {
        self.select(state).map(|s| s.action)
    }

    /// Same as [`act`](Self::act), also reporting which branch chose the action.
    pub fn select(&mut self, state: &[f64]) -> Result<Selection> {
        if state.len() != self.num_states {
            return Err(ReinforceError::dimension_mismatch(
                format!("state of length {}", self.num_states),
                format!("length {}", state.len()),
            ));
        }
        let column = state_column(state);

        let explored = self.rng.gen::<f64>() < self.config.epsilon;
        let action = if explored {
            self.rng.gen_range(0..self.num_actions)
        } else {
            let weights = self.read_weights()?;
            let pass = weights.forward(column.view(), false);
            greedy_action(pass.q_values())
        };

        self.prior_state = self.current_state.take();
        self.prior_action = self.current_action;
        self.current_state = Some(column);
        self.current_action = action;

        Ok(Selection { action, explored })
    }

    /// Feed the reward for the latest action and train.
    pub fn learn(&mut self, reward: f64) -> Result<()> {
        if self.phase == AgentPhase::Uninitialized {
            self.phase = AgentPhase::WarmedUp;
            self.prior_reward = reward;
            return Ok(());
        }
        if self.config.alpha == 0.0 {
            self.prior_reward = reward;
            return Ok(());
        }

        let (prior, current) = match (&self.prior_state, &self.current_state) {
            (Some(prior), Some(current)) => (prior.clone(), current.clone()),
            _ => return Err(ReinforceError::MissingTransition),
        };
        let mut experience = Experience::new(prior, self.prior_action, self.prior_reward, current);

        let td_error = self.train_step(&experience)?;
        experience.set_td_error(td_error);
        self.last_td_error = Some(td_error);
        log::debug!("step {}: td error {:.6}", self.t, td_error);

        if self.t % self.config.experience_add_every == 0 {
            let slot = self.replay.push(experience);
            log::debug!("stored transition in replay slot {}", slot);
        }
        self.t += 1;
        self.phase = AgentPhase::SteadyState;

        self.replay_batch()?;
        self.prior_reward = reward;
        self.save_if_due()
    }

    /// One TD update: target from `s'`, taped prediction on `s`, clamped error
    /// seeded at the taken action, backward, SGD.
    ///
    /// The passes run under the read guard; only the final SGD step takes the
    /// write guard, so agents sharing weights serialize their updates.
    fn train_step(&self, experience: &Experience) -> Result<f64> {
        let (td_error, grads) = {
            let weights = self.read_weights()?;
            let target = {
                let next = weights.forward(experience.result_state(), false);
                experience.prior_reward() + self.config.gamma * max_q(next.q_values())
            };

            let pass = weights.forward(experience.prior_state(), true);
            let action = experience.prior_action();
            let raw = pass.q_values()[action] - target;
            if !raw.is_finite() {
                log::warn!("non-finite TD error {} for action {}", raw, action);
            }
            let td_error = clamp_td_error(raw, self.config.td_error_clamp);
            (td_error, pass.backward_from(action, td_error))
        };

        self.write_weights()?
            .apply_gradients(&grads, self.config.alpha);
        Ok(td_error)
    }

    /// Extra updates on prioritized samples; nothing happens while the ring is empty.
    fn replay_batch(&mut self) -> Result<()> {
        let steps = self.config.learning_steps_per_iteration;
        if steps == 0 || self.replay.is_empty() {
            return Ok(());
        }

        let sampler = self.replay.prioritized()?;
        for _ in 0..steps {
            let slot = sampler.sample(&mut self.rng);
            let td_error = match self.replay.get(slot) {
                Some(experience) => self.train_step(experience)?,
                None => continue,
            };
            self.replay.update_td_error(slot, td_error);
        }
        Ok(())
    }

    fn save_if_due(&self) -> Result<()> {
        match (&self.store, self.config.save_every()) {
            (Some(_), Some(every)) if self.t % every == 0 => self.save(),
            _ => Ok(()),
        }
    }

    /// Write the current weights to the attached model store.
    pub fn save(&self) -> Result<()> {
        let store = self.store.as_ref().ok_or_else(|| {
            ReinforceError::invalid_parameter("model_store", "no model store attached")
        })?;
        let weights = self.read_weights()?;
        store.save(&weights).map_err(|e| {
            log::error!("failed to save model to {}: {}", store.path().display(), e);
            e
        })
    }

    /// Replace the live weights with the saved ones, if a compatible model
    /// exists. Returns whether anything was loaded.
    pub fn load(&mut self) -> Result<bool> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(false),
        };
        let hidden = self.config.num_hidden_units;
        match store.load_compatible(self.num_states, self.num_actions, hidden) {
            Some(loaded) => {
                *self.write_weights()? = loaded;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inference-only Q-values.
    pub fn q_values(&self, state: &[f64]) -> Result<Array1<f64>> {
        if state.len() != self.num_states {
            return Err(ReinforceError::dimension_mismatch(
                format!("state of length {}", self.num_states),
                format!("length {}", state.len()),
            ));
        }
        Ok(self.read_weights()?.q_values(state))
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.config.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Number of trained (non warm-up) `learn` calls.
    pub fn steps(&self) -> usize {
        self.t
    }

    /// Clamped TD error of the latest live transition.
    pub fn last_td_error(&self) -> Option<f64> {
        self.last_td_error
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn weights(&self) -> &SharedWeights {
        &self.weights
    }

    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn model_store(&self) -> Option<&ModelStore> {
        self.store.as_ref()
    }

    fn read_weights(&self) -> Result<RwLockReadGuard<'_, QWeights>> {
        self.weights.read().map_err(|_| ReinforceError::LockPoisoned)
    }

    fn write_weights(&self) -> Result<RwLockWriteGuard<'_, QWeights>> {
        self.weights.write().map_err(|_| ReinforceError::LockPoisoned)
    }
}

/// Bound `raw` to `[-clamp, clamp]`, keeping its sign.
pub fn clamp_td_error(raw: f64, clamp: f64) -> f64 {
    raw.clamp(-clamp, clamp)
}

/// Builder pattern for DqnAgent
pub struct DqnAgentBuilder {
    num_states: usize,
    num_actions: usize,
    config: DqnConfig,
    seed: Option<u64>,
    weights: Option<SharedWeights>,
    store: Option<ModelStore>,
    resume: bool,
}

impl DqnAgentBuilder {
    pub fn new(num_states: usize, num_actions: usize) -> Self {
        DqnAgentBuilder {
            num_states,
            num_actions,
            config: DqnConfig::default(),
            seed: None,
            weights: None,
            store: None,
            resume: false,
        }
    }

    pub fn config(mut self, config: DqnConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed for weight initialization, exploration and replay sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Train against an existing (possibly shared) weight set.
    pub fn shared_weights(mut self, weights: SharedWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Snapshot file used by `save`, `load` and periodic saving.
    pub fn model_store(mut self, store: ModelStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from the stored model when one fits.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn build(self) -> Result<DqnAgent> {
        if self.num_states == 0 {
            return Err(ReinforceError::invalid_parameter("num_states", "must be > 0"));
        }
        if self.num_actions == 0 {
            return Err(ReinforceError::invalid_parameter("num_actions", "must be > 0"));
        }
        self.config.validate()?;

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let hidden = self.config.num_hidden_units;

        let weights = match self.weights {
            Some(shared) => {
                let topology = {
                    let w = shared.read().map_err(|_| ReinforceError::LockPoisoned)?;
                    (w.num_states(), w.num_actions(), w.hidden_units())
                };
                if topology != (self.num_states, self.num_actions, hidden) {
                    return Err(ReinforceError::invalid_parameter(
                        "weights".to_string(),
                        format!(
                            "shared weights have topology {:?}, expected {:?}",
                            topology,
                            (self.num_states, self.num_actions, hidden)
                        ),
                    ));
                }
                shared
            }
            None => {
                let loaded = match (&self.store, self.resume) {
                    (Some(store), true) => store.load_compatible(self.num_states, self.num_actions, hidden),
                    _ => None,
                };
                loaded
                    .unwrap_or_else(|| QWeights::new(self.num_states, self.num_actions, hidden, &mut rng))
                    .into_shared()
            }
        };

        let replay = ReplayBuffer::new(self.config.experience_size)?;

        Ok(DqnAgent {
            config: self.config,
            num_states: self.num_states,
            num_actions: self.num_actions,
            weights,
            replay,
            store: self.store,
            rng,
            t: 0,
            phase: AgentPhase::Uninitialized,
            prior_state: None,
            prior_action: 0,
            prior_reward: 0.0,
            current_state: None,
            current_action: 0,
            last_td_error: None,
        })
    }
}
