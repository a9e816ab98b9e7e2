//! Fixed-capacity experience ring with TD-error prioritized sampling.
//!
//! Insertion is plain FIFO overwrite at a wrapping cursor; priority only
//! affects which stored transition gets replayed. Sampling ranks all stored
//! transitions by descending `|td_error|` and walks the ranking, accepting
//! rank `j` with probability `0.5^(j+1)`. When every trial fails the
//! lowest-priority transition is used as the floor.

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::error::{ReinforceError, Result};

/// One observed transition `(s, a, r, s')` and the TD error it produced last.
#[derive(Clone, Debug, PartialEq)]
pub struct Experience {
    prior_state: Array2<f64>,
    prior_action: usize,
    prior_reward: f64,
    result_state: Array2<f64>,
    td_error: f64,
}

impl Experience {
    /// States are `n x 1` columns.
    pub fn new(
        prior_state: Array2<f64>,
        prior_action: usize,
        prior_reward: f64,
        result_state: Array2<f64>,
    ) -> Self {
        Experience {
            prior_state,
            prior_action,
            prior_reward,
            result_state,
            td_error: 0.0,
        }
    }

    pub fn prior_state(&self) -> ArrayView2<'_, f64> {
        self.prior_state.view()
    }

    pub fn prior_action(&self) -> usize {
        self.prior_action
    }

    pub fn prior_reward(&self) -> f64 {
        self.prior_reward
    }

    pub fn result_state(&self) -> ArrayView2<'_, f64> {
        self.result_state.view()
    }

    /// Signed, already clamped TD error from the last evaluation.
    pub fn td_error(&self) -> f64 {
        self.td_error
    }

    pub fn set_td_error(&mut self, td_error: f64) {
        self.td_error = td_error;
    }

    pub fn priority(&self) -> f64 {
        self.td_error.abs()
    }
}

/// Ring buffer of experiences.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    slots: Vec<Experience>,
    capacity: usize,
    cursor: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ReinforceError::invalid_parameter(
                "capacity",
                "Capacity must be greater than 0",
            ));
        }
        Ok(ReplayBuffer {
            slots: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            cursor: 0,
        })
    }

    /// Write at the cursor, overwriting the oldest entry once full.
    /// Returns the slot written.
    ///
    /// The cursor advances after the write, so after `capacity + k` pushes the
    /// newest entry sits at slot `(k - 1) mod capacity` and the cursor at
    /// `k mod capacity`.
    pub fn push(&mut self, experience: Experience) -> usize {
        let slot = self.cursor;
        if slot < self.slots.len() {
            self.slots[slot] = experience;
        } else {
            self.slots.push(experience);
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        slot
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot the next `push` will write.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn get(&self, slot: usize) -> Option<&Experience> {
        self.slots.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.slots.iter()
    }

    pub fn update_td_error(&mut self, slot: usize, td_error: f64) {
        if let Some(exp) = self.slots.get_mut(slot) {
            exp.set_td_error(td_error);
        }
    }

    /// Populated slots ordered by descending `|td_error|`; equal priorities
    /// keep slot order.
    pub fn ranked_slots(&self) -> Vec<usize> {
        let mut ranked: Vec<usize> = (0..self.slots.len()).collect();
        ranked.sort_by(|&a, &b| {
            self.slots[b]
                .priority()
                .total_cmp(&self.slots[a].priority())
        });
        ranked
    }

    /// Freeze the current ranking for one batch of draws.
    pub fn prioritized(&self) -> Result<RankedSampler> {
        if self.slots.is_empty() {
            return Err(ReinforceError::EmptyBuffer(
                "no experience stored yet".to_string(),
            ));
        }
        Ok(RankedSampler {
            ranked: self.ranked_slots(),
        })
    }
}

/// A snapshot of the priority ranking used for one batch replay.
#[derive(Clone, Debug)]
pub struct RankedSampler {
    ranked: Vec<usize>,
}

impl RankedSampler {
    pub fn ranked(&self) -> &[usize] {
        &self.ranked
    }

    /// Draw a slot index.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.ranked[geometric_rank(self.ranked.len(), rng)]
    }
}

/// Rank accepted by the geometric walk over `len` ranks.
///
/// Rank `j` passes with probability `0.5^(j+1)`; the last rank is the
/// fallback when no trial passes.
pub fn geometric_rank<R: Rng + ?Sized>(len: usize, rng: &mut R) -> usize {
    debug_assert!(len > 0);
    let mut p = 0.5f64;
    for rank in 0..len {
        // gen::<f64>() is never below 0.0, later ranks cannot pass either
        if p == 0.0 {
            break;
        }
        if rng.gen::<f64>() < p {
            return rank;
        }
        p *= 0.5;
    }
    len - 1
}
