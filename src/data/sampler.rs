// ============================================================
// Layer 4 — Stratified Sampler
// ============================================================
// Decides WHICH samples go into the next batch, and keeps the
// bookkeeping needed to continue exactly where a previous run
// stopped.
//
// Training batches:
//   - training samples are grouped into strata (one per label)
//   - batch items are drawn round-robin across strata, so a
//     binary task sees ~50/50 batches even on skewed data
//   - each stratum walks a shuffled permutation; when it is
//     exhausted the stratum's epoch increments and a fresh
//     permutation is drawn
//
// Validation batches walk the validation fold in index order
// and wrap around.
//
// Reproducibility: a stratum's permutation is a pure function of
// (seed, stratum position, epoch). Persisting seed, turn, epoch
// and cursor is therefore enough to replay the future exactly;
// the permutations themselves are never written to disk.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::error::TrainError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StratumCursor {
    pub epoch:    u64,
    pub position: usize,
}

/// Everything the client must persist to resume sampling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingState {
    pub seed:         u64,
    /// Next stratum to draw from
    pub turn:         usize,
    pub strata:       BTreeMap<String, StratumCursor>,
    pub valid_cursor: usize,
    /// Times each sid has been served (train and validation)
    pub visits:       BTreeMap<String, u64>,
}

impl SamplingState {
    pub fn new(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    pub fn record_visit(&mut self, sid: &str) {
        *self.visits.entry(sid.to_string()).or_insert(0) += 1;
    }

    pub fn total_visits(&self) -> u64 {
        self.visits.values().sum()
    }
}

/// Runtime view of one stratum: its members and the current permutation.
#[derive(Debug, Clone)]
struct Stratum {
    name:    String,
    slot:    u64,
    members: Vec<usize>,
    order:   Vec<usize>,
    epoch:   u64,
}

impl Stratum {
    fn new(name: String, slot: u64, members: Vec<usize>) -> Self {
        Self { name, slot, members, order: Vec::new(), epoch: u64::MAX }
    }

    /// Rebuild the permutation when the epoch moved on.
    fn ensure_order(&mut self, seed: u64, epoch: u64) {
        if self.epoch == epoch && !self.order.is_empty() {
            return;
        }
        self.order = permutation(&self.members, seed, self.slot, epoch);
        self.epoch = epoch;
    }
}

/// The permutation of `members` for a given (seed, slot, epoch).
pub fn permutation(members: &[usize], seed: u64, slot: u64, epoch: u64) -> Vec<usize> {
    let mixed = seed
        ^ slot.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ epoch.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    let mut rng   = StdRng::seed_from_u64(mixed);
    let mut order = members.to_vec();
    order.shuffle(&mut rng);
    order
}

/// Chooses sample indices for train/validation batches.
#[derive(Debug, Clone)]
pub struct Sampler {
    strata: Vec<Stratum>,
    valid:  Vec<usize>,
}

impl Sampler {
    /// `strata` are (name, member indices) pairs; empty strata are dropped.
    pub fn new(strata: Vec<(String, Vec<usize>)>, valid: Vec<usize>) -> Result<Self, TrainError> {
        let strata: Vec<Stratum> = strata
            .into_iter()
            .filter(|(_, m)| !m.is_empty())
            .enumerate()
            .map(|(slot, (name, members))| Stratum::new(name, slot as u64, members))
            .collect();

        if strata.is_empty() {
            return Err(TrainError::config("the selected fold leaves no training samples"));
        }
        Ok(Self { strata, valid })
    }

    pub fn train_len(&self) -> usize {
        self.strata.iter().map(|s| s.members.len()).sum()
    }

    pub fn valid_len(&self) -> usize {
        self.valid.len()
    }

    pub fn valid_members(&self) -> &[usize] {
        &self.valid
    }

    pub fn strata_names(&self) -> Vec<&str> {
        self.strata.iter().map(|s| s.name.as_str()).collect()
    }

    /// Pick the next `n` training indices, advancing `state`.
    pub fn next_train(&mut self, state: &mut SamplingState, n: usize) -> Vec<usize> {
        let mut picked = Vec::with_capacity(n);
        for _ in 0..n {
            let k       = state.turn % self.strata.len();
            state.turn  = (k + 1) % self.strata.len();
            let stratum = &mut self.strata[k];

            let cursor = state.strata.entry(stratum.name.clone()).or_default();
            if cursor.position >= stratum.members.len() {
                cursor.epoch   += 1;
                cursor.position = 0;
            }
            stratum.ensure_order(state.seed, cursor.epoch);

            picked.push(stratum.order[cursor.position]);
            cursor.position += 1;
        }
        picked
    }

    /// Pick the next `n` validation indices (wrapping), advancing `state`.
    pub fn next_valid(&self, state: &mut SamplingState, n: usize) -> Result<Vec<usize>, TrainError> {
        if self.valid.is_empty() {
            return Err(TrainError::config("the selected fold has no validation samples"));
        }
        let picked = (0..n)
            .map(|i| self.valid[(state.valid_cursor + i) % self.valid.len()])
            .collect();
        state.valid_cursor = (state.valid_cursor + n) % self.valid.len();
        Ok(picked)
    }
}
