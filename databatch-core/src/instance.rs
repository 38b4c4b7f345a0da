// Copyright 2026 The Databatch Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Instance stream (C3): turns the record sequence into the instance
//! sequence batching consumes, applying skip/limit/shard/shuffle/subsample
//! in the fixed order §4.3 mandates.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::config::ReaderConfig;
use crate::record::{Instance, Record};

/// Derives the subsample PRNG's seed from the shuffle seed currently in
/// effect, so a fixed `shuffle_seed` with `reshuffle_each_epoch=false`
/// reproduces identical subsample decisions across epochs (§4.3, §9
/// open question (b)).
fn derive_subsample_seed(shuffle_seed: u64) -> u64 {
    shuffle_seed ^ 0x5DEE_CE66_D8EF_B4C5
}

/// Samples a fresh seed when the configuration doesn't pin one, the same
/// "sampled once at construction" default §4.3 describes.
fn sample_fresh_seed() -> u64 {
    rand::thread_rng().gen()
}

struct Reservoir {
    window: usize,
    items: Vec<Record>,
    seen: u64,
    rng: Pcg64Mcg,
}

impl Reservoir {
    fn new(window: usize, seed: u64) -> Self {
        Reservoir {
            window,
            items: Vec::with_capacity(window),
            seen: 0,
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Feeds one record through the reservoir; returns an item evicted or
    /// passed straight through immediately, if any.
    fn push(&mut self, record: Record) -> Option<Record> {
        let out = if self.items.len() < self.window {
            self.items.push(record);
            None
        } else {
            let keep_probability = self.window as f64 / (self.seen + 1) as f64;
            if self.rng.gen::<f64>() < keep_probability {
                let slot = self.rng.gen_range(0..self.window);
                Some(std::mem::replace(&mut self.items[slot], record))
            } else {
                Some(record)
            }
        };
        self.seen += 1;
        out
    }

    /// Drains the remaining reservoir contents in random order.
    fn drain(&mut self) -> Vec<Record> {
        let mut items = std::mem::take(&mut self.items);
        // Fisher-Yates shuffle.
        for i in (1..items.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            items.swap(i, j);
        }
        items
    }
}

enum ShuffleStage {
    Disabled,
    Reservoir(Reservoir),
}

/// Resolved, per-epoch state of the instance stream. Constructed once per
/// epoch by the controller; `reset` either reuses or reseeds this
/// depending on `reshuffle_each_epoch`.
pub struct InstanceStream {
    skip_remaining: u64,
    limit_remaining: Option<u64>,
    shard_index: u32,
    num_shards: u32,
    post_filter_index: u64,
    shuffle: ShuffleStage,
    subsample_ratio: f64,
    subsample_rng: Pcg64Mcg,
    next_ordinal: u64,
}

/// Owns the seed state across epochs so `reset` can honour
/// `reshuffle_each_epoch` (§4.3, §4.7).
pub struct ShuffleSeedState {
    seed: u64,
    reshuffle_each_epoch: bool,
}

impl ShuffleSeedState {
    pub fn new(configured: Option<u64>, reshuffle_each_epoch: bool) -> Self {
        ShuffleSeedState {
            seed: configured.unwrap_or_else(sample_fresh_seed),
            reshuffle_each_epoch,
        }
    }

    pub fn current_seed(&self) -> u64 {
        self.seed
    }

    /// Called by the controller on `reset`.
    pub fn on_reset(&mut self) {
        if self.reshuffle_each_epoch {
            self.seed = sample_fresh_seed();
        }
    }
}

impl InstanceStream {
    pub fn new(cfg: &ReaderConfig, seed_state: &ShuffleSeedState) -> Self {
        let shuffle_seed = seed_state.current_seed();
        let shuffle = if cfg.shuffle_instances && cfg.shuffle_window > 0 {
            ShuffleStage::Reservoir(Reservoir::new(cfg.shuffle_window, shuffle_seed))
        } else {
            ShuffleStage::Disabled
        };
        InstanceStream {
            skip_remaining: cfg.num_instances_to_skip,
            limit_remaining: cfg.num_instances_to_read,
            shard_index: cfg.shard_index,
            num_shards: cfg.num_shards,
            post_filter_index: 0,
            shuffle,
            subsample_ratio: cfg.subsample_ratio,
            subsample_rng: Pcg64Mcg::seed_from_u64(derive_subsample_seed(shuffle_seed)),
            next_ordinal: 0,
        }
    }

    fn sharding_enabled(&self) -> bool {
        self.num_shards > 1
    }

    /// Runs skip/limit/shard on one record; `Some` means it survives to
    /// the shuffle stage.
    fn pre_shuffle(&mut self, record: Record) -> Option<Record> {
        if !record.kind.is_data() {
            return None;
        }
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            return None;
        }
        if let Some(remaining) = self.limit_remaining {
            if remaining == 0 {
                return None;
            }
        }
        let idx = self.post_filter_index;
        self.post_filter_index += 1;
        if let Some(remaining) = self.limit_remaining.as_mut() {
            *remaining -= 1;
        }
        if self.sharding_enabled() && (idx % self.num_shards as u64) != self.shard_index as u64 {
            return None;
        }
        Some(record)
    }

    fn post_shuffle(&mut self, record: Record) -> Option<Instance> {
        if self.subsample_ratio < 1.0 && self.subsample_rng.gen::<f64>() >= self.subsample_ratio {
            return None;
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        Some(Instance {
            store_id: record.store_id,
            ordinal,
            payload: record.payload,
        })
    }

    /// Feeds one record through the full C3 pipeline. May emit zero or
    /// one instance immediately (reservoir shuffling can also emit an
    /// evicted/bypassed record here).
    pub fn push(&mut self, record: Record) -> Option<Instance> {
        let shard_survivor = self.pre_shuffle(record)?;
        let shuffled = match &mut self.shuffle {
            ShuffleStage::Disabled => Some(shard_survivor),
            ShuffleStage::Reservoir(r) => r.push(shard_survivor),
        };
        shuffled.and_then(|r| self.post_shuffle(r))
    }

    /// Drains the shuffle reservoir (if any) at end of input, in random
    /// order, applying subsample to each drained item.
    pub fn finish(&mut self) -> Vec<Instance> {
        let drained = match &mut self.shuffle {
            ShuffleStage::Disabled => Vec::new(),
            ShuffleStage::Reservoir(r) => r.drain(),
        };
        drained
            .into_iter()
            .filter_map(|r| self.post_shuffle(r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreId;
    use crate::record::RecordKind;
    use bytes::Bytes;

    fn data_record(n: u64) -> Record {
        Record {
            store_id: StoreId(0),
            kind: RecordKind::Data,
            payload: Bytes::from(n.to_le_bytes().to_vec()),
        }
    }

    fn run(cfg: &ReaderConfig, seed_state: &ShuffleSeedState, n: u64) -> Vec<u64> {
        let mut stream = InstanceStream::new(cfg, seed_state);
        let mut out = Vec::new();
        for i in 0..n {
            if let Some(inst) = stream.push(data_record(i)) {
                out.push(u64::from_le_bytes(inst.payload[..].try_into().unwrap()));
            }
        }
        for inst in stream.finish() {
            out.push(u64::from_le_bytes(inst.payload[..].try_into().unwrap()));
        }
        out
    }

    #[test]
    fn sharding_partitions_the_full_set() {
        let mut base = ReaderConfig::default();
        base.num_shards = 4;
        let mut union: Vec<u64> = Vec::new();
        for shard in 0..4 {
            let mut cfg = base.clone();
            cfg.shard_index = shard;
            let seed_state = ShuffleSeedState::new(Some(1), false);
            union.extend(run(&cfg, &seed_state, 100));
        }
        union.sort();
        let expected: Vec<u64> = (0..100).collect();
        assert_eq!(union, expected);
    }

    #[test]
    fn shard_index_one_of_four_matches_residues() {
        let mut cfg = ReaderConfig::default();
        cfg.num_shards = 4;
        cfg.shard_index = 1;
        let seed_state = ShuffleSeedState::new(Some(1), false);
        let got = run(&cfg, &seed_state, 100);
        let expected: Vec<u64> = (0..100).filter(|i| i % 4 == 1).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn perfect_shuffle_window_zero_equals_dataset_size_is_deterministic() {
        let mut cfg = ReaderConfig::default();
        cfg.shuffle_instances = true;
        cfg.shuffle_window = 100;
        let seed_state = ShuffleSeedState::new(Some(42), false);
        let first = run(&cfg, &seed_state, 100);
        let seed_state2 = ShuffleSeedState::new(Some(42), false);
        let second = run(&cfg, &seed_state2, 100);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn skip_and_limit_apply_before_sharding() {
        let mut cfg = ReaderConfig::default();
        cfg.num_instances_to_skip = 10;
        cfg.num_instances_to_read = Some(5);
        let seed_state = ShuffleSeedState::new(Some(1), false);
        let got = run(&cfg, &seed_state, 100);
        assert_eq!(got, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn subsample_ratio_one_keeps_everything() {
        let mut cfg = ReaderConfig::default();
        cfg.subsample_ratio = 1.0;
        let seed_state = ShuffleSeedState::new(Some(1), false);
        let got = run(&cfg, &seed_state, 50);
        assert_eq!(got, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn reshuffle_each_epoch_false_reproduces_same_seed() {
        let mut state = ShuffleSeedState::new(None, false);
        let seed = state.current_seed();
        state.on_reset();
        assert_eq!(state.current_seed(), seed);
    }

    #[test]
    fn reshuffle_each_epoch_true_changes_seed() {
        let mut state = ShuffleSeedState::new(Some(7), true);
        state.on_reset();
        // With an explicit initial seed but reshuffle enabled, a reset
        // still draws a fresh seed rather than reusing the configured one.
        assert_ne!(state.current_seed(), 7);
    }
}
