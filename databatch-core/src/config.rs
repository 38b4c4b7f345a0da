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

//! Recognised configuration options (§6) with the validation that must
//! run synchronously at construction, before the controller ever enters
//! `running` (§7, category 1).

use crate::error::{Error, Result};

/// What to do with a short tail batch at end of epoch (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastBatchPolicy {
    /// Emit a short batch, marked final.
    None,
    /// Discard the tail; no final short batch.
    Drop,
    /// Pad the tail with zero instances up to `batch_size`.
    Pad,
}

/// What to do when a worker's `decode` call returns a fault (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadBatchHandling {
    /// Surface the fault; the controller is poisoned.
    Error,
    /// Drop the batch; the reorder queue sees a tombstone at that index.
    Skip,
    /// Same as `Skip`, plus a diagnostic is emitted via `log::warn!`.
    Warn,
}

#[derive(Clone, Debug)]
pub struct ReaderConfig {
    pub batch_size: usize,
    /// 0 means "use hardware concurrency".
    pub num_prefetched_batches: usize,
    /// 0 means "use the resolved `num_prefetched_batches`".
    pub num_parallel_reads: usize,
    pub last_batch_handling: LastBatchPolicy,
    pub bad_batch_handling: BadBatchHandling,
    pub num_instances_to_skip: u64,
    pub num_instances_to_read: Option<u64>,
    pub shard_index: u32,
    pub num_shards: u32,
    pub shuffle_instances: bool,
    pub shuffle_window: usize,
    pub shuffle_seed: Option<u64>,
    pub reshuffle_each_epoch: bool,
    pub subsample_ratio: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            batch_size: 1,
            num_prefetched_batches: 0,
            num_parallel_reads: 0,
            last_batch_handling: LastBatchPolicy::None,
            bad_batch_handling: BadBatchHandling::Error,
            num_instances_to_skip: 0,
            num_instances_to_read: None,
            shard_index: 0,
            num_shards: 0,
            shuffle_instances: false,
            shuffle_window: 0,
            shuffle_seed: None,
            reshuffle_each_epoch: false,
            subsample_ratio: 1.0,
        }
    }
}

impl ReaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be >= 1"));
        }
        if self.num_shards > 1 && self.shard_index >= self.num_shards {
            return Err(Error::config(format!(
                "shard_index ({}) must be < num_shards ({})",
                self.shard_index, self.num_shards
            )));
        }
        if !(self.subsample_ratio > 0.0 && self.subsample_ratio <= 1.0) {
            return Err(Error::config(
                "subsample_ratio must satisfy 0 < r <= 1",
            ));
        }
        Ok(())
    }

    /// Whether sharding is active (`K=0` or `K=1` disables it, §4.3).
    pub fn sharding_enabled(&self) -> bool {
        self.num_shards > 1
    }

    fn hardware_concurrency() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// *P* in §5: the prefetch depth / decode channel capacity.
    pub fn effective_num_prefetched_batches(&self) -> usize {
        if self.num_prefetched_batches == 0 {
            Self::hardware_concurrency()
        } else {
            self.num_prefetched_batches
        }
    }

    /// *N* in §4.5: the decode worker pool size.
    pub fn effective_num_parallel_reads(&self) -> usize {
        if self.num_parallel_reads == 0 {
            self.effective_num_prefetched_batches()
        } else {
            self.num_parallel_reads
        }
    }
}

/// Builder mirroring the corpus's `DataLoaderBuilder`-style construction.
#[derive(Default)]
pub struct ReaderConfigBuilder {
    cfg: ReaderConfig,
}

impl ReaderConfigBuilder {
    pub fn new() -> Self {
        ReaderConfigBuilder {
            cfg: ReaderConfig::default(),
        }
    }

    pub fn batch_size(mut self, v: usize) -> Self {
        self.cfg.batch_size = v;
        self
    }

    pub fn num_prefetched_batches(mut self, v: usize) -> Self {
        self.cfg.num_prefetched_batches = v;
        self
    }

    pub fn num_parallel_reads(mut self, v: usize) -> Self {
        self.cfg.num_parallel_reads = v;
        self
    }

    pub fn last_batch_handling(mut self, v: LastBatchPolicy) -> Self {
        self.cfg.last_batch_handling = v;
        self
    }

    pub fn bad_batch_handling(mut self, v: BadBatchHandling) -> Self {
        self.cfg.bad_batch_handling = v;
        self
    }

    pub fn num_instances_to_skip(mut self, v: u64) -> Self {
        self.cfg.num_instances_to_skip = v;
        self
    }

    pub fn num_instances_to_read(mut self, v: u64) -> Self {
        self.cfg.num_instances_to_read = Some(v);
        self
    }

    pub fn shard(mut self, shard_index: u32, num_shards: u32) -> Self {
        self.cfg.shard_index = shard_index;
        self.cfg.num_shards = num_shards;
        self
    }

    pub fn shuffle(mut self, window: usize, seed: Option<u64>, reshuffle_each_epoch: bool) -> Self {
        self.cfg.shuffle_instances = window > 0;
        self.cfg.shuffle_window = window;
        self.cfg.shuffle_seed = seed;
        self.cfg.reshuffle_each_epoch = reshuffle_each_epoch;
        self
    }

    pub fn subsample_ratio(mut self, v: f64) -> Self {
        self.cfg.subsample_ratio = v;
        self
    }

    pub fn build(self) -> Result<ReaderConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
