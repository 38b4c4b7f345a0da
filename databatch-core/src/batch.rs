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

//! Batch former (C4): groups instances into fixed-size batches and tags
//! each with a monotonic batch index (§4.4).

use crate::config::LastBatchPolicy;
use crate::error::StoreId;
use crate::record::Instance;

/// Output of the batch former. `batch_index` is assigned monotonically
/// starting at 0 per epoch; `padding` counts synthetic rows appended under
/// the `pad` last-batch policy.
#[derive(Debug)]
pub struct BatchDescriptor {
    pub batch_index: u64,
    pub instances: Vec<Instance>,
    pub is_final: bool,
    pub padding: usize,
}

pub struct BatchFormer {
    batch_size: usize,
    policy: LastBatchPolicy,
    pending: Vec<Instance>,
    next_batch_index: u64,
}

impl BatchFormer {
    pub fn new(batch_size: usize, policy: LastBatchPolicy) -> Self {
        assert!(batch_size > 0, "batch_size must be validated before use");
        BatchFormer {
            batch_size,
            policy,
            pending: Vec::with_capacity(batch_size),
            next_batch_index: 0,
        }
    }

    fn take_batch(&mut self, is_final: bool, padding: usize) -> BatchDescriptor {
        let instances = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let batch_index = self.next_batch_index;
        self.next_batch_index += 1;
        BatchDescriptor {
            batch_index,
            instances,
            is_final,
            padding,
        }
    }

    /// The index the next batch formed (or faulted in its place by the
    /// ingest task) will receive.
    pub fn next_batch_index(&self) -> u64 {
        self.next_batch_index
    }

    /// Feeds one instance; returns a completed batch once `batch_size`
    /// instances have accumulated.
    pub fn push(&mut self, instance: Instance) -> Option<BatchDescriptor> {
        self.pending.push(instance);
        if self.pending.len() == self.batch_size {
            Some(self.take_batch(false, 0))
        } else {
            None
        }
    }

    /// Called once the instance stream is exhausted. Applies the
    /// last-batch policy to whatever remains buffered.
    pub fn finish(&mut self) -> Option<BatchDescriptor> {
        if self.pending.is_empty() {
            return None;
        }
        match self.policy {
            LastBatchPolicy::None => Some(self.take_batch(true, 0)),
            LastBatchPolicy::Drop => {
                self.pending.clear();
                None
            }
            LastBatchPolicy::Pad => {
                let tail = self.pending.len();
                let padding = self.batch_size - tail;
                let pad_store = self
                    .pending
                    .last()
                    .map(|i| i.store_id)
                    .unwrap_or(StoreId(0));
                for _ in 0..padding {
                    let ordinal = self.pending.last().map(|i| i.ordinal + 1).unwrap_or(0);
                    self.pending.push(Instance::zero(pad_store, ordinal));
                }
                Some(self.take_batch(true, padding))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreId;
    use bytes::Bytes;

    fn instance(n: u64) -> Instance {
        Instance {
            store_id: StoreId(0),
            ordinal: n,
            payload: Bytes::new(),
        }
    }

    fn sizes(batches: &[BatchDescriptor]) -> Vec<usize> {
        batches.iter().map(|b| b.instances.len()).collect()
    }

    fn drive(n: u64, batch_size: usize, policy: LastBatchPolicy) -> Vec<BatchDescriptor> {
        let mut former = BatchFormer::new(batch_size, policy);
        let mut out = Vec::new();
        for i in 0..n {
            if let Some(b) = former.push(instance(i)) {
                out.push(b);
            }
        }
        if let Some(b) = former.finish() {
            out.push(b);
        }
        out
    }

    #[test]
    fn scenario_1_last_batch_none() {
        let batches = drive(17, 5, LastBatchPolicy::None);
        assert_eq!(sizes(&batches), vec![5, 5, 5, 2]);
        assert!(batches.last().unwrap().is_final);
        assert_eq!(
            batches.iter().map(|b| b.batch_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn scenario_2_last_batch_drop() {
        let batches = drive(17, 5, LastBatchPolicy::Drop);
        assert_eq!(sizes(&batches), vec![5, 5, 5]);
    }

    #[test]
    fn scenario_3_last_batch_pad() {
        let batches = drive(17, 5, LastBatchPolicy::Pad);
        assert_eq!(sizes(&batches), vec![5, 5, 5, 5]);
        assert_eq!(batches.last().unwrap().padding, 3);
        assert!(batches[..3].iter().all(|b| b.padding == 0));
    }

    #[test]
    fn exact_multiple_has_no_final_short_batch() {
        let batches = drive(15, 5, LastBatchPolicy::None);
        assert_eq!(sizes(&batches), vec![5, 5, 5]);
        assert!(!batches.last().unwrap().is_final);
    }
}
