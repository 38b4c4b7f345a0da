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

//! Per-epoch counters (§4.10), a lighter-weight analog of the teacher's
//! `ExecutionPlanMetricsSet`/`BaselineMetrics`: this pipeline has no
//! optimizer consuming a `MetricsSet`, so plain atomics exposed read-only
//! through the controller are enough.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub records_read: AtomicU64,
    pub records_dropped: AtomicU64,
    pub bytes_read: AtomicU64,
    pub batches_formed: AtomicU64,
    pub batches_decoded: AtomicU64,
    pub batches_skipped: AtomicU64,
    pub batches_warned: AtomicU64,
    pub resyncs: AtomicU64,
}

/// A consistent-enough point-in-time snapshot for reporting; individual
/// counters are read independently so it is not a single atomic
/// transaction, which is fine for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_dropped: u64,
    pub bytes_read: u64,
    pub batches_formed: u64,
    pub batches_decoded: u64,
    pub batches_skipped: u64,
    pub batches_warned: u64,
    pub resyncs: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records_read(&self, n: u64) {
        self.records_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_records_dropped(&self, n: u64) {
        self.records_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_batches_formed(&self) {
        self.batches_formed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches_decoded(&self) {
        self.batches_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches_skipped(&self) {
        self.batches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches_warned(&self) {
        self.batches_warned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_resyncs(&self, n: u64) {
        self.resyncs.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            batches_formed: self.batches_formed.load(Ordering::Relaxed),
            batches_decoded: self.batches_decoded.load(Ordering::Relaxed),
            batches_skipped: self.batches_skipped.load(Ordering::Relaxed),
            batches_warned: self.batches_warned.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}
