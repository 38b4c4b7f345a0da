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

//! Ordered prefetch queue (C6): a reorder buffer keyed by batch index.
//! Workers publish results in whatever order they finish; the consumer
//! always observes them in batch-index order (§4.6).
//!
//! Synchronisation matches §5's "single mutex plus a condition variable":
//! a `std::sync::Mutex` guards the reorder map (workers publish from
//! blocking-pool threads, so a blocking lock is the right tool), and a
//! `tokio::sync::Notify` stands in for the condition variable so the
//! async consumer can suspend without holding the lock across an await.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use databatch_core::error::{Error, Result};

use crate::example::Example;

enum Slot {
    Ready(Example),
    Tombstone,
    Fault(Error),
}

struct Inner {
    next_expected: u64,
    slots: BTreeMap<u64, Slot>,
    /// Set once the ingest task has emitted its last batch; `None` while
    /// the epoch is still producing batches.
    total_batches: Option<u64>,
    /// Rendered message of the fault that poisoned the pipeline, once the
    /// first caller has observed and consumed the original `Error`.
    poisoned: Option<Arc<str>>,
    reset_requested: bool,
}

/// What a resolved `next` yields.
pub enum Resolved {
    Example(Example),
    Ended,
}

/// Capacity is informational here: the real bound on outstanding entries
/// is the bounded channel feeding the decode pool (§4.5/§5); this queue
/// never holds more than `capacity` unresolved slots as a result, and the
/// field exists so that invariant is checkable in tests rather than
/// enforced redundantly at runtime.
pub struct OrderedQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl OrderedQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(OrderedQueue {
            capacity,
            inner: Mutex::new(Inner {
                next_expected: 0,
                slots: BTreeMap::new(),
                total_batches: None,
                poisoned: None,
                reset_requested: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently buffered awaiting consumption, for
    /// backpressure assertions in tests.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    fn insert(&self, batch_index: u64, slot: Slot) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.insert(batch_index, slot);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Called by a decode worker with a successfully decoded example.
    pub fn publish_ready(&self, batch_index: u64, example: Example) {
        self.insert(batch_index, Slot::Ready(example));
    }

    /// Called by a decode worker (under `skip`/`warn`) or by the ingest
    /// task for non-data padding; the queue advances past it silently.
    pub fn publish_tombstone(&self, batch_index: u64) {
        self.insert(batch_index, Slot::Tombstone);
    }

    /// Called by a decode worker (under `bad_batch_handling: error`), or
    /// by the ingest task itself for an I/O/framing fault at the index
    /// the next batch would have taken. The fault propagates to whichever
    /// caller's `next_expected` first reaches this index, then poisons
    /// the queue permanently.
    pub fn publish_fault(&self, batch_index: u64, error: Error) {
        self.insert(batch_index, Slot::Fault(error));
    }

    /// Called once the ingest task has formed its last batch (or formed
    /// none at all, `n == 0`); lets the queue recognise end-of-epoch
    /// instead of waiting forever for more input.
    pub fn set_total_batches(&self, n: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_batches = Some(n);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// `reset`/destruction: every pending and future call returns
    /// `Error::Reset` until the controller replaces this queue outright.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.reset_requested = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Shared resolution logic for `next`/`peek`. `consume` controls
    /// whether a resolved `Ready` slot is removed (advancing
    /// `next_expected`) or left in place for a repeated `peek`.
    async fn resolve(&self, consume: bool) -> Result<Resolved> {
        loop {
            let notified = {
                let mut inner = self.inner.lock().unwrap();

                if inner.reset_requested {
                    return Err(Error::Reset);
                }
                if let Some(msg) = &inner.poisoned {
                    return Err(Error::Poisoned(msg.clone()));
                }

                // Skip past tombstones transparently.
                loop {
                    match inner.slots.get(&inner.next_expected) {
                        Some(Slot::Tombstone) => {
                            inner.slots.remove(&inner.next_expected);
                            inner.next_expected += 1;
                        }
                        _ => break,
                    }
                }

                match inner.slots.get(&inner.next_expected) {
                    Some(Slot::Ready(_)) => {
                        let idx = inner.next_expected;
                        if consume {
                            let slot = inner.slots.remove(&idx).expect("checked present");
                            inner.next_expected += 1;
                            let Slot::Ready(example) = slot else {
                                unreachable!("matched Ready above")
                            };
                            return Ok(Resolved::Example(example));
                        } else if let Some(Slot::Ready(example)) = inner.slots.get(&idx) {
                            return Ok(Resolved::Example(example.clone()));
                        }
                    }
                    Some(Slot::Fault(_)) => {
                        let idx = inner.next_expected;
                        let Slot::Fault(error) = inner.slots.remove(&idx).unwrap() else {
                            unreachable!("matched Fault above")
                        };
                        inner.poisoned = Some(error.message());
                        return Err(error);
                    }
                    Some(Slot::Tombstone) => unreachable!("drained above"),
                    None => {
                        if let Some(total) = inner.total_batches {
                            if inner.next_expected >= total {
                                return Ok(Resolved::Ended);
                            }
                        }
                    }
                }

                self.notify.notified()
            };
            notified.await;
        }
    }

    pub async fn next(&self) -> Result<Resolved> {
        self.resolve(true).await
    }

    pub async fn peek(&self) -> Result<Resolved> {
        self.resolve(false).await
    }
}
