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

//! Decode pool (C5): `N` worker tasks pulling batch descriptors off the
//! bounded channel C4 feeds and publishing decoded results to the
//! reorder queue (C6). Each worker runs on `tokio::task::spawn_blocking`
//! so a genuinely CPU-bound `decode` call occupies its own OS thread
//! rather than stalling the async runtime (§5's mapping decision, see
//! DESIGN.md).

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use databatch_core::batch::BatchDescriptor;
use databatch_core::config::BadBatchHandling;
use databatch_core::error::Error;
use databatch_core::metrics::Metrics;

use crate::decoder::Decoder;
use crate::queue::OrderedQueue;
use crate::schema::SchemaCell;

/// Shared receiving end so `N` blocking-pool workers can compete for the
/// next batch descriptor; `mpsc::Receiver` itself only supports a single
/// owner, hence the mutex. Workers hold the lock only for the duration of
/// `blocking_recv`, never across a decode call.
type SharedReceiver = Arc<StdMutex<mpsc::Receiver<BatchDescriptor>>>;

pub struct DecodePool {
    workers: Vec<JoinHandle<()>>,
}

impl DecodePool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        decoder: Arc<dyn Decoder>,
        num_workers: usize,
        rx: mpsc::Receiver<BatchDescriptor>,
        queue: Arc<OrderedQueue>,
        bad_batch_handling: BadBatchHandling,
        metrics: Arc<Metrics>,
        schema: Arc<SchemaCell>,
        cancel: CancellationToken,
    ) -> Self {
        let rx: SharedReceiver = Arc::new(StdMutex::new(rx));
        let workers = (0..num_workers.max(1))
            .map(|_| {
                let decoder = decoder.clone();
                let rx = rx.clone();
                let queue = queue.clone();
                let metrics = metrics.clone();
                let schema = schema.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    worker_loop(decoder, rx, queue, bad_batch_handling, metrics, schema, cancel)
                })
            })
            .collect();
        DecodePool { workers }
    }

    /// Awaits every worker's termination; used by the controller during
    /// `reset` and at clean end-of-epoch.
    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn worker_loop(
    decoder: Arc<dyn Decoder>,
    rx: SharedReceiver,
    queue: Arc<OrderedQueue>,
    bad_batch_handling: BadBatchHandling,
    metrics: Arc<Metrics>,
    schema: Arc<SchemaCell>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let batch = {
            let mut guard = rx.lock().expect("decode pool receiver mutex poisoned");
            guard.blocking_recv()
        };
        let Some(batch) = batch else {
            return; // channel closed: ingest is done feeding this pool.
        };
        if cancel.is_cancelled() {
            return;
        }

        let batch_index = batch.batch_index;
        match decoder.decode(&batch) {
            Ok(example) => {
                if let Some(fault) = validate_schema(&schema, &example, batch_index) {
                    queue.publish_fault(batch_index, fault);
                    continue;
                }
                metrics.inc_batches_decoded();
                queue.publish_ready(batch_index, example);
            }
            Err(reason) => match bad_batch_handling {
                BadBatchHandling::Error => {
                    queue.publish_fault(batch_index, Error::BadBatch { batch_index, reason });
                }
                BadBatchHandling::Skip => {
                    metrics.inc_batches_skipped();
                    queue.publish_tombstone(batch_index);
                }
                BadBatchHandling::Warn => {
                    metrics.inc_batches_warned();
                    log::warn!("bad batch at index {batch_index}: {reason}");
                    queue.publish_tombstone(batch_index);
                }
            },
        }
    }
}

/// Installs the schema from the first non-empty example, or validates a
/// later example's derived shape against the one already cached (§3,
/// §4.5, §7 category 5). Returns the fatal error to surface, if any.
fn validate_schema(
    cell: &SchemaCell,
    example: &crate::example::Example,
    batch_index: u64,
) -> Option<Error> {
    if example.is_empty() {
        return None;
    }
    let derived = example.infer_schema();
    let effective = cell.get_or_init(derived.clone());
    if effective.matches(&derived) {
        None
    } else {
        Some(Error::SchemaMismatch {
            batch_index,
            expected: effective.to_string(),
            found: derived.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use databatch_core::error::StoreId;
    use databatch_core::record::Instance;
    use databatch_core::segment::RecordSegmenter;
    use std::sync::Arc as StdArc;

    struct EchoDecoder;

    impl Decoder for EchoDecoder {
        fn make_record_reader(&self, _store_id: StoreId) -> Box<dyn RecordSegmenter> {
            unimplemented!("not exercised in this test")
        }

        fn decode(&self, batch: &BatchDescriptor) -> std::result::Result<crate::example::Example, String> {
            let values: Vec<i64> = batch
                .instances
                .iter()
                .map(|i| i.payload.len() as i64)
                .collect();
            let arr: ArrayRef = StdArc::new(Int64Array::from(values));
            Ok(crate::example::Example::new(
                vec![("len".to_string(), arr)],
                batch.padding,
            ))
        }
    }

    struct FailingDecoder;

    impl Decoder for FailingDecoder {
        fn make_record_reader(&self, _store_id: StoreId) -> Box<dyn RecordSegmenter> {
            unimplemented!("not exercised in this test")
        }

        fn decode(&self, _batch: &BatchDescriptor) -> std::result::Result<crate::example::Example, String> {
            Err("deliberately broken".to_string())
        }
    }

    fn instance(n: u64) -> Instance {
        Instance {
            store_id: StoreId(0),
            ordinal: n,
            payload: bytes::Bytes::from(vec![0u8; n as usize + 1]),
        }
    }

    fn batch(idx: u64, n: u64) -> BatchDescriptor {
        BatchDescriptor {
            batch_index: idx,
            instances: (0..n).map(instance).collect(),
            is_final: false,
            padding: 0,
        }
    }

    #[tokio::test]
    async fn decodes_batches_out_of_send_order_into_ordered_output() {
        let (tx, rx) = mpsc::channel(4);
        let queue = OrderedQueue::new(4);
        let pool = DecodePool::spawn(
            StdArc::new(EchoDecoder),
            2,
            rx,
            queue.clone(),
            BadBatchHandling::Error,
            StdArc::new(Metrics::new()),
            StdArc::new(SchemaCell::new()),
            CancellationToken::new(),
        );

        for i in 0..5u64 {
            tx.send(batch(i, 1)).await.unwrap();
        }
        drop(tx);
        queue.set_total_batches(5);

        for expected in 0..5i64 {
            match queue.next().await.unwrap() {
                crate::queue::Resolved::Example(e) => {
                    let arr = e.tensors[0]
                        .1
                        .as_any()
                        .downcast_ref::<Int64Array>()
                        .unwrap();
                    assert_eq!(arr.value(0), expected + 1);
                }
                crate::queue::Resolved::Ended => panic!("ended early"),
            }
        }
        pool.join().await;
    }

    #[tokio::test]
    async fn bad_batch_skip_tombstones_without_poisoning() {
        let (tx, rx) = mpsc::channel(4);
        let queue = OrderedQueue::new(4);
        let pool = DecodePool::spawn(
            StdArc::new(FailingDecoder),
            1,
            rx,
            queue.clone(),
            BadBatchHandling::Skip,
            StdArc::new(Metrics::new()),
            StdArc::new(SchemaCell::new()),
            CancellationToken::new(),
        );

        tx.send(batch(0, 1)).await.unwrap();
        drop(tx);
        queue.set_total_batches(1);

        assert!(matches!(
            queue.next().await.unwrap(),
            crate::queue::Resolved::Ended
        ));
        pool.join().await;
    }

    #[tokio::test]
    async fn bad_batch_error_poisons_the_queue() {
        let (tx, rx) = mpsc::channel(4);
        let queue = OrderedQueue::new(4);
        let pool = DecodePool::spawn(
            StdArc::new(FailingDecoder),
            1,
            rx,
            queue.clone(),
            BadBatchHandling::Error,
            StdArc::new(Metrics::new()),
            StdArc::new(SchemaCell::new()),
            CancellationToken::new(),
        );

        tx.send(batch(0, 1)).await.unwrap();
        drop(tx);
        queue.set_total_batches(1);

        let err = queue.next().await.unwrap_err();
        assert!(matches!(err, Error::BadBatch { .. }));
        pool.join().await;
    }
}
