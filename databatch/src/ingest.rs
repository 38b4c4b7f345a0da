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

//! The ingest task: C1 (dataset cursor) through C4 (batch former) running
//! on a single blocking-pool task (§5). Reading a store is fundamentally
//! synchronous I/O, so the whole loop runs inside
//! `tokio::task::spawn_blocking` rather than as a plain async task;
//! `tx.blocking_send` applies the natural channel backpressure that
//! bounds prefetch depth.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use databatch_core::batch::BatchFormer;
use databatch_core::error::{Error, StoreId};
use databatch_core::instance::InstanceStream;
use databatch_core::metrics::Metrics;
use databatch_core::segment::RecordSegmenter;
use databatch_core::store::{DataStoreFactory, DatasetCursor, Pulled};

use databatch_exec::decoder::Decoder;
use databatch_exec::queue::OrderedQueue;

pub fn run(
    decoder: Arc<dyn Decoder>,
    factories: Vec<Arc<dyn DataStoreFactory>>,
    batch_size: usize,
    last_batch_handling: databatch_core::config::LastBatchPolicy,
    metrics: Arc<Metrics>,
    queue: Arc<OrderedQueue>,
    tx: mpsc::Sender<databatch_core::batch::BatchDescriptor>,
    cancel: CancellationToken,
    mut instances: InstanceStream,
) {
    let mut cursor = DatasetCursor::new(factories);
    let mut former = BatchFormer::new(batch_size, last_batch_handling);
    let mut segmenter: Option<Box<dyn RecordSegmenter>> = None;
    let mut current_store: Option<StoreId> = None;
    // `resynced_bytes()` is cumulative for a segmenter's lifetime; track what
    // has already been reported so each call adds only the fresh delta.
    let mut resync_baseline: u64 = 0;

    macro_rules! fail_and_stop {
        ($err:expr) => {{
            poison(&queue, &former, $err);
            return;
        }};
    }

    macro_rules! report_resyncs {
        ($seg:expr) => {{
            let total = $seg.resynced_bytes();
            metrics.add_resyncs(total - resync_baseline);
            resync_baseline = total;
        }};
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }
        match cursor.pull() {
            Ok(Pulled::Chunk(chunk)) => {
                metrics.add_bytes_read(chunk.len() as u64);
                let store_id = current_store.expect("a chunk always belongs to an open store");
                let seg = segmenter.as_mut().expect("segmenter opened at store boundary");
                seg.feed(chunk);
                match seg.drain(store_id) {
                    Ok(records) => {
                        report_resyncs!(seg);
                        if !emit_records(records, &mut instances, &mut former, &metrics, &tx) {
                            return; // consumer side gone.
                        }
                    }
                    Err(err) => fail_and_stop!(err),
                }
            }
            Ok(Pulled::StoreBoundary) => {
                if let (Some(prev_id), Some(mut seg)) = (current_store.take(), segmenter.take()) {
                    match seg.finish_store(prev_id) {
                        Ok(records) => {
                            report_resyncs!(seg);
                            if !emit_records(records, &mut instances, &mut former, &metrics, &tx) {
                                return;
                            }
                        }
                        Err(err) => fail_and_stop!(err),
                    }
                }
                let new_id = cursor
                    .current_store_id()
                    .expect("cursor just opened a store for this boundary");
                current_store = Some(new_id);
                segmenter = Some(decoder.make_record_reader(new_id));
                resync_baseline = 0;
            }
            Ok(Pulled::End) => {
                if let (Some(prev_id), Some(mut seg)) = (current_store.take(), segmenter.take()) {
                    match seg.finish_store(prev_id) {
                        Ok(records) => {
                            report_resyncs!(seg);
                            if !emit_records(records, &mut instances, &mut former, &metrics, &tx) {
                                return;
                            }
                        }
                        Err(err) => fail_and_stop!(err),
                    }
                }
                for instance in instances.finish() {
                    if let Some(batch) = former.push(instance) {
                        metrics.inc_batches_formed();
                        if tx.blocking_send(batch).is_err() {
                            return;
                        }
                    }
                }
                if let Some(batch) = former.finish() {
                    metrics.inc_batches_formed();
                    if tx.blocking_send(batch).is_err() {
                        return;
                    }
                }
                queue.set_total_batches(former.next_batch_index());
                return;
            }
            Err(err) => fail_and_stop!(err),
        }
    }
}

/// Feeds freshly segmented records through C3 (instance stream) and C4
/// (batch former), sending any completed batch downstream. Returns
/// `false` if the channel is closed (decode pool gone), signalling the
/// ingest loop to stop.
fn emit_records(
    records: Vec<databatch_core::record::Record>,
    instances: &mut InstanceStream,
    former: &mut BatchFormer,
    metrics: &Metrics,
    tx: &mpsc::Sender<databatch_core::batch::BatchDescriptor>,
) -> bool {
    for record in records {
        metrics.add_records_read(1);
        if !record.kind.is_data() {
            metrics.add_records_dropped(1);
        }
        if let Some(instance) = instances.push(record) {
            if let Some(batch) = former.push(instance) {
                metrics.inc_batches_formed();
                if tx.blocking_send(batch).is_err() {
                    return false;
                }
            }
        }
    }
    true
}

/// Places the fault at the index the next batch would have taken, then
/// marks that as the final index so the queue stops waiting for more
/// (§7 categories 2/3: I/O and framing faults are always fatal).
fn poison(queue: &OrderedQueue, former: &BatchFormer, err: Error) {
    let idx = former.next_batch_index();
    queue.publish_fault(idx, err);
    queue.set_total_batches(idx + 1);
}
