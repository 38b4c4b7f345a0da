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

//! Controller (C7): the public surface (`next`/`peek`/`reset`/lifecycle)
//! and the state machine of §4.7.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use databatch_core::config::ReaderConfig;
use databatch_core::error::{Error, Result};
use databatch_core::instance::{InstanceStream, ShuffleSeedState};
use databatch_core::metrics::{Metrics, MetricsSnapshot};
use databatch_core::store::DataStoreFactory;

use databatch_exec::decoder::Decoder;
use databatch_exec::example::Example;
use databatch_exec::pool::DecodePool;
use databatch_exec::queue::{OrderedQueue, Resolved};
use databatch_exec::schema::{Schema, SchemaCell};

/// What a resolved `next()` call yields (§6).
#[derive(Debug)]
pub enum NextItem {
    Example(Example),
    End,
}

struct Epoch {
    ingest: JoinHandle<()>,
    pool: DecodePool,
    queue: Arc<OrderedQueue>,
    cancel: CancellationToken,
}

enum State {
    Idle,
    Running(Epoch),
    Ended,
    Poisoned(Arc<str>),
}

/// The `DatasetReader` public facade: one logical dataset, read in
/// ordered batches with parallel decode and bounded prefetch (§4.7).
pub struct DatasetReader {
    config: ReaderConfig,
    factories: Vec<Arc<dyn DataStoreFactory>>,
    decoder: Arc<dyn Decoder>,
    seed_state: AsyncMutex<ShuffleSeedState>,
    state: AsyncMutex<State>,
    current_metrics: StdMutex<Option<Arc<Metrics>>>,
    current_schema: StdMutex<Option<Arc<SchemaCell>>>,
}

impl DatasetReader {
    fn new(
        config: ReaderConfig,
        factories: Vec<Arc<dyn DataStoreFactory>>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let seed_state = ShuffleSeedState::new(config.shuffle_seed, config.reshuffle_each_epoch);
        DatasetReader {
            config,
            factories,
            decoder,
            seed_state: AsyncMutex::new(seed_state),
            state: AsyncMutex::new(State::Idle),
            current_metrics: StdMutex::new(None),
            current_schema: StdMutex::new(None),
        }
    }

    /// Cumulative bytes pulled through C1 across the current epoch; may
    /// legally exceed what the consumer has observed because of
    /// prefetch. Non-blocking (§6).
    pub fn num_bytes_read(&self) -> u64 {
        self.current_metrics
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.bytes_read())
            .unwrap_or(0)
    }

    /// Per-epoch counters beyond the bare byte count (§4.10), exposed for
    /// diagnostics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.current_metrics
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }

    /// The inferred tensor schema, once the first non-empty example has
    /// been decoded; `None` before then. Non-blocking (§6).
    pub fn schema(&self) -> Option<Schema> {
        self.current_schema.lock().unwrap().as_ref().and_then(|c| c.get())
    }

    /// Blocks until the head batch is resolved (decoded, tombstoned) or
    /// the epoch ends. The first call on a fresh or just-reset reader
    /// starts the ingest task and decode pool (§4.7).
    pub async fn next(&self) -> Result<NextItem> {
        self.poll(true).await
    }

    /// Same suspension semantics as `next`, but does not consume: a
    /// second `peek` returns the same example, and a following `next`
    /// both consumes it and invalidates any outstanding peek (§4.6).
    pub async fn peek(&self) -> Result<NextItem> {
        self.poll(false).await
    }

    async fn poll(&self, consume: bool) -> Result<NextItem> {
        let queue = loop {
            let mut state = self.state.lock().await;
            match &*state {
                State::Poisoned(msg) => return Err(Error::Poisoned(msg.clone())),
                State::Ended => return Ok(NextItem::End),
                State::Running(epoch) => break epoch.queue.clone(),
                State::Idle => {
                    let epoch = self.start_epoch().await?;
                    *state = State::Running(epoch);
                    continue;
                }
            }
        };

        let resolved = if consume { queue.next().await } else { queue.peek().await };
        match resolved {
            Ok(Resolved::Example(example)) => Ok(NextItem::Example(example)),
            Ok(Resolved::Ended) => {
                self.finish_epoch().await;
                Ok(NextItem::End)
            }
            Err(Error::Reset) => Err(Error::Reset),
            Err(err) => {
                self.poison(err.message()).await;
                Err(err)
            }
        }
    }

    async fn start_epoch(&self) -> Result<Epoch> {
        let instances = {
            let seed_state = self.seed_state.lock().await;
            InstanceStream::new(&self.config, &seed_state)
        };

        let capacity = self.config.effective_num_prefetched_batches();
        let num_workers = self.config.effective_num_parallel_reads();
        let metrics = Arc::new(Metrics::new());
        let schema = Arc::new(SchemaCell::new());
        let queue = OrderedQueue::new(capacity);
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(capacity.max(1));

        *self.current_metrics.lock().unwrap() = Some(metrics.clone());
        *self.current_schema.lock().unwrap() = Some(schema.clone());

        let pool = DecodePool::spawn(
            self.decoder.clone(),
            num_workers,
            rx,
            queue.clone(),
            self.config.bad_batch_handling,
            metrics.clone(),
            schema,
            cancel.clone(),
        );

        let decoder = self.decoder.clone();
        let factories = self.factories.clone();
        let batch_size = self.config.batch_size;
        let last_batch_handling = self.config.last_batch_handling;
        let ingest_metrics = metrics.clone();
        let ingest_queue = queue.clone();
        let ingest_cancel = cancel.clone();
        let ingest = tokio::task::spawn_blocking(move || {
            crate::ingest::run(
                decoder,
                factories,
                batch_size,
                last_batch_handling,
                ingest_metrics,
                ingest_queue,
                tx,
                ingest_cancel,
                instances,
            )
        });

        Ok(Epoch {
            ingest,
            pool,
            queue,
            cancel,
        })
    }

    async fn finish_epoch(&self) {
        let mut state = self.state.lock().await;
        if let State::Running(epoch) = std::mem::replace(&mut *state, State::Ended) {
            drop(state);
            let _ = epoch.ingest.await;
            epoch.pool.join().await;
        }
    }

    async fn poison(&self, msg: Arc<str>) {
        let mut state = self.state.lock().await;
        if matches!(&*state, State::Poisoned(_)) {
            return;
        }
        let previous = std::mem::replace(&mut *state, State::Poisoned(msg));
        drop(state);
        if let State::Running(epoch) = previous {
            epoch.cancel.cancel();
            epoch.queue.cancel();
            tokio::spawn(async move {
                let _ = epoch.ingest.await;
                epoch.pool.join().await;
            });
        }
    }

    /// Cancels and rewinds: joins every task, reopens every data store on
    /// the next epoch, reseeds PRNGs per `reshuffle_each_epoch`, clears
    /// counters, and returns to `idle` (§4.7). A `next`/`peek` pending on
    /// the epoch being torn down observes `Error::Reset`.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Idle);
        drop(state);

        if let State::Running(epoch) = previous {
            epoch.cancel.cancel();
            epoch.queue.cancel();
            let _ = epoch.ingest.await;
            epoch.pool.join().await;
        }

        *self.current_metrics.lock().unwrap() = None;
        *self.current_schema.lock().unwrap() = None;
        self.seed_state.lock().await.on_reset();
        Ok(())
    }
}

/// Builder mirroring the corpus's `DataLoaderBuilder`-style construction
/// (§4.11), assembling a `DatasetReader` from a validated config, an
/// ordered list of data stores, and a format decoder.
pub struct DatasetReaderBuilder {
    config: ReaderConfig,
    factories: Vec<Arc<dyn DataStoreFactory>>,
    decoder: Option<Arc<dyn Decoder>>,
}

impl DatasetReaderBuilder {
    pub fn new(config: ReaderConfig) -> Self {
        DatasetReaderBuilder {
            config,
            factories: Vec::new(),
            decoder: None,
        }
    }

    pub fn add_store(mut self, factory: Arc<dyn DataStoreFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Result<DatasetReader> {
        self.config.validate()?;
        let decoder = self
            .decoder
            .ok_or_else(|| Error::config("a decoder is required"))?;
        if self.factories.is_empty() {
            return Err(Error::config("at least one data store is required"));
        }
        Ok(DatasetReader::new(self.config, self.factories, decoder))
    }
}
