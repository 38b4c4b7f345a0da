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

//! A high-throughput, parallel dataset reader for ML training pipelines.
//!
//! A [`DatasetReader`] pulls bytes from an ordered list of data stores,
//! segments them into records, turns records into instances (skip, limit,
//! shard, shuffle, subsample), groups instances into fixed-size batches,
//! decodes batches in parallel, and hands decoded examples back to the
//! caller strictly in batch order, regardless of which worker finished
//! decoding first.
//!
//! ```ignore
//! let reader = DatasetReaderBuilder::new(ReaderConfig::default())
//!     .add_store(Arc::new(MemoryStoreFactory::new(StoreId(0), data)))
//!     .decoder(Arc::new(my_decoder))
//!     .build()?;
//!
//! loop {
//!     match reader.next().await? {
//!         NextItem::Example(example) => consume(example),
//!         NextItem::End => break,
//!     }
//! }
//! ```

mod ingest;
pub mod logging;
pub mod reader;

pub use logging::init_logging;
pub use reader::{DatasetReader, DatasetReaderBuilder, NextItem};

pub use databatch_core::batch::BatchDescriptor;
pub use databatch_core::config::{BadBatchHandling, LastBatchPolicy, ReaderConfig, ReaderConfigBuilder};
pub use databatch_core::error::{Error, Result, StoreId};
pub use databatch_core::metrics::MetricsSnapshot;
pub use databatch_core::record::{Instance, Record, RecordKind};
pub use databatch_core::segment::{FramingPolicy, RecordIoSegmenter, RecordSegmenter, WholeStoreSegmenter};
pub use databatch_core::store::builtin::{FileStore, FileStoreFactory, MemoryStore, MemoryStoreFactory};
pub use databatch_core::store::{DataStore, DataStoreFactory, DatasetCursor, Pulled};

pub use databatch_exec::{Decoder, Example, Schema, SchemaRef, TensorSpec};
