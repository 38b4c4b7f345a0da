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

//! The format plugin contract (§6): the narrow interface through which a
//! concrete reader (CSV, RecordIO, image...) plugs into the pipeline.
//! Implementors supply only these three operations; everything else
//! (sharding, shuffling, batching, reordering) is common substrate.

use databatch_core::batch::BatchDescriptor;
use databatch_core::error::StoreId;
use databatch_core::record::Instance;
use databatch_core::segment::RecordSegmenter;

use crate::example::Example;
use crate::schema::Schema;

/// Supplied by the format layer; called from the decode pool (C5) only,
/// so implementations must be thread-safe and must not themselves touch
/// the pipeline's channels.
pub trait Decoder: Send + Sync + 'static {
    /// Chooses a record segmenter for the given store (whole-store or
    /// framed, §4.2). Called once per store by the ingest task.
    fn make_record_reader(&self, store_id: StoreId) -> Box<dyn RecordSegmenter>;

    /// Pure, thread-safe, CPU-bounded: decodes one batch of raw instances
    /// into an `Example`, or reports why it could not.
    fn decode(&self, batch: &BatchDescriptor) -> std::result::Result<Example, String>;

    /// Called at most once per epoch, on the first non-empty instance the
    /// pipeline observes (§6). The default decodes a synthetic
    /// one-instance batch and derives the schema from the resulting
    /// example (§4.5's "pre-infer from the first successfully decoded
    /// non-empty example" mechanism). Decoders with cheaper schema
    /// knowledge (e.g. a fixed record layout) may override this to avoid
    /// the extra decode.
    fn infer_schema(&self, first_instance: &Instance) -> std::result::Result<Schema, String> {
        let probe = BatchDescriptor {
            batch_index: 0,
            instances: vec![first_instance.clone()],
            is_final: false,
            padding: 0,
        };
        self.decode(&probe).map(|example| example.infer_schema())
    }
}
