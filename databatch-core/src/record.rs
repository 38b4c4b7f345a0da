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

//! Records (C2 output) and instances (C3 output).
//!
//! A byte slice is `bytes::Bytes`: an immutable, reference-counted view
//! over a contiguous range that can be resliced without copying. The
//! buffer it points at lives as long as any `Bytes` clone referencing it,
//! which is exactly the lifetime contract §3 requires between C1's chunks
//! and the records/instances sliced from them.

use bytes::Bytes;

use crate::error::StoreId;

/// The kind tag a record segmenter attaches to each frame it yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Data,
    Header,
    Footer,
    Padding,
}

impl RecordKind {
    /// Only `Data` records are promoted into instances; everything else is
    /// discarded but still counted for reporting.
    pub fn is_data(self) -> bool {
        matches!(self, RecordKind::Data)
    }
}

/// A logical unit produced by the record segmenter (C2).
#[derive(Clone, Debug)]
pub struct Record {
    pub store_id: StoreId,
    pub kind: RecordKind,
    pub payload: Bytes,
}

impl Record {
    pub fn data(store_id: StoreId, payload: Bytes) -> Self {
        Record {
            store_id,
            kind: RecordKind::Data,
            payload,
        }
    }
}

/// A single post-segmentation, post-filter record promoted into the
/// batching stream (C3 output). `ordinal` is assigned after
/// sharding/shuffling/subsampling and exists for diagnostics only.
#[derive(Clone, Debug)]
pub struct Instance {
    pub store_id: StoreId,
    pub ordinal: u64,
    pub payload: Bytes,
}

impl Instance {
    /// A synthetic instance used to pad the final batch under the `pad`
    /// last-batch policy. Carries no real payload.
    pub fn zero(store_id: StoreId, ordinal: u64) -> Self {
        Instance {
            store_id,
            ordinal,
            payload: Bytes::new(),
        }
    }
}
