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

//! Concurrent machinery: the decode pool (C5) and the ordered prefetch
//! queue (C6), plus the `Example`/`Schema` types they produce and cache,
//! and the `Decoder` plugin contract that bridges to the format layer.

pub mod decoder;
pub mod example;
pub mod pool;
pub mod queue;
pub mod schema;

pub use decoder::Decoder;
pub use example::Example;
pub use pool::DecodePool;
pub use queue::{OrderedQueue, Resolved};
pub use schema::{Schema, SchemaCell, SchemaRef, TensorSpec};
