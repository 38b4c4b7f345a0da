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

//! Low-level pipeline primitives: the dataset cursor (C1), record
//! segmenter (C2), instance stream (C3) and batch former (C4), plus the
//! shared error type and reader configuration.

pub mod batch;
pub mod config;
pub mod error;
pub mod instance;
pub mod metrics;
pub mod record;
pub mod segment;
pub mod store;

pub use error::{Error, Result, StoreId};
pub use metrics::{Metrics, MetricsSnapshot};
