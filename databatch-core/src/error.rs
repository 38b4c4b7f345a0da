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

//! Error categories shared by every crate in this workspace, ordered by
//! severity the same way the controller's state machine treats them.

use std::fmt;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

/// A stable identifier for a data store, assigned at cursor construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub u32);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration, surfaced synchronously at construction; the
    /// controller never enters `running`.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A store read failed or returned truncated framing. Always fatal.
    #[error("I/O fault on {store_id} at offset {offset}: {source}")]
    Io {
        store_id: StoreId,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A malformed record header (bad magic, reserved bits, truncated
    /// frame). Treated the same as an I/O fault.
    #[error("framing fault on {store_id} at offset {offset}: {reason}")]
    Framing {
        store_id: StoreId,
        offset: u64,
        reason: String,
    },

    /// `decode` returned a fault for a given batch. Handled per
    /// `bad_batch_handling`; only surfaced to the caller under `error`.
    #[error("bad batch at index {batch_index}: {reason}")]
    BadBatch { batch_index: u64, reason: String },

    /// A decoded example disagreed with the cached schema. Fatal.
    #[error("schema mismatch at batch {batch_index}: expected {expected}, found {found}")]
    SchemaMismatch {
        batch_index: u64,
        expected: String,
        found: String,
    },

    /// Returned to a pending `next`/`peek` when `reset` or destruction ran
    /// while that call was outstanding.
    #[error("reset requested while call was pending")]
    Reset,

    /// Returned by every `next`/`peek` after the controller has entered
    /// `poisoned`, reusing the message of the fault that caused it. The
    /// original fault is moved out to the caller that first observed it;
    /// this variant carries just its rendered text since `std::io::Error`
    /// and friends are not `Clone`.
    #[error("pipeline is poisoned: {0}")]
    Poisoned(Arc<str>),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn framing(store_id: StoreId, offset: u64, reason: impl Into<String>) -> Self {
        Error::Framing {
            store_id,
            offset,
            reason: reason.into(),
        }
    }

    pub fn io(store_id: StoreId, offset: u64, source: std::io::Error) -> Self {
        Error::Io {
            store_id,
            offset,
            source,
        }
    }

    /// Whether this error, if encountered mid-epoch, must poison the
    /// controller rather than be handled by a per-batch policy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::BadBatch { .. })
    }

    /// Rendered message cached by the controller so a poisoned pipeline
    /// can keep reporting the fault that poisoned it without requiring
    /// `Error` itself to be `Clone`.
    pub fn message(&self) -> Arc<str> {
        Arc::from(self.to_string())
    }
}
