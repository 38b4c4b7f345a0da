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

//! Dataset cursor (C1): concatenates an ordered list of data stores and
//! pulls successive byte chunks, signalling store boundaries and the
//! terminal end of the list.

pub mod builtin;

use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result, StoreId};

/// One chunk pulled from the cursor (§4.1).
pub enum Pulled {
    /// A bounded chunk of bytes belonging to the current store.
    Chunk(Bytes),
    /// The current store has been fully drained; the next pull (if any)
    /// will come from the following store and C2 must reset parser state.
    StoreBoundary,
    /// Every store in the list has been drained.
    End,
}

/// A handle over a single append-only byte source. Implementors need not
/// be seekable; `reset` obtains a fresh handle by reopening the store.
pub trait DataStore: Send {
    fn id(&self) -> StoreId;

    /// Sequential read into `buf`. Returns `Ok(0)` at end of stream, the
    /// number of bytes read otherwise, matching `std::io::Read`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Forces a pending `read` to return promptly. Callable from another
    /// thread while `read` is in progress. Best-effort: stores with no
    /// portable way to interrupt a blocking syscall may only take effect
    /// before the next `read` call (see `builtin::FileStore`).
    fn cancel(&self) {}
}

/// Produces a fresh `DataStore` for a given store id. Reopening happens
/// only from the ingest task, and only on construction/`reset`.
pub trait DataStoreFactory: Send + Sync {
    fn store_id(&self) -> StoreId;
    fn open(&self) -> Result<Box<dyn DataStore>>;
}

const CHUNK_SIZE: usize = 64 * 1024;

/// Walks an ordered list of store factories, yielding bounded chunks with
/// explicit store-boundary and terminal signals (§4.1). Factories are
/// held by `Arc` rather than owned outright so the same list can be
/// walked again, unchanged, by a fresh cursor after `reset` reopens every
/// store (§4.7).
pub struct DatasetCursor {
    factories: Vec<Arc<dyn DataStoreFactory>>,
    next_index: usize,
    current: Option<Box<dyn DataStore>>,
    offset: u64,
    bytes_read: u64,
}

impl DatasetCursor {
    pub fn new(factories: Vec<Arc<dyn DataStoreFactory>>) -> Self {
        DatasetCursor {
            factories,
            next_index: 0,
            current: None,
            offset: 0,
            bytes_read: 0,
        }
    }

    /// Cumulative bytes pulled across the current epoch.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The store currently open, if any. `None` before the first pull and
    /// after the terminal signal.
    pub fn current_store_id(&self) -> Option<StoreId> {
        self.current.as_ref().map(|s| s.id())
    }

    /// Best-effort interrupt of whichever store handle is currently open.
    pub fn cancel_current(&self) {
        if let Some(store) = &self.current {
            store.cancel();
        }
    }

    pub fn pull(&mut self) -> Result<Pulled> {
        loop {
            if self.current.is_none() {
                if self.next_index >= self.factories.len() {
                    return Ok(Pulled::End);
                }
                let factory = &self.factories[self.next_index];
                self.next_index += 1;
                self.offset = 0;
                self.current = Some(factory.open()?);
                return Ok(Pulled::StoreBoundary);
            }

            let store = self.current.as_mut().unwrap();
            let store_id = store.id();
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = store
                .read(&mut buf)
                .map_err(|e| Error::io(store_id, self.offset, e))?;
            if n == 0 {
                let mut store = self.current.take().unwrap();
                let _ = store.close();
                continue;
            }
            buf.truncate(n);
            self.offset += n as u64;
            self.bytes_read += n as u64;
            return Ok(Pulled::Chunk(Bytes::from(buf)));
        }
    }
}
