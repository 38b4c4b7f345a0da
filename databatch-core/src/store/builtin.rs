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

//! Two concrete `DataStore` implementations so the pipeline is runnable
//! and testable without a format crate supplying its own backend.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, StoreId};
use crate::store::{DataStore, DataStoreFactory};

/// An in-memory store backed by a `Bytes` blob. Cancellation is immediate
/// since there is no real blocking I/O to interrupt.
pub struct MemoryStore {
    id: StoreId,
    data: Bytes,
    pos: usize,
}

impl DataStore for MemoryStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

pub struct MemoryStoreFactory {
    id: StoreId,
    data: Bytes,
}

impl MemoryStoreFactory {
    pub fn new(id: StoreId, data: impl Into<Bytes>) -> Self {
        MemoryStoreFactory {
            id,
            data: data.into(),
        }
    }
}

impl DataStoreFactory for MemoryStoreFactory {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn open(&self) -> Result<Box<dyn DataStore>> {
        Ok(Box::new(MemoryStore {
            id: self.id,
            data: self.data.clone(),
            pos: 0,
        }))
    }
}

/// A file-backed store. `std::fs::File::read` cannot portably be
/// interrupted mid-syscall, so cancellation is cooperative: `cancel` sets
/// a flag and the next `read` call returns `Ok(0)` without touching the
/// file, which is enough to unblock the ingest task between chunks (the
/// bound on chunk size keeps any single read short).
pub struct FileStore {
    id: StoreId,
    file: File,
    cancelled: Arc<AtomicBool>,
}

impl DataStore for FileStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(0);
        }
        self.file.read(buf)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

pub struct FileStoreFactory {
    id: StoreId,
    path: PathBuf,
}

impl FileStoreFactory {
    pub fn new(id: StoreId, path: impl Into<PathBuf>) -> Self {
        FileStoreFactory {
            id,
            path: path.into(),
        }
    }
}

impl DataStoreFactory for FileStoreFactory {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn open(&self) -> Result<Box<dyn DataStore>> {
        let file = File::open(&self.path)
            .map_err(|e| crate::error::Error::io(self.id, 0, e))?;
        Ok(Box::new(FileStore {
            id: self.id,
            file,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}
