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

//! Record segmenter (C2): splits a per-store byte stream into framed
//! records. Two strategies are in scope, chosen per store by the format
//! plugin's `make_record_reader`: whole-store (§4.2) and framed (the
//! RecordIO family, §4.2/§6).

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result, StoreId};
use crate::record::{Record, RecordKind};

/// How a framed segmenter reacts to a malformed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramingPolicy {
    /// Malformed headers are reported as a fault immediately.
    Fatal,
    /// Scan forward byte by byte for the next position at which a valid
    /// header can be read, counting the skipped bytes as a resync.
    Resync,
}

/// Consumes chunks from the cursor for a single store and yields records.
/// A segmenter is reset (via `finish_store`) between stores; it must never
/// let a record straddle a store boundary. `store_id` is passed into every
/// call rather than bound once, since a single segmenter instance may be
/// reused across stores that share a format.
pub trait RecordSegmenter: Send {
    /// Feed the next chunk pulled from C1 for the current store.
    fn feed(&mut self, chunk: Bytes);

    /// Drain every record that can be produced from bytes fed so far.
    /// Returns an empty vec (not an error) when more input is needed.
    fn drain(&mut self, store_id: StoreId) -> Result<Vec<Record>>;

    /// Called when C1 signals the current store is exhausted. Must flush
    /// or fault on any partial record per policy, then reset parser state
    /// so the segmenter is ready for the next store's bytes.
    fn finish_store(&mut self, store_id: StoreId) -> Result<Vec<Record>>;

    /// Total bytes discarded so far while resyncing past corruption under
    /// `FramingPolicy::Resync`. Segmenters with no such concept (e.g.
    /// whole-store) report zero.
    fn resynced_bytes(&self) -> u64 {
        0
    }
}

/// Accumulates chunks so records can be sliced out zero-copy when they
/// fall entirely within one chunk, and copied only when a record straddles
/// a chunk boundary (the unavoidable case).
#[derive(Default)]
struct ChunkAccumulator {
    chunks: VecDeque<Bytes>,
    len: usize,
    consumed: u64,
}

impl ChunkAccumulator {
    fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn available(&self) -> usize {
        self.len
    }

    fn offset(&self) -> u64 {
        self.consumed
    }

    /// Returns the next `n` bytes without removing them, copying only if
    /// they span more than one queued chunk.
    fn peek(&self, n: usize) -> Option<Bytes> {
        if self.len < n {
            return None;
        }
        let front = self.chunks.front()?;
        if front.len() >= n {
            return Some(front.slice(0..n));
        }
        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        for chunk in &self.chunks {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(chunk.len());
            out.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
        Some(out.freeze())
    }

    /// Removes and returns the next `n` bytes, copying only when the span
    /// crosses a chunk boundary.
    fn take(&mut self, n: usize) -> Option<Bytes> {
        if self.len < n {
            return None;
        }
        self.len -= n;
        self.consumed += n as u64;

        let front = self.chunks.front()?;
        if front.len() > n {
            let piece = front.slice(0..n);
            let rest = front.slice(n..);
            self.chunks[0] = rest;
            return Some(piece);
        }
        if front.len() == n {
            return self.chunks.pop_front();
        }

        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.chunks.pop_front().expect("checked available above");
            if chunk.len() <= remaining {
                out.extend_from_slice(&chunk);
                remaining -= chunk.len();
            } else {
                out.extend_from_slice(&chunk[..remaining]);
                self.chunks.push_front(chunk.slice(remaining..));
                remaining = 0;
            }
        }
        Some(out.freeze())
    }

    fn skip(&mut self, n: usize) {
        let _ = self.take(n);
    }

    /// Drops and returns a single byte, used while resyncing.
    fn take_one(&mut self) -> Option<u8> {
        let byte = self.peek(1)?[0];
        self.skip(1);
        Some(byte)
    }
}

/// Whole-store strategy: each store yields exactly one `Data` record
/// spanning the full stream, for self-framed formats like a single image
/// per store.
#[derive(Default)]
pub struct WholeStoreSegmenter {
    buf: Option<BytesMut>,
}

impl RecordSegmenter for WholeStoreSegmenter {
    fn feed(&mut self, chunk: Bytes) {
        self.buf
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(&chunk);
    }

    fn drain(&mut self, _store_id: StoreId) -> Result<Vec<Record>> {
        Ok(Vec::new())
    }

    fn finish_store(&mut self, store_id: StoreId) -> Result<Vec<Record>> {
        match self.buf.take() {
            Some(buf) if !buf.is_empty() => Ok(vec![Record::data(store_id, buf.freeze())]),
            _ => Ok(Vec::new()),
        }
    }
}

const HEADER_LEN: usize = 8; // reserved prelude word + header word
const ALIGNMENT: usize = 4;
const MAX_PAYLOAD_LEN: u32 = 1 << 29;

fn round_up(n: usize, to: usize) -> usize {
    (n + to - 1) / to * to
}

struct ParsedHeader {
    kind: RecordKind,
    payload_len: usize,
}

fn parse_header(word: u32) -> Option<ParsedHeader> {
    let kind_bits = (word >> 29) & 0b111;
    // The low 29 bits are the whole length field, so this is always < MAX_PAYLOAD_LEN.
    let payload_len = word & (MAX_PAYLOAD_LEN - 1);
    let kind = match kind_bits {
        0 => RecordKind::Data,
        1 => RecordKind::Header,
        2 => RecordKind::Footer,
        3 => RecordKind::Padding,
        _ => return None, // 4-7 reserved
    };
    Some(ParsedHeader {
        kind,
        payload_len: payload_len as usize,
    })
}

/// Framed strategy for the RecordIO family (§6): a 32-bit LE reserved
/// prelude word, a 32-bit LE header word (`kind` in the top 3 bits,
/// payload length in the low 29 bits), then the payload padded with zero
/// bytes to a 4-byte boundary.
///
/// The prelude word is required to echo the header word; a mismatch is
/// treated as corruption the same as an invalid header (§9 open question
/// (a): this crate resolves the prelude as a redundant copy used for
/// corruption detection; see DESIGN.md.
pub struct RecordIoSegmenter {
    acc: ChunkAccumulator,
    policy: FramingPolicy,
    resynced_bytes: u64,
}

impl RecordIoSegmenter {
    pub fn new(policy: FramingPolicy) -> Self {
        RecordIoSegmenter {
            acc: ChunkAccumulator::default(),
            policy,
            resynced_bytes: 0,
        }
    }

    fn try_parse_at_front(&self) -> Option<std::result::Result<(ParsedHeader, usize), String>> {
        let words = self.acc.peek(HEADER_LEN)?;
        let prelude = u32::from_le_bytes(words[0..4].try_into().unwrap());
        let header = u32::from_le_bytes(words[4..8].try_into().unwrap());
        if prelude != header {
            return Some(Err(format!(
                "prelude word {:#010x} does not echo header word {:#010x}",
                prelude, header
            )));
        }
        match parse_header(header) {
            Some(parsed) => {
                let framed_len = HEADER_LEN + round_up(parsed.payload_len, ALIGNMENT);
                Some(Ok((parsed, framed_len)))
            }
            None => Some(Err(format!("invalid header word {:#010x}", header))),
        }
    }

    fn resync_one(&mut self, store_id: StoreId, offset: u64) -> Result<()> {
        match self.policy {
            FramingPolicy::Fatal => {
                Err(Error::framing(store_id, offset, "malformed record header"))
            }
            FramingPolicy::Resync => {
                if self.acc.take_one().is_some() {
                    self.resynced_bytes += 1;
                }
                Ok(())
            }
        }
    }
}

impl RecordSegmenter for RecordIoSegmenter {
    fn feed(&mut self, chunk: Bytes) {
        self.acc.push(chunk);
    }

    fn resynced_bytes(&self) -> u64 {
        self.resynced_bytes
    }

    fn drain(&mut self, store_id: StoreId) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        loop {
            let offset = self.acc.offset();
            match self.try_parse_at_front() {
                None => return Ok(out),
                Some(Err(_)) => {
                    self.resync_one(store_id, offset)?;
                }
                Some(Ok((parsed, framed_len))) => {
                    if self.acc.available() < framed_len {
                        return Ok(out);
                    }
                    let whole = self.acc.take(framed_len).expect("length checked");
                    let payload = whole.slice(HEADER_LEN..HEADER_LEN + parsed.payload_len);
                    out.push(Record {
                        store_id,
                        kind: parsed.kind,
                        payload,
                    });
                }
            }
        }
    }

    fn finish_store(&mut self, store_id: StoreId) -> Result<Vec<Record>> {
        let records = self.drain(store_id)?;
        if self.acc.available() > 0 {
            return match self.policy {
                FramingPolicy::Fatal => Err(Error::framing(
                    store_id,
                    self.acc.offset(),
                    format!(
                        "{} trailing byte(s) left over at end of store",
                        self.acc.available()
                    ),
                )),
                FramingPolicy::Resync => {
                    log::warn!(
                        "{}: discarding {} trailing byte(s) at end of store",
                        store_id,
                        self.acc.available()
                    );
                    Ok(records)
                }
            };
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u32, payload: &[u8]) -> Vec<u8> {
        let header = (kind << 29) | (payload.len() as u32);
        let mut out = Vec::new();
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(payload);
        let pad = round_up(payload.len(), ALIGNMENT) - payload.len();
        out.extend(std::iter::repeat(0u8).take(pad));
        out
    }

    #[test]
    fn whole_store_yields_single_record() {
        let mut seg = WholeStoreSegmenter::default();
        seg.feed(Bytes::from_static(b"hello "));
        seg.feed(Bytes::from_static(b"world"));
        assert!(seg.drain(StoreId(0)).unwrap().is_empty());
        let recs = seg.finish_store(StoreId(0)).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(&recs[0].payload[..], b"hello world");
        assert_eq!(recs[0].kind, RecordKind::Data);
    }

    #[test]
    fn whole_store_empty_yields_nothing() {
        let mut seg = WholeStoreSegmenter::default();
        assert!(seg.finish_store(StoreId(0)).unwrap().is_empty());
    }

    #[test]
    fn framed_parses_data_and_header_frames() {
        let mut bytes = Vec::new();
        bytes.extend(frame(1, b"hdr"));
        bytes.extend(frame(0, b"12345678"));
        let mut seg = RecordIoSegmenter::new(FramingPolicy::Fatal);
        seg.feed(Bytes::from(bytes));
        let recs = seg.drain(StoreId(0)).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].kind, RecordKind::Header);
        assert_eq!(recs[1].kind, RecordKind::Data);
        assert_eq!(&recs[1].payload[..], b"12345678");
        assert!(seg.finish_store(StoreId(0)).unwrap().is_empty());
    }

    #[test]
    fn framed_splits_frame_across_chunks() {
        let whole = frame(0, b"abcdefgh");
        let mut seg = RecordIoSegmenter::new(FramingPolicy::Fatal);
        seg.feed(Bytes::copy_from_slice(&whole[..5]));
        assert!(seg.drain(StoreId(0)).unwrap().is_empty());
        seg.feed(Bytes::copy_from_slice(&whole[5..]));
        let recs = seg.drain(StoreId(0)).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(&recs[0].payload[..], b"abcdefgh");
    }

    #[test]
    fn framed_fatal_on_bad_header() {
        let mut seg = RecordIoSegmenter::new(FramingPolicy::Fatal);
        seg.feed(Bytes::from_static(&[0xffu8; 16]));
        assert!(seg.drain(StoreId(0)).is_err());
    }

    #[test]
    fn framed_resync_skips_corruption() {
        let mut bytes = vec![0xaau8; 3];
        bytes.extend(frame(0, b"ok"));
        let mut seg = RecordIoSegmenter::new(FramingPolicy::Resync);
        seg.feed(Bytes::from(bytes));
        let recs = seg.drain(StoreId(0)).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(&recs[0].payload[..], b"ok");
        assert_eq!(seg.resynced_bytes(), 3);
    }

    #[test]
    fn framed_trailing_partial_frame_is_fatal_by_default() {
        let mut seg = RecordIoSegmenter::new(FramingPolicy::Fatal);
        seg.feed(Bytes::copy_from_slice(&frame(0, b"12345678")[..10]));
        seg.drain(StoreId(0)).unwrap();
        assert!(seg.finish_store(StoreId(0)).is_err());
    }
}
