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

//! End-to-end scenarios run through the public `DatasetReader` facade,
//! mirroring literal inputs/outputs documented for the pipeline.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};

use databatch::{
    BadBatchHandling, BatchDescriptor, DataStoreFactory, DatasetReaderBuilder, Decoder, Error,
    Example, FramingPolicy, LastBatchPolicy, MemoryStoreFactory, NextItem, ReaderConfig,
    RecordIoSegmenter, RecordSegmenter, StoreId,
};

/// Builds one RecordIO data frame carrying a single little-endian `u64`
/// payload, the 8-byte wire layout §6 specifies: a prelude word echoing
/// the header word, then the payload padded to 4 bytes.
fn data_frame(value: u64) -> Vec<u8> {
    frame(0, &value.to_le_bytes())
}

fn frame(kind: u32, payload: &[u8]) -> Vec<u8> {
    let header = (kind << 29) | (payload.len() as u32);
    let mut out = Vec::new();
    out.extend_from_slice(&header.to_le_bytes());
    out.extend_from_slice(&header.to_le_bytes());
    out.extend_from_slice(payload);
    let pad = (4 - (payload.len() % 4)) % 4;
    out.extend(std::iter::repeat(0u8).take(pad));
    out
}

fn store(id: u32, records: impl Iterator<Item = u64>) -> Arc<dyn DataStoreFactory> {
    let mut bytes = Vec::new();
    for v in records {
        bytes.extend(data_frame(v));
    }
    Arc::new(MemoryStoreFactory::new(StoreId(id), bytes))
}

/// Decodes each instance's 8-byte payload back into its `u64` value,
/// zero for synthetic padding instances (empty payload).
struct U64Decoder {
    policy: FramingPolicy,
}

impl Decoder for U64Decoder {
    fn make_record_reader(&self, _store_id: StoreId) -> Box<dyn RecordSegmenter> {
        Box::new(RecordIoSegmenter::new(self.policy))
    }

    fn decode(&self, batch: &BatchDescriptor) -> Result<Example, String> {
        let values: Vec<i64> = batch
            .instances
            .iter()
            .map(|inst| {
                if inst.payload.len() == 8 {
                    i64::from_le_bytes(inst.payload[..].try_into().unwrap())
                } else {
                    0
                }
            })
            .collect();
        let arr: ArrayRef = Arc::new(Int64Array::from(values));
        Ok(Example::new(vec![("value".to_string(), arr)], batch.padding))
    }
}

fn decoder() -> Arc<dyn Decoder> {
    Arc::new(U64Decoder {
        policy: FramingPolicy::Fatal,
    })
}

async fn collect(reader: &databatch::DatasetReader) -> Result<Vec<Example>, Error> {
    let mut out = Vec::new();
    loop {
        match reader.next().await? {
            NextItem::Example(example) => out.push(example),
            NextItem::End => break,
        }
    }
    Ok(out)
}

fn values(example: &Example) -> Vec<i64> {
    example.tensors[0]
        .1
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

fn two_stores() -> Vec<Arc<dyn DataStoreFactory>> {
    vec![store(0, 0..10), store(1, 10..17)]
}

#[tokio::test]
async fn scenario_1_two_stores_last_batch_none() {
    let cfg = ReaderConfig {
        batch_size: 5,
        last_batch_handling: LastBatchPolicy::None,
        ..ReaderConfig::default()
    };
    let mut builder = DatasetReaderBuilder::new(cfg).decoder(decoder());
    for f in two_stores() {
        builder = builder.add_store(f);
    }
    let reader = builder.build().unwrap();

    let examples = collect(&reader).await.unwrap();
    let sizes: Vec<usize> = examples.iter().map(|e| values(e).len()).collect();
    assert_eq!(sizes, vec![5, 5, 5, 2]);

    let flattened: Vec<i64> = examples.iter().flat_map(values).collect();
    assert_eq!(flattened, (0..17).collect::<Vec<i64>>());
}

#[tokio::test]
async fn scenario_2_two_stores_last_batch_drop() {
    let cfg = ReaderConfig {
        batch_size: 5,
        last_batch_handling: LastBatchPolicy::Drop,
        ..ReaderConfig::default()
    };
    let mut builder = DatasetReaderBuilder::new(cfg).decoder(decoder());
    for f in two_stores() {
        builder = builder.add_store(f);
    }
    let reader = builder.build().unwrap();

    let examples = collect(&reader).await.unwrap();
    let sizes: Vec<usize> = examples.iter().map(|e| values(e).len()).collect();
    assert_eq!(sizes, vec![5, 5, 5]);
    let flattened: Vec<i64> = examples.iter().flat_map(values).collect();
    assert_eq!(flattened, (0..15).collect::<Vec<i64>>());
}

#[tokio::test]
async fn scenario_3_two_stores_last_batch_pad() {
    let cfg = ReaderConfig {
        batch_size: 5,
        last_batch_handling: LastBatchPolicy::Pad,
        ..ReaderConfig::default()
    };
    let mut builder = DatasetReaderBuilder::new(cfg).decoder(decoder());
    for f in two_stores() {
        builder = builder.add_store(f);
    }
    let reader = builder.build().unwrap();

    let examples = collect(&reader).await.unwrap();
    let sizes: Vec<usize> = examples.iter().map(|e| values(e).len()).collect();
    assert_eq!(sizes, vec![5, 5, 5, 5]);
    assert_eq!(examples.last().unwrap().padding, 3);
    assert!(examples[..3].iter().all(|e| e.padding == 0));
}

#[tokio::test]
async fn scenario_4_sharding_partition() {
    let cfg = ReaderConfig {
        batch_size: 25,
        num_shards: 4,
        shard_index: 1,
        ..ReaderConfig::default()
    };
    let reader = DatasetReaderBuilder::new(cfg)
        .add_store(store(0, 0..100))
        .decoder(decoder())
        .build()
        .unwrap();

    let examples = collect(&reader).await.unwrap();
    assert_eq!(examples.len(), 1);
    let got = values(&examples[0]);
    let expected: Vec<i64> = (0..100).filter(|i| i % 4 == 1).collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn scenario_5_perfect_shuffle_reproduces_across_reset() {
    // §4.3's "perfect shuffle" is a reservoir window equal to the full
    // dataset size; a literal `shuffle_window=0` would instead disable
    // shuffling entirely (see DESIGN.md).
    let cfg = ReaderConfig {
        batch_size: 10,
        shuffle_instances: true,
        shuffle_window: 100,
        shuffle_seed: Some(42),
        reshuffle_each_epoch: false,
        ..ReaderConfig::default()
    };
    let reader = DatasetReaderBuilder::new(cfg)
        .add_store(store(0, 0..100))
        .decoder(decoder())
        .build()
        .unwrap();

    let epoch1: Vec<i64> = collect(&reader).await.unwrap().iter().flat_map(values).collect();
    reader.reset().await.unwrap();
    let epoch2: Vec<i64> = collect(&reader).await.unwrap().iter().flat_map(values).collect();

    assert_eq!(epoch1, epoch2);
    let mut sorted = epoch1.clone();
    sorted.sort();
    assert_eq!(sorted, (0..100).collect::<Vec<i64>>());
}

#[tokio::test]
async fn scenario_6_framing_fault_poisons_with_zero_examples() {
    let mut bytes = Vec::new();
    bytes.extend(frame(1, b"hdr")); // header record, discarded by C3.
    bytes.extend(data_frame(7)); // one valid data frame.
    bytes.extend([0xffu8; 8]); // corrupt header in the same chunk.

    let cfg = ReaderConfig {
        batch_size: 1,
        bad_batch_handling: BadBatchHandling::Skip,
        ..ReaderConfig::default()
    };
    let reader = DatasetReaderBuilder::new(cfg)
        .add_store(Arc::new(MemoryStoreFactory::new(StoreId(0), bytes)))
        .decoder(Arc::new(U64Decoder {
            policy: FramingPolicy::Fatal,
        }))
        .build()
        .unwrap();

    let err = reader.next().await.unwrap_err();
    assert!(matches!(err, Error::Framing { .. }));

    let err2 = reader.next().await.unwrap_err();
    assert!(matches!(err2, Error::Poisoned(_)));
}
