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

//! The decoded output of a batch (§3): an ordered collection of named
//! tensors plus a padding count.

use arrow::array::ArrayRef;

use crate::schema::{Schema, TensorSpec};

#[derive(Clone, Debug)]
pub struct Example {
    pub tensors: Vec<(String, ArrayRef)>,
    /// Number of trailing rows that are synthetic zeros, under the `pad`
    /// last-batch policy. Zero otherwise.
    pub padding: usize,
}

impl Example {
    pub fn new(tensors: Vec<(String, ArrayRef)>, padding: usize) -> Self {
        Example { tensors, padding }
    }

    pub fn num_rows(&self) -> usize {
        self.tensors.first().map(|(_, a)| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Derives the schema this example would install, shape included. The
    /// shape describes one instance's tensor, not the batch: the row count
    /// (number of instances in this particular example) is deliberately
    /// excluded so two examples of different sizes, most commonly a full
    /// batch and the short tail batch, still produce matching schemas.
    pub fn infer_schema(&self) -> Schema {
        let attrs = self
            .tensors
            .iter()
            .map(|(name, array)| TensorSpec {
                name: name.clone(),
                data_type: array.data_type().clone(),
                shape: tensor_shape(array),
            })
            .collect();
        Schema::new(attrs)
    }
}

/// The logical shape of a single instance's value within `array`, i.e.
/// `array`'s shape with the leading (row) dimension stripped. A plain
/// scalar column (one value per instance) has shape `[]`; a
/// `FixedSizeList` column (a fixed-width vector per instance) has shape
/// `[width]`.
fn tensor_shape(array: &ArrayRef) -> Vec<usize> {
    use arrow::datatypes::DataType;
    match array.data_type() {
        DataType::FixedSizeList(_, width) => vec![*width as usize],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use std::sync::Arc;

    #[test]
    fn empty_example_has_zero_rows() {
        let example = Example::new(vec![], 0);
        assert!(example.is_empty());
    }

    #[test]
    fn infer_schema_reflects_tensor_dtype() {
        let arr: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let example = Example::new(vec![("x".to_string(), arr)], 0);
        let schema = example.infer_schema();
        assert_eq!(schema.attributes().len(), 1);
        assert_eq!(schema.attributes()[0].data_type, arrow::datatypes::DataType::Int32);
        assert_eq!(schema.attributes()[0].shape, Vec::<usize>::new());
    }

    #[test]
    fn schema_is_invariant_across_differently_sized_batches() {
        let full: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3, 4, 5]));
        let tail: ArrayRef = Arc::new(Int32Array::from(vec![1, 2]));
        let full_schema = Example::new(vec![("x".to_string(), full)], 0).infer_schema();
        let tail_schema = Example::new(vec![("x".to_string(), tail)], 3).infer_schema();
        assert!(full_schema.matches(&tail_schema));
    }
}
