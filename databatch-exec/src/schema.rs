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

//! Schema: the ordered list of tensor attributes inferred once from the
//! first non-empty decoded example and cached for the rest of the epoch
//! (§3, §4.5).

use std::fmt;
use std::sync::{Arc, Mutex};

use arrow::datatypes::DataType;

/// One named tensor attribute: element type plus the fixed logical shape
/// every example's column of this name must have. Arrow's own `Field`
/// only carries a `DataType`, not a multi-dimensional shape, so the shape
/// is tracked alongside it here rather than invented framing inside Arrow
/// itself.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorSpec {
    pub name: String,
    pub data_type: DataType,
    pub shape: Vec<usize>,
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}{:?}", self.name, self.data_type, self.shape)
    }
}

/// Immutable once inferred. Cheaply cloneable (`Arc`-backed), matching the
/// `SchemaRef` convention Arrow/DataFusion use throughout the corpus.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    attributes: Arc<Vec<TensorSpec>>,
}

pub type SchemaRef = Schema;

impl Schema {
    pub fn new(attributes: Vec<TensorSpec>) -> Self {
        Schema {
            attributes: Arc::new(attributes),
        }
    }

    pub fn attributes(&self) -> &[TensorSpec] {
        &self.attributes
    }

    /// A decoded example whose shapes disagree with this schema is a
    /// fatal `SchemaMismatch` (§3, §7 category 5).
    pub fn matches(&self, other: &Schema) -> bool {
        self.attributes == other.attributes
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", attr)?;
        }
        write!(f, "]")
    }
}

/// The "internal lock" of §5: written once by whichever decode worker
/// first produces a non-empty example, read-only thereafter. `schema()`
/// on the controller is non-blocking (§6), so a plain mutex guarding an
/// `Option` is enough; readers never contend with a long critical
/// section.
#[derive(Default)]
pub struct SchemaCell(Mutex<Option<Schema>>);

impl SchemaCell {
    pub fn new() -> Self {
        SchemaCell(Mutex::new(None))
    }

    pub fn get(&self) -> Option<Schema> {
        self.0.lock().unwrap().clone()
    }

    /// Installs `schema` if no schema has been cached yet; returns
    /// whichever schema is now in effect, so a losing racer still gets
    /// back the winner's schema to validate against.
    pub fn get_or_init(&self, schema: Schema) -> Schema {
        let mut guard = self.0.lock().unwrap();
        if guard.is_none() {
            *guard = Some(schema.clone());
        }
        guard.clone().expect("just initialised")
    }
}
