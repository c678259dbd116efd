//! Multi-way branch dispatch tables
//!
//! A switch statement collects `(case key, label)` pairs while its arms are
//! emitted. Labels only get addresses after layout, so the table is composed
//! into its binary blob in a second pass; composing consumes the table,
//! leaving the blob as the only artifact.
//!
//! Blob layouts (big-endian):
//!
//! ```text
//! dense:  u8 1, i32 first_key, i32 case_count, i32 address... (-1 fills gaps)
//! sparse: u8 2, i32 default_address, i32 case_count, (i32 key, i32 address)...
//! ```

use std::collections::BTreeMap;

use crate::codegen::label::{Label, LabelResolver};
use crate::error::{Error, Result};
use crate::program::FunctionId;

pub const DENSE_TAG: u8 = 1;
pub const SPARSE_TAG: u8 = 2;
/// Address written for a key inside a dense range that has no case
pub const GAP_SENTINEL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Dense { first_key: i32 },
    Sparse { default: Label },
}

impl DispatchKind {
    /// Table-vs-lookup cost rule: dense when its space cost plus three
    /// times its (constant) time cost does not exceed the sparse variant's.
    /// `bias` is added to the sparse side.
    pub fn prefer_dense(keys: &[i32], bias: i64) -> bool {
        let (Some(lo), Some(hi)) = (keys.iter().min(), keys.iter().max()) else {
            return false;
        };
        let n = keys.len() as i64;
        let table_space = 4 + (*hi as i64 - *lo as i64 + 1);
        let table_time = 3;
        let lookup_space = 3 + 2 * n;
        let lookup_time = n;
        table_space + 3 * table_time <= lookup_space + 3 * lookup_time + bias
    }
}

/// Live dispatch table of one function body
#[derive(Debug, Clone)]
pub struct DispatchTable {
    owner: FunctionId,
    id: u32,
    kind: DispatchKind,
    labels: BTreeMap<i32, Label>,
}

/// Frozen dispatch table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchBlob {
    pub owner: FunctionId,
    pub id: u32,
    pub bytes: Vec<u8>,
}

impl DispatchTable {
    pub fn dense(owner: FunctionId, id: u32, first_key: i32) -> Self {
        Self {
            owner,
            id,
            kind: DispatchKind::Dense { first_key },
            labels: BTreeMap::new(),
        }
    }

    pub fn sparse(owner: FunctionId, id: u32, default: Label) -> Self {
        Self {
            owner,
            id,
            kind: DispatchKind::Sparse { default },
            labels: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn owner(&self) -> FunctionId {
        self.owner
    }

    pub fn kind(&self) -> DispatchKind {
        self.kind
    }

    pub fn case_count(&self) -> usize {
        self.labels.len()
    }

    /// Register the jump target of one case key
    pub fn add_label(&mut self, key: i32, label: Label) -> Result<()> {
        if let DispatchKind::Dense { first_key } = self.kind {
            if key < first_key {
                return Err(Error::internal(format!(
                    "case key {} below first key {} of dense table {}",
                    key, first_key, self.id
                )));
            }
        }
        if self.labels.contains_key(&key) {
            return Err(Error::duplicate_key(format!("case {}", key)));
        }
        self.labels.insert(key, label);
        Ok(())
    }

    /// Compose the binary blob. Every referenced label must already have an
    /// address.
    pub fn compose_blob(self, labels: &dyn LabelResolver) -> Result<DispatchBlob> {
        let resolve = |label: Label| {
            labels
                .address(label)
                .ok_or_else(|| Error::internal(format!("dispatch table {} references unplaced {:?}", self.id, label)))
        };
        let count = i32::try_from(self.labels.len()).map_err(|_| Error::internal("too many cases"))?;

        let mut bytes = Vec::new();
        match self.kind {
            DispatchKind::Dense { first_key } => {
                bytes.push(DENSE_TAG);
                bytes.extend_from_slice(&first_key.to_be_bytes());
                bytes.extend_from_slice(&count.to_be_bytes());
                let mut written: i64 = 0;
                for (key, label) in &self.labels {
                    let offset = *key as i64 - first_key as i64;
                    while written < offset {
                        bytes.extend_from_slice(&GAP_SENTINEL.to_be_bytes());
                        written += 1;
                    }
                    bytes.extend_from_slice(&resolve(*label)?.to_be_bytes());
                    written += 1;
                }
            }
            DispatchKind::Sparse { default } => {
                bytes.push(SPARSE_TAG);
                bytes.extend_from_slice(&resolve(default)?.to_be_bytes());
                bytes.extend_from_slice(&count.to_be_bytes());
                for (key, label) in &self.labels {
                    bytes.extend_from_slice(&key.to_be_bytes());
                    bytes.extend_from_slice(&resolve(*label)?.to_be_bytes());
                }
            }
        }
        log::debug!("dispatch table {} composed: {} cases, {} bytes", self.id, count, bytes.len());
        Ok(DispatchBlob {
            owner: self.owner,
            id: self.id,
            bytes,
        })
    }
}
