//! Exception handler tables
//!
//! Protected ranges are registered in any order while a body is emitted.
//! Before serialization they are sorted by descending begin address, so a
//! nested (later starting) range always precedes the range enclosing it and
//! a first-match linear scan finds the innermost handler.
//!
//! Entry layout (big-endian): `i32 begin, i32 end, i32 handler,
//! i32 type_count, i32 type_index...`; type indices point into the owning
//! function's known-class table.

use crate::codegen::label::{Label, LabelResolver};
use crate::error::{Error, Result};
use crate::program::FunctionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRange {
    pub begin: Label,
    pub end: Label,
    pub handler: Label,
    pub type_indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct TryCatchTable {
    owner: FunctionId,
    id: u32,
    ranges: Vec<HandlerRange>,
}

impl TryCatchTable {
    pub fn new(owner: FunctionId, id: u32) -> Self {
        Self {
            owner,
            id,
            ranges: Vec::new(),
        }
    }

    pub fn owner(&self) -> FunctionId {
        self.owner
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Append one protected range
    pub fn register(&mut self, begin: Label, end: Label, handler: Label, type_indices: Vec<u32>) {
        self.ranges.push(HandlerRange {
            begin,
            end,
            handler,
            type_indices,
        });
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Resolve every range, order innermost first and serialize
    pub fn compose_blob(self, labels: &dyn LabelResolver) -> Result<Vec<u8>> {
        let resolve = |label: Label| {
            labels
                .address(label)
                .ok_or_else(|| Error::internal(format!("handler table {} references unplaced {:?}", self.id, label)))
        };

        let mut entries = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            let (begin, end, handler) = (resolve(range.begin)?, resolve(range.end)?, resolve(range.handler)?);
            if begin > end {
                return Err(Error::internal(format!("protected range {}..{} is inverted", begin, end)));
            }
            entries.push((begin, end, handler, &range.type_indices));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        let mut bytes = Vec::new();
        for (begin, end, handler, types) in entries {
            bytes.extend_from_slice(&begin.to_be_bytes());
            bytes.extend_from_slice(&end.to_be_bytes());
            bytes.extend_from_slice(&handler.to_be_bytes());
            let count = i32::try_from(types.len()).map_err(|_| Error::internal("too many exception types"))?;
            bytes.extend_from_slice(&count.to_be_bytes());
            for index in types {
                let index = i32::try_from(*index).map_err(|_| Error::internal("class index exceeds i32"))?;
                bytes.extend_from_slice(&index.to_be_bytes());
            }
        }
        Ok(bytes)
    }
}
