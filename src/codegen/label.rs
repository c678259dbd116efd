//! Jump targets
//!
//! Labels are handles created while a body is emitted and placed at an
//! instruction index. Their byte addresses are only known after the layout
//! pass, so everything that references a label (jump operands, dispatch
//! tables, protected ranges) keeps the handle until the freeze pass.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source of resolved label addresses
pub trait LabelResolver {
    fn address(&self, label: Label) -> Option<i32>;
}

impl LabelResolver for HashMap<Label, i32> {
    fn address(&self, label: Label) -> Option<i32> {
        self.get(&label).copied()
    }
}

/// Pass 1 bookkeeping: label → instruction index
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    positions: Vec<Option<usize>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.positions.push(None);
        Label::new((self.positions.len() - 1) as u32)
    }

    /// Place a label before the instruction at `position`
    pub fn place(&mut self, label: Label, position: usize) -> Result<()> {
        let slot = self
            .positions
            .get_mut(label.index())
            .ok_or_else(|| Error::internal(format!("unknown {:?}", label)))?;
        if slot.is_some() {
            return Err(Error::internal(format!("{:?} placed twice", label)));
        }
        log::trace!("place {:?} at instruction {}", label, position);
        *slot = Some(position);
        Ok(())
    }

    pub fn position(&self, label: Label) -> Option<usize> {
        self.positions.get(label.index()).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Pass 2: translate instruction indices to byte addresses.
    ///
    /// `offsets[i]` is the byte offset of instruction `i`; one extra entry
    /// holds the end of the stream so labels placed after the last
    /// instruction resolve too. Unplaced labels stay unresolved.
    pub fn resolve(&self, offsets: &[usize]) -> Result<ResolvedLabels> {
        let mut addresses = Vec::with_capacity(self.positions.len());
        for (i, position) in self.positions.iter().enumerate() {
            let address = match position {
                Some(p) => {
                    let offset = offsets
                        .get(*p)
                        .ok_or_else(|| Error::internal(format!("label {} placed past end of stream", i)))?;
                    Some(i32::try_from(*offset).map_err(|_| Error::internal("code address exceeds i32"))?)
                }
                None => None,
            };
            addresses.push(address);
        }
        Ok(ResolvedLabels { addresses })
    }
}

/// Label addresses after layout
#[derive(Debug, Clone)]
pub struct ResolvedLabels {
    addresses: Vec<Option<i32>>,
}

impl LabelResolver for ResolvedLabels {
    fn address(&self, label: Label) -> Option<i32> {
        self.addresses.get(label.index()).copied().flatten()
    }
}
