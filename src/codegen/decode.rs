//! Readers for the table blob formats

use crate::codegen::dispatch::{DENSE_TAG, SPARSE_TAG};
use crate::codegen::opcode::Opcode;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseTable {
    pub first_key: i32,
    pub case_count: i32,
    /// One address per key from `first_key` up to the largest case key
    pub addresses: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseTable {
    pub default_address: i32,
    pub pairs: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerEntry {
    pub begin: i32,
    pub end: i32,
    pub handler: i32,
    pub type_indices: Vec<i32>,
}

/// Decoded class definition stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionStream {
    pub strings: Vec<String>,
    pub instructions: Vec<(Opcode, Vec<i32>)>,
}

/// Either dispatch table variant, chosen by the tag byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTableView {
    Dense(DenseTable),
    Sparse(SparseTable),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::encoding(format!("blob truncated at byte {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    fn i32(&mut self) -> Result<i32> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| Error::encoding(format!("blob truncated at byte {}", self.pos)))?;
        self.pos += 4;
        Ok(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or_else(|| Error::encoding(format!("blob truncated at byte {}", self.pos)))?;
        self.pos += len;
        Ok(chunk)
    }

    fn count(&mut self) -> Result<usize> {
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| Error::encoding(format!("negative count {}", value)))
    }
}

pub fn decode_dispatch(bytes: &[u8]) -> Result<DispatchTableView> {
    match bytes.first() {
        Some(&DENSE_TAG) => decode_dense(bytes).map(DispatchTableView::Dense),
        Some(&SPARSE_TAG) => decode_sparse(bytes).map(DispatchTableView::Sparse),
        Some(tag) => Err(Error::encoding(format!("unknown dispatch table tag {}", tag))),
        None => Err(Error::encoding("empty dispatch blob")),
    }
}

/// Decode a dense table; the address list runs to the end of the blob
pub fn decode_dense(bytes: &[u8]) -> Result<DenseTable> {
    let mut reader = Reader::new(bytes);
    let tag = reader.u8()?;
    if tag != DENSE_TAG {
        return Err(Error::encoding(format!("expected dense tag {}, found {}", DENSE_TAG, tag)));
    }
    let first_key = reader.i32()?;
    let case_count = reader.i32()?;
    if reader.remaining() % 4 != 0 {
        return Err(Error::encoding("dense address list is not a whole number of entries"));
    }
    let mut addresses = Vec::with_capacity(reader.remaining() / 4);
    while reader.remaining() > 0 {
        addresses.push(reader.i32()?);
    }
    let present = addresses.iter().filter(|a| **a != crate::codegen::dispatch::GAP_SENTINEL).count();
    if present as i64 != case_count as i64 {
        return Err(Error::encoding(format!(
            "dense table declares {} cases but holds {}",
            case_count, present
        )));
    }
    Ok(DenseTable {
        first_key,
        case_count,
        addresses,
    })
}

pub fn decode_sparse(bytes: &[u8]) -> Result<SparseTable> {
    let mut reader = Reader::new(bytes);
    let tag = reader.u8()?;
    if tag != SPARSE_TAG {
        return Err(Error::encoding(format!("expected sparse tag {}, found {}", SPARSE_TAG, tag)));
    }
    let default_address = reader.i32()?;
    let count = reader.count()?;
    let mut pairs = Vec::with_capacity(count.min(reader.remaining() / 8));
    for _ in 0..count {
        pairs.push((reader.i32()?, reader.i32()?));
    }
    if reader.remaining() != 0 {
        return Err(Error::encoding(format!("{} trailing byte(s) after sparse table", reader.remaining())));
    }
    Ok(SparseTable { default_address, pairs })
}

pub fn decode_handlers(bytes: &[u8]) -> Result<Vec<HandlerEntry>> {
    let mut reader = Reader::new(bytes);
    let mut entries = Vec::new();
    while reader.remaining() > 0 {
        let begin = reader.i32()?;
        let end = reader.i32()?;
        let handler = reader.i32()?;
        let count = reader.count()?;
        let mut type_indices = Vec::with_capacity(count.min(reader.remaining() / 4));
        for _ in 0..count {
            type_indices.push(reader.i32()?);
        }
        entries.push(HandlerEntry {
            begin,
            end,
            handler,
            type_indices,
        });
    }
    Ok(entries)
}

/// Decode a definition stream; string literals are collected into the pool
/// and every other instruction is returned with its operands
pub fn decode_definition(bytes: &[u8]) -> Result<DefinitionStream> {
    let mut reader = Reader::new(bytes);
    let mut strings = Vec::new();
    let mut instructions = Vec::new();
    while reader.remaining() > 0 {
        let byte = reader.u8()?;
        let opcode = Opcode::from_byte(byte).ok_or_else(|| Error::encoding(format!("unknown opcode {:#04x}", byte)))?;
        let mut operands = Vec::with_capacity(opcode.operand_count());
        for _ in 0..opcode.operand_count() {
            operands.push(reader.i32()?);
        }
        if opcode == Opcode::LiteralString {
            if operands[0] as usize != strings.len() {
                return Err(Error::encoding(format!("string literal {} out of order", operands[0])));
            }
            let len = usize::try_from(operands[1]).map_err(|_| Error::encoding("negative string length"))?;
            let raw = reader.bytes(len)?;
            let text = String::from_utf8(raw.to_vec()).map_err(|e| Error::encoding(e.to_string()))?;
            strings.push(text);
        } else {
            instructions.push((opcode, operands));
        }
    }
    Ok(DefinitionStream { strings, instructions })
}
