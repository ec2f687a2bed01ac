//! Chunk section: the file-global table of variable-length values
//!
//! Rows only hold an 8-byte placeholder for String and IntArray cells. The
//! payloads live in a trailing section keyed by the absolute file offset of
//! each placeholder:
//!
//! ```text
//! int32 "CHNK"
//! int32 count
//! count × (int32 offset, payload)
//! ```
//!
//! A string payload is a NUL-padded, length-prefixed UTF-8 string; an int
//! array payload is an element count followed by raw int32 values. The payload
//! carries no type tag, so the reader has to be told which offsets hold which
//! shape before the section is parsed.

use std::collections::HashMap;
use std::io::{Read, Write};
use tracing::{debug, warn};

use crate::error::Result;
use crate::mbe::io::{MbeReader, MbeWriter};
use crate::mbe::types::{ChunkValue, ValueShape};

/// Magic tag opening a non-empty chunk section ("CHNK")
pub const CHUNK_MAGIC: i32 = 0x4B4E4843;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Placeholder(ValueShape),
    Resolved(ChunkValue),
}

/// Offset-keyed table of variable-length values, in insertion order
#[derive(Debug, Clone, Default)]
pub struct ChunkTable {
    entries: Vec<(i32, Slot)>,
    index: HashMap<i32, usize>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `offset` holds a payload of `shape`.
    ///
    /// Only registered offsets are picked up by [`ChunkTable::read`].
    pub fn register(&mut self, offset: i32, shape: ValueShape) {
        self.set_slot(offset, Slot::Placeholder(shape));
    }

    /// Store a resolved value at `offset`
    pub fn insert(&mut self, offset: i32, value: ChunkValue) {
        self.set_slot(offset, Slot::Resolved(value));
    }

    fn set_slot(&mut self, offset: i32, slot: Slot) {
        match self.index.get(&offset) {
            Some(&idx) => self.entries[idx].1 = slot,
            None => {
                self.index.insert(offset, self.entries.len());
                self.entries.push((offset, slot));
            }
        }
    }

    /// Resolved value at `offset`, if any
    pub fn get(&self, offset: i32) -> Option<&ChunkValue> {
        match self.slot(offset)? {
            Slot::Resolved(value) => Some(value),
            Slot::Placeholder(_) => None,
        }
    }

    /// Payload shape known for `offset`, registered or resolved
    pub fn shape(&self, offset: i32) -> Option<ValueShape> {
        match self.slot(offset)? {
            Slot::Resolved(value) => Some(value.shape()),
            Slot::Placeholder(shape) => Some(*shape),
        }
    }

    fn slot(&self, offset: i32) -> Option<&Slot> {
        self.index.get(&offset).map(|&idx| &self.entries[idx].1)
    }

    /// Number of offsets known to the table, resolved or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved entries in insertion order
    pub fn resolved(&self) -> impl Iterator<Item = (i32, &ChunkValue)> {
        self.entries.iter().filter_map(|(offset, slot)| match slot {
            Slot::Resolved(value) => Some((*offset, value)),
            Slot::Placeholder(_) => None,
        })
    }

    /// Number of resolved entries
    pub fn resolved_len(&self) -> usize {
        self.resolved().count()
    }

    /// Read the body of a chunk section (everything after the magic tag).
    ///
    /// Entries at registered offsets overwrite their placeholder. Entries at
    /// unknown offsets are skipped as string-shaped payloads.
    pub fn read<R: Read>(&mut self, reader: &mut MbeReader<R>) -> Result<()> {
        let count = reader.read_len("chunk entry count")?;
        let mut skipped = 0usize;

        for _ in 0..count {
            let offset = reader.read_i32("chunk entry offset")?;
            match self.shape(offset) {
                Some(ValueShape::String) => {
                    let value = reader.read_string("chunk string")?;
                    self.insert(offset, ChunkValue::String(value));
                }
                Some(ValueShape::IntArray) => {
                    let len = reader.read_len("chunk int array length")?;
                    let mut values = Vec::with_capacity(len.min(1 << 16));
                    for _ in 0..len {
                        values.push(reader.read_i32("chunk int array")?);
                    }
                    self.insert(offset, ChunkValue::IntArray(values));
                }
                None => {
                    let len = reader.read_len("unregistered chunk entry")?;
                    reader.skip(len as u64, "unregistered chunk entry")?;
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("Skipped {} chunk entries with no matching cell", skipped);
        }
        debug!("Read {} chunk entries", count);
        Ok(())
    }

    /// Write the chunk section including its magic tag.
    ///
    /// A table with no resolved values is written as a single zero.
    pub fn write<W: Write>(&self, writer: &mut MbeWriter<W>) -> Result<()> {
        let count = self.resolved_len();
        if count == 0 {
            return writer.write_i32(0);
        }

        writer.write_i32(CHUNK_MAGIC)?;
        writer.write_len(count)?;
        for (offset, value) in self.resolved() {
            writer.write_i32(offset)?;
            match value {
                ChunkValue::String(s) => writer.write_padded_string(s)?,
                ChunkValue::IntArray(ints) => {
                    writer.write_len(ints.len())?;
                    for &i in ints {
                        writer.write_i32(i)?;
                    }
                }
            }
        }
        debug!("Wrote {} chunk entries", count);
        Ok(())
    }
}
