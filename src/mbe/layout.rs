//! Column schema, row layout and the fixed-stride row codec
//!
//! A row is laid out by walking the columns in order with a cursor:
//!
//! - fixed-width kinds round the cursor up to their alignment and then
//!   consume their size
//! - Bool columns share a rolling 32-bit word; the first Bool of a run
//!   reserves a 4-aligned word and the next 31 Bool columns (even with other
//!   columns in between) use its remaining bits
//! - String and IntArray columns hold an 8-byte, 8-aligned placeholder whose
//!   payload lives in the chunk section
//! - Empty and Reserved columns take no space
//!
//! The row stride is the final cursor rounded up to 8.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::mbe::chunk::ChunkTable;
use crate::mbe::io::align;
use crate::mbe::types::{cell_to_float, float_to_cell, round_float, Cell, ChunkValue, ColumnKind};

const BOOL_BITS: u8 = 32;

/// Where a column lives inside a row buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    /// Zero-width marker column
    Marker,
    /// Bit `bit` of the 32-bit word at `word_offset`
    Bit { word_offset: usize, bit: u8 },
    /// Inline bytes starting at `offset`
    Inline { offset: usize },
}

/// Ordered column kinds of a sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    kinds: Vec<ColumnKind>,
}

impl Schema {
    pub fn new(kinds: Vec<ColumnKind>) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kind(&self, column: usize) -> Option<ColumnKind> {
        self.kinds.get(column).copied()
    }

    /// Place every column and return the slots together with the row stride
    pub fn layout(&self) -> (Vec<FieldSlot>, usize) {
        let mut slots = Vec::with_capacity(self.kinds.len());
        let mut cursor = 0usize;
        let mut bool_word = 0usize;
        let mut bool_bit = 0u8;

        for &kind in &self.kinds {
            let slot = match kind {
                ColumnKind::Bool => {
                    if bool_bit == 0 {
                        cursor = align(cursor, 4);
                        bool_word = cursor;
                        cursor += 4;
                    }
                    let slot = FieldSlot::Bit {
                        word_offset: bool_word,
                        bit: bool_bit,
                    };
                    bool_bit += 1;
                    if bool_bit >= BOOL_BITS {
                        bool_bit = 0;
                    }
                    slot
                }
                k if k.is_marker() => FieldSlot::Marker,
                k => {
                    cursor = align(cursor, k.alignment());
                    let slot = FieldSlot::Inline { offset: cursor };
                    cursor += k.size();
                    slot
                }
            };
            slots.push(slot);
        }

        (slots, align(cursor, 8))
    }

    /// Row stride recomputed from the column kinds
    pub fn row_stride(&self) -> usize {
        self.layout().1
    }

    /// CSV header cells, `"<Kind> <1-based ordinal>"`
    pub fn header(&self) -> Vec<String> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| format!("{} {}", kind, idx + 1))
            .collect()
    }
}

impl From<Vec<ColumnKind>> for Schema {
    fn from(kinds: Vec<ColumnKind>) -> Self {
        Self::new(kinds)
    }
}

/// Encodes and decodes rows of one schema
pub struct RowCodec<'a> {
    kinds: &'a [ColumnKind],
    slots: Vec<FieldSlot>,
    stride: usize,
}

impl<'a> RowCodec<'a> {
    /// Build a codec for rows of `stride` bytes
    pub fn new(schema: &'a Schema, stride: usize) -> Self {
        let (slots, _) = schema.layout();
        Self {
            kinds: schema.kinds(),
            slots,
            stride,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Decode one row buffer into `cells`.
    ///
    /// Variable-length columns register a placeholder at their absolute
    /// offset (`row_start` plus the field offset) in `chunk` and are
    /// reported through `pending` so the caller can resolve them later.
    pub fn decode_row(
        &self,
        row: i32,
        buf: &[u8],
        row_start: u64,
        cells: &mut BTreeMap<Cell, i64>,
        chunk: &mut ChunkTable,
        pending: &mut Vec<(i32, Cell)>,
    ) -> Result<()> {
        for (column, (&kind, &slot)) in self.kinds.iter().zip(&self.slots).enumerate() {
            let cell = Cell::new(row, column as i32);
            let value = match slot {
                FieldSlot::Marker => 0,
                FieldSlot::Bit { word_offset, bit } => {
                    let word = u32::from_le_bytes(read_array(buf, word_offset, cell)?);
                    ((word >> bit) & 1) as i64
                }
                FieldSlot::Inline { offset } => match kind {
                    ColumnKind::Byte => read_array::<1>(buf, offset, cell)?[0] as i8 as i64,
                    ColumnKind::Short => i16::from_le_bytes(read_array(buf, offset, cell)?) as i64,
                    ColumnKind::Int => i32::from_le_bytes(read_array(buf, offset, cell)?) as i64,
                    ColumnKind::Float => {
                        float_to_cell(f32::from_le_bytes(read_array(buf, offset, cell)?))
                    }
                    k => {
                        // Bounds check the placeholder even though its bytes are ignored
                        read_array::<8>(buf, offset, cell)?;
                        if let Some(shape) = k.value_shape() {
                            let absolute = absolute_offset(row_start, offset)?;
                            chunk.register(absolute, shape);
                            pending.push((absolute, cell));
                        }
                        0
                    }
                },
            };
            cells.insert(cell, value);
        }
        Ok(())
    }

    /// Encode one row into a zeroed buffer of `stride` bytes.
    ///
    /// Resolved variable-length values are registered in `chunk` keyed by the
    /// absolute offset of their placeholder.
    pub fn encode_row(
        &self,
        row: i32,
        row_start: u64,
        cells: &BTreeMap<Cell, i64>,
        values: &BTreeMap<Cell, ChunkValue>,
        chunk: &mut ChunkTable,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.stride];

        for (column, (&kind, &slot)) in self.kinds.iter().zip(&self.slots).enumerate() {
            let cell = Cell::new(row, column as i32);
            let value = *cells
                .get(&cell)
                .ok_or(Error::SchemaCellMismatch { row, column: column as i32 })?;

            match slot {
                FieldSlot::Marker => {}
                FieldSlot::Bit { word_offset, bit } => {
                    if value != 0 {
                        let mut word = u32::from_le_bytes(read_array(&buf, word_offset, cell)?);
                        word |= 1 << bit;
                        write_bytes(&mut buf, word_offset, &word.to_le_bytes(), cell)?;
                    }
                }
                FieldSlot::Inline { offset } => match kind {
                    ColumnKind::Byte => write_bytes(&mut buf, offset, &[value as u8], cell)?,
                    ColumnKind::Short => {
                        write_bytes(&mut buf, offset, &(value as i16).to_le_bytes(), cell)?
                    }
                    ColumnKind::Int => {
                        write_bytes(&mut buf, offset, &(value as i32).to_le_bytes(), cell)?
                    }
                    ColumnKind::Float => {
                        let rounded = round_float(cell_to_float(value));
                        write_bytes(&mut buf, offset, &rounded.to_le_bytes(), cell)?
                    }
                    _ => {
                        write_bytes(&mut buf, offset, &[0u8; 8], cell)?;
                        if let Some(resolved) = values.get(&cell) {
                            chunk.insert(absolute_offset(row_start, offset)?, resolved.clone());
                        }
                    }
                },
            }
        }

        Ok(buf)
    }
}

fn absolute_offset(row_start: u64, offset: usize) -> Result<i32> {
    i32::try_from(row_start + offset as u64).map_err(|_| Error::InvalidLength {
        context: "chunk offset".to_string(),
        len: i32::MAX,
    })
}

fn read_array<const N: usize>(buf: &[u8], offset: usize, cell: Cell) -> Result<[u8; N]> {
    buf.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::TruncatedStream(format!("row data for cell {}", cell)))
}

fn write_bytes(buf: &mut [u8], offset: usize, bytes: &[u8], cell: Cell) -> Result<()> {
    buf.get_mut(offset..offset + bytes.len())
        .ok_or_else(|| Error::TruncatedStream(format!("row buffer for cell {}", cell)))?
        .copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbe::types::ValueShape;
    use proptest::prelude::*;

    fn schema(kinds: &[ColumnKind]) -> Schema {
        Schema::new(kinds.to_vec())
    }

    #[test]
    fn test_stride_fixed_width() {
        use ColumnKind::*;
        assert_eq!(schema(&[]).row_stride(), 0);
        assert_eq!(schema(&[Byte]).row_stride(), 8);
        // Byte at 0, Short at 2, Int at 4, Float at 8
        assert_eq!(schema(&[Byte, Short, Int, Float]).row_stride(), 16);
        // Int at 0, String at 8
        assert_eq!(schema(&[Int, String]).row_stride(), 16);
        assert_eq!(schema(&[Empty, Reserved, Empty]).row_stride(), 0);
    }

    #[test]
    fn test_layout_slots() {
        use ColumnKind::*;
        let (slots, stride) = schema(&[Byte, Bool, Empty, Short, Bool, IntArray]).layout();
        assert_eq!(
            slots,
            vec![
                FieldSlot::Inline { offset: 0 },
                FieldSlot::Bit { word_offset: 4, bit: 0 },
                FieldSlot::Marker,
                FieldSlot::Inline { offset: 8 },
                FieldSlot::Bit { word_offset: 4, bit: 1 },
                FieldSlot::Inline { offset: 16 },
            ]
        );
        assert_eq!(stride, 24);
    }

    #[test]
    fn test_bool_runs_roll_over_after_32() {
        let kinds = vec![ColumnKind::Bool; 33];
        let (slots, stride) = Schema::new(kinds).layout();
        assert_eq!(slots[31], FieldSlot::Bit { word_offset: 0, bit: 31 });
        assert_eq!(slots[32], FieldSlot::Bit { word_offset: 4, bit: 0 });
        assert_eq!(stride, 8);
    }

    #[test]
    fn test_header() {
        use ColumnKind::*;
        assert_eq!(
            schema(&[Int, Bool, String]).header(),
            vec!["Int 1", "Bool 2", "String 3"]
        );
    }

    #[test]
    fn test_row_codec_round_trip() {
        use ColumnKind::*;
        let schema = schema(&[Byte, Short, Bool, Int, Float, Bool, String, Empty, IntArray]);
        let stride = schema.row_stride();
        let codec = RowCodec::new(&schema, stride);

        let mut cells = BTreeMap::new();
        let row_values = [-5i64, -300, 1, 123456, float_to_cell(2.5), 1, 0, 0, 0];
        for (column, value) in row_values.iter().enumerate() {
            cells.insert(Cell::new(0, column as i32), *value);
        }
        let mut values = BTreeMap::new();
        values.insert(Cell::new(0, 6), ChunkValue::from("name"));
        values.insert(Cell::new(0, 8), ChunkValue::from(vec![1, -2, 3]));

        let mut out_chunk = ChunkTable::new();
        let buf = codec
            .encode_row(0, 64, &cells, &values, &mut out_chunk)
            .unwrap();
        assert_eq!(buf.len(), stride);
        assert_eq!(out_chunk.len(), 2);

        let mut decoded = BTreeMap::new();
        let mut in_chunk = ChunkTable::new();
        let mut pending = Vec::new();
        codec
            .decode_row(0, &buf, 64, &mut decoded, &mut in_chunk, &mut pending)
            .unwrap();
        assert_eq!(decoded, cells);
        assert_eq!(pending.len(), 2);
        for (offset, cell) in &pending {
            let expected = values[cell].shape();
            assert_eq!(in_chunk.shape(*offset), Some(expected));
            assert_eq!(out_chunk.get(*offset), values.get(cell));
        }
        assert_eq!(in_chunk.shape(pending[0].0), Some(ValueShape::String));
    }

    #[test]
    fn test_encode_missing_cell_fails() {
        let schema = schema(&[ColumnKind::Int, ColumnKind::Int]);
        let codec = RowCodec::new(&schema, schema.row_stride());
        let mut cells = BTreeMap::new();
        cells.insert(Cell::new(0, 0), 1);
        let err = codec
            .encode_row(0, 0, &cells, &BTreeMap::new(), &mut ChunkTable::new())
            .unwrap_err();
        assert!(matches!(err, Error::SchemaCellMismatch { row: 0, column: 1 }));
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        let schema = schema(&[ColumnKind::Int, ColumnKind::Int]);
        let codec = RowCodec::new(&schema, 4);
        let mut cells = BTreeMap::new();
        let result = codec.decode_row(
            0,
            &[0u8; 4],
            0,
            &mut cells,
            &mut ChunkTable::new(),
            &mut Vec::new(),
        );
        assert!(matches!(result, Err(Error::TruncatedStream(_))));
    }

    proptest! {
        #[test]
        fn prop_bool_only_stride(n in 1usize..200) {
            let schema = Schema::new(vec![ColumnKind::Bool; n]);
            let words = n.div_ceil(32);
            prop_assert_eq!(schema.row_stride(), align(words * 4, 8));
            prop_assert_eq!(schema.row_stride(), schema.row_stride());
        }

        #[test]
        fn prop_float_encoding_is_stable(bits in any::<u32>()) {
            let value = f32::from_bits(bits);
            prop_assume!(value.is_finite());

            let schema = Schema::new(vec![ColumnKind::Float]);
            let codec = RowCodec::new(&schema, schema.row_stride());
            let mut cells = BTreeMap::new();
            cells.insert(Cell::new(0, 0), value.to_bits() as i32 as i64);
            let mut chunk = ChunkTable::new();

            let first = codec.encode_row(0, 0, &cells, &BTreeMap::new(), &mut chunk).unwrap();
            let mut decoded = BTreeMap::new();
            codec.decode_row(0, &first, 0, &mut decoded, &mut chunk, &mut Vec::new()).unwrap();
            let second = codec.encode_row(0, 0, &decoded, &BTreeMap::new(), &mut chunk).unwrap();
            let mut again = BTreeMap::new();
            codec.decode_row(0, &second, 0, &mut again, &mut chunk, &mut Vec::new()).unwrap();
            let third = codec.encode_row(0, 0, &again, &BTreeMap::new(), &mut chunk).unwrap();

            prop_assert_eq!(second, third);
        }
    }
}
