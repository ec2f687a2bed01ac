//! A single named table inside an MBE container

use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mbe::chunk::ChunkTable;
use crate::mbe::io::{MbeReader, MbeWriter};
use crate::mbe::layout::{RowCodec, Schema};
use crate::mbe::types::{cell_to_float, float_to_cell, Cell, ChunkValue, ColumnKind};

/// Upper bound on cells decoded from rows that occupy no bytes
const MAX_ZERO_STRIDE_CELLS: usize = 1 << 20;

/// One sheet: a schema plus its cell maps.
///
/// Every declared cell has an entry in `cells` (0 for markers and
/// variable-length columns). String and IntArray cells additionally have an
/// entry in `values` once their payload is known.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    pub(crate) row_count: usize,
    /// Row stride as stored in the file, if the sheet was decoded from one
    pub(crate) persisted_stride: Option<usize>,
    pub(crate) cells: BTreeMap<Cell, i64>,
    pub(crate) values: BTreeMap<Cell, ChunkValue>,
    /// Chunk offsets still waiting to be resolved, with their cell
    pending: Vec<(i32, Cell)>,
}

impl Sheet {
    /// Create an empty sheet
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            row_count: 0,
            persisted_stride: None,
            cells: BTreeMap::new(),
            values: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Decode a sheet from a container stream.
    ///
    /// String and IntArray cells are registered in `chunk`; their values are
    /// filled in later by [`Sheet::apply_resolved_chunk`].
    pub fn read<R: Read>(reader: &mut MbeReader<R>, chunk: &mut ChunkTable) -> Result<Self> {
        reader.align_to(8, "sheet padding")?;
        let name = reader.read_string("sheet name")?;

        let column_count = reader.read_len("column count")?;
        let mut kinds = Vec::with_capacity(column_count.min(1 << 12));
        for _ in 0..column_count {
            kinds.push(ColumnKind::try_from(reader.read_u8("column kind")?)?);
        }
        let schema = Schema::new(kinds);

        let stride = reader.read_len("row stride")?;
        let row_count = reader.read_len("row count")?;

        let computed = schema.row_stride();
        if computed != stride {
            debug!(
                "Sheet {}: stored row stride {} differs from computed {}",
                name, stride, computed
            );
        }

        // Zero-width rows consume no input, so nothing else bounds their count
        if stride == 0 && row_count.saturating_mul(schema.len().max(1)) > MAX_ZERO_STRIDE_CELLS {
            return Err(Error::InvalidLength {
                context: format!("row count of zero-stride sheet {}", name),
                len: row_count as i32,
            });
        }

        let mut sheet = Sheet::new(name, schema);
        sheet.persisted_stride = Some(stride);
        sheet.row_count = row_count;

        let codec = RowCodec::new(&sheet.schema, stride);
        let mut buf = vec![0u8; stride];
        for row in 0..row_count {
            reader.align_to(8, "row padding")?;
            let row_start = reader.position();
            reader.read_exact(&mut buf, "row data")?;
            codec.decode_row(
                row as i32,
                &buf,
                row_start,
                &mut sheet.cells,
                chunk,
                &mut sheet.pending,
            )?;
        }

        debug!(
            "Read sheet {} ({} columns, {} rows, stride {})",
            sheet.name,
            sheet.schema.len(),
            row_count,
            stride
        );
        Ok(sheet)
    }

    /// Pull this sheet's variable-length values out of a fully read chunk table.
    ///
    /// Offsets the chunk section never resolved stay absent from `values`.
    pub fn apply_resolved_chunk(&mut self, chunk: &ChunkTable) {
        for (offset, cell) in self.pending.drain(..) {
            if let Some(value) = chunk.get(offset) {
                self.values.insert(cell, value.clone());
            }
        }
    }

    /// Encode the sheet, registering outgoing values in `chunk`
    pub fn write<W: Write>(&self, writer: &mut MbeWriter<W>, chunk: &mut ChunkTable) -> Result<()> {
        writer.align_to(8)?;
        writer.write_padded_string(&self.name)?;

        writer.write_len(self.schema.len())?;
        for kind in self.schema.kinds() {
            writer.write_u8(kind.tag())?;
        }

        let stride = self.row_stride();
        writer.write_len(stride)?;
        writer.write_len(self.row_count)?;

        let codec = RowCodec::new(&self.schema, stride);
        for row in 0..self.row_count {
            writer.align_to(8)?;
            let row_start = writer.position();
            let buf = codec.encode_row(row as i32, row_start, &self.cells, &self.values, chunk)?;
            writer.write_all(&buf)?;
        }

        debug!(
            "Wrote sheet {} ({} rows, stride {})",
            self.name, self.row_count, stride
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Row stride used for encoding: the stored one when the sheet came from a
    /// file, otherwise the computed one
    pub fn row_stride(&self) -> usize {
        let computed = self.schema.row_stride();
        self.persisted_stride.map_or(computed, |s| s.max(computed))
    }

    /// Numeric cells in row-major order
    pub fn cells(&self) -> &BTreeMap<Cell, i64> {
        &self.cells
    }

    /// Variable-length values in row-major order
    pub fn values(&self) -> &BTreeMap<Cell, ChunkValue> {
        &self.values
    }

    pub fn cell(&self, row: i32, column: i32) -> Option<i64> {
        self.cells.get(&Cell::new(row, column)).copied()
    }

    pub fn value(&self, row: i32, column: i32) -> Option<&ChunkValue> {
        self.values.get(&Cell::new(row, column))
    }

    /// Float column value, decoded from its bit pattern
    pub fn float(&self, row: i32, column: i32) -> Option<f32> {
        self.cell(row, column).map(cell_to_float)
    }

    /// Column kind at `cell`, or `SchemaCellMismatch` when out of range
    fn kind_at(&self, cell: Cell) -> Result<ColumnKind> {
        usize::try_from(cell.column)
            .ok()
            .and_then(|c| self.schema.kind(c))
            .filter(|_| cell.row >= 0)
            .ok_or(Error::SchemaCellMismatch {
                row: cell.row,
                column: cell.column,
            })
    }

    /// Set a numeric cell, growing the row count as needed.
    ///
    /// Values must fit the column kind. Bool stores 0 or 1, and Float columns
    /// take the raw bit pattern, which is rounded like a decoded float; use
    /// [`Sheet::set_float`] for a float value.
    pub fn set_cell(&mut self, row: i32, column: i32, value: i64) -> Result<()> {
        let cell = Cell::new(row, column);
        let kind = self.kind_at(cell)?;
        let value = normalize_cell(kind, value).ok_or_else(|| Error::InvalidCellValue {
            row,
            column,
            kind,
            text: value.to_string(),
        })?;
        self.cells.insert(cell, value);
        self.grow_to(row);
        Ok(())
    }

    pub fn set_float(&mut self, row: i32, column: i32, value: f32) -> Result<()> {
        self.set_cell(row, column, float_to_cell(value))
    }

    /// Set a String or IntArray value
    pub fn set_value(&mut self, row: i32, column: i32, value: ChunkValue) -> Result<()> {
        let cell = Cell::new(row, column);
        let kind = self.kind_at(cell)?;
        if kind.value_shape() != Some(value.shape()) {
            return Err(Error::SchemaCellMismatch { row, column });
        }
        self.cells.insert(cell, 0);
        self.values.insert(cell, value);
        self.grow_to(row);
        Ok(())
    }

    /// Row index the next appended row will use
    pub(crate) fn next_row(&self) -> i32 {
        self.cells
            .keys()
            .next_back()
            .map_or(0, |c| c.row + 1)
            .max(self.row_count as i32)
    }

    pub(crate) fn grow_to(&mut self, row: i32) {
        if row >= 0 {
            self.row_count = self.row_count.max(row as usize + 1);
        }
    }
}

/// Canonical cell value for `kind`, or `None` when it is out of range
fn normalize_cell(kind: ColumnKind, value: i64) -> Option<i64> {
    let value = match kind {
        ColumnKind::Bool => (value != 0) as i64,
        ColumnKind::Byte => i8::try_from(value).ok()? as i64,
        ColumnKind::Short => i16::try_from(value).ok()? as i64,
        ColumnKind::Int => i32::try_from(value).ok()? as i64,
        ColumnKind::Float => float_to_cell(cell_to_float(i32::try_from(value).ok()? as i64)),
        _ => 0,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Sheet {
        let schema = Schema::new(vec![
            ColumnKind::Int,
            ColumnKind::Bool,
            ColumnKind::String,
            ColumnKind::Float,
        ]);
        let mut sheet = Sheet::new("sample", schema);
        sheet.set_cell(0, 0, 42).unwrap();
        sheet.set_cell(0, 1, 1).unwrap();
        sheet.set_value(0, 2, ChunkValue::from("hello")).unwrap();
        sheet.set_float(0, 3, 1.5).unwrap();
        sheet.set_cell(1, 0, -7).unwrap();
        sheet.set_cell(1, 1, 0).unwrap();
        sheet.set_cell(1, 2, 0).unwrap();
        sheet.set_float(1, 3, -0.25).unwrap();
        sheet
    }

    #[test]
    fn test_write_then_read() {
        let sheet = sample();
        let mut chunk = ChunkTable::new();
        let mut writer = MbeWriter::new(Vec::new());
        sheet.write(&mut writer, &mut chunk).unwrap();
        chunk.write(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MbeReader::new(Cursor::new(bytes));
        let mut in_chunk = ChunkTable::new();
        let mut decoded = Sheet::read(&mut reader, &mut in_chunk).unwrap();
        assert_eq!(reader.read_i32("magic").unwrap(), crate::mbe::chunk::CHUNK_MAGIC);
        in_chunk.read(&mut reader).unwrap();
        decoded.apply_resolved_chunk(&in_chunk);

        assert_eq!(decoded.name(), "sample");
        assert_eq!(decoded.row_count(), 2);
        assert_eq!(decoded.cells(), sheet.cells());
        assert_eq!(decoded.value(0, 2), Some(&ChunkValue::from("hello")));
        // Never written, so never resolved
        assert_eq!(decoded.value(1, 2), None);
        assert_eq!(decoded.float(1, 3), Some(-0.25));
    }

    #[test]
    fn test_persisted_stride_is_trusted() {
        let mut sheet = Sheet::new("wide", Schema::new(vec![ColumnKind::Int]));
        sheet.set_cell(0, 0, 5).unwrap();
        sheet.set_cell(1, 0, 6).unwrap();
        sheet.persisted_stride = Some(16);

        let mut writer = MbeWriter::new(Vec::new());
        sheet.write(&mut writer, &mut ChunkTable::new()).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MbeReader::new(Cursor::new(bytes));
        let decoded = Sheet::read(&mut reader, &mut ChunkTable::new()).unwrap();
        assert_eq!(decoded.row_stride(), 16);
        assert_eq!(decoded.schema().row_stride(), 8);
        assert_eq!(decoded.cell(1, 0), Some(6));
    }

    #[test]
    fn test_unknown_column_tag() {
        let mut writer = MbeWriter::new(Vec::new());
        writer.write_padded_string("bad").unwrap();
        writer.write_i32(1).unwrap();
        writer.write_u8(0x42).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MbeReader::new(Cursor::new(bytes));
        assert!(matches!(
            Sheet::read(&mut reader, &mut ChunkTable::new()),
            Err(Error::UnknownColumnKind(_))
        ));
    }

    #[test]
    fn test_truncated_rows() {
        let sheet = sample();
        let mut writer = MbeWriter::new(Vec::new());
        sheet.write(&mut writer, &mut ChunkTable::new()).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 3);

        let mut reader = MbeReader::new(Cursor::new(bytes));
        assert!(matches!(
            Sheet::read(&mut reader, &mut ChunkTable::new()),
            Err(Error::TruncatedStream(_))
        ));
    }

    #[test]
    fn test_set_value_checks_kind() {
        let mut sheet = sample();
        assert!(sheet.set_value(0, 0, ChunkValue::from("x")).is_err());
        assert!(sheet.set_value(0, 2, ChunkValue::from(vec![1])).is_err());
        assert!(sheet.set_cell(0, 9, 1).is_err());
        assert!(sheet.set_cell(-1, 0, 1).is_err());
    }

    #[test]
    fn test_set_cell_checks_range() {
        let schema = Schema::new(vec![ColumnKind::Byte, ColumnKind::Bool, ColumnKind::Short]);
        let mut sheet = Sheet::new("range", schema);
        assert!(matches!(
            sheet.set_cell(0, 0, 300),
            Err(Error::InvalidCellValue { row: 0, column: 0, .. })
        ));
        assert!(sheet.set_cell(0, 2, -40000).is_err());
        sheet.set_cell(0, 0, -128).unwrap();
        sheet.set_cell(0, 1, 5).unwrap();
        sheet.set_cell(0, 2, 32767).unwrap();
        assert_eq!(sheet.cell(0, 1), Some(1));

        let mut writer = MbeWriter::new(Vec::new());
        sheet.write(&mut writer, &mut ChunkTable::new()).unwrap();
        let mut reader = MbeReader::new(Cursor::new(writer.into_inner()));
        let decoded = Sheet::read(&mut reader, &mut ChunkTable::new()).unwrap();
        assert_eq!(decoded.cells(), sheet.cells());
    }

    #[test]
    fn test_set_cell_rounds_float_bits() {
        let mut sheet = Sheet::new("f", Schema::new(vec![ColumnKind::Float]));
        sheet.set_cell(0, 0, 1.23456f32.to_bits() as i32 as i64).unwrap();
        assert_eq!(sheet.float(0, 0), Some(1.235));
        assert!(sheet.set_cell(0, 0, i64::MAX).is_err());
    }

    #[test]
    fn test_zero_stride_row_count_is_bounded() {
        let mut writer = MbeWriter::new(Vec::new());
        writer.write_padded_string("markers").unwrap();
        writer.write_i32(1).unwrap();
        writer.write_u8(ColumnKind::Empty.tag()).unwrap();
        writer.write_i32(0).unwrap();
        writer.write_i32(i32::MAX).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MbeReader::new(Cursor::new(bytes));
        assert!(matches!(
            Sheet::read(&mut reader, &mut ChunkTable::new()),
            Err(Error::InvalidLength { len: i32::MAX, .. })
        ));
    }

    #[test]
    fn test_small_zero_stride_sheet_still_reads() {
        let mut sheet = Sheet::new("markers", Schema::new(vec![ColumnKind::Empty]));
        for row in 0..3 {
            sheet.set_cell(row, 0, 0).unwrap();
        }
        let mut writer = MbeWriter::new(Vec::new());
        sheet.write(&mut writer, &mut ChunkTable::new()).unwrap();

        let mut reader = MbeReader::new(Cursor::new(writer.into_inner()));
        let decoded = Sheet::read(&mut reader, &mut ChunkTable::new()).unwrap();
        assert_eq!(decoded.row_count(), 3);
        assert_eq!(decoded.row_stride(), 0);
    }

    #[test]
    fn test_missing_cell_fails_write() {
        let mut sheet = Sheet::new("gap", Schema::new(vec![ColumnKind::Int, ColumnKind::Byte]));
        sheet.set_cell(0, 0, 1).unwrap();
        let mut writer = MbeWriter::new(Vec::new());
        assert!(matches!(
            sheet.write(&mut writer, &mut ChunkTable::new()),
            Err(Error::SchemaCellMismatch { row: 0, column: 1 })
        ));
    }
}
