//! Value types shared by the MBE codec

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A (row, column) position inside a sheet.
///
/// Ordering is row-major then column-major, so iterating a `BTreeMap<Cell, _>`
/// visits cells in the order rows are laid out in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: i32,
    pub column: i32,
}

impl Cell {
    pub fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Declared type of a schema column.
///
/// The discriminant is the one-byte tag stored in the sheet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnKind {
    IntArray = 0x0,
    Reserved = 0x1,
    Int = 0x2,
    Short = 0x3,
    Byte = 0x4,
    Float = 0x5,
    String3 = 0x6,
    String = 0x7,
    String2 = 0x8,
    Bool = 0x9,
    Empty = 0xA,
}

impl ColumnKind {
    pub const ALL: [ColumnKind; 11] = [
        ColumnKind::IntArray,
        ColumnKind::Reserved,
        ColumnKind::Int,
        ColumnKind::Short,
        ColumnKind::Byte,
        ColumnKind::Float,
        ColumnKind::String3,
        ColumnKind::String,
        ColumnKind::String2,
        ColumnKind::Bool,
        ColumnKind::Empty,
    ];

    /// Tag byte written to the sheet header
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Name used in CSV headers
    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::IntArray => "IntArray",
            ColumnKind::Reserved => "Reserved",
            ColumnKind::Int => "Int",
            ColumnKind::Short => "Short",
            ColumnKind::Byte => "Byte",
            ColumnKind::Float => "Float",
            ColumnKind::String3 => "String3",
            ColumnKind::String => "String",
            ColumnKind::String2 => "String2",
            ColumnKind::Bool => "Bool",
            ColumnKind::Empty => "Empty",
        }
    }

    /// Required start alignment of the field inside a row (0 for markers).
    ///
    /// Bool reports the alignment of its shared 32-bit word.
    pub fn alignment(self) -> usize {
        match self {
            ColumnKind::Empty | ColumnKind::Reserved => 0,
            ColumnKind::Byte => 1,
            ColumnKind::Short => 2,
            ColumnKind::Int | ColumnKind::Float | ColumnKind::Bool => 4,
            ColumnKind::String | ColumnKind::String2 | ColumnKind::String3 => 8,
            ColumnKind::IntArray => 8,
        }
    }

    /// Bytes consumed inline in a row.
    ///
    /// Bool reports the size of its shared 32-bit word; a run of up to 32
    /// Bool columns occupies one word.
    pub fn size(self) -> usize {
        match self {
            ColumnKind::Empty | ColumnKind::Reserved => 0,
            ColumnKind::Byte => 1,
            ColumnKind::Short => 2,
            ColumnKind::Int | ColumnKind::Float | ColumnKind::Bool => 4,
            ColumnKind::String | ColumnKind::String2 | ColumnKind::String3 => 8,
            ColumnKind::IntArray => 8,
        }
    }

    /// Zero-width columns whose cell value is always 0
    pub fn is_marker(self) -> bool {
        matches!(self, ColumnKind::Empty | ColumnKind::Reserved)
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            ColumnKind::String | ColumnKind::String2 | ColumnKind::String3
        )
    }

    /// Shape of the chunk payload for variable-length columns
    pub fn value_shape(self) -> Option<ValueShape> {
        match self {
            ColumnKind::IntArray => Some(ValueShape::IntArray),
            k if k.is_string() => Some(ValueShape::String),
            _ => None,
        }
    }

    pub fn is_variable(self) -> bool {
        self.value_shape().is_some()
    }

    /// Parse a CSV header cell such as `"Int 1"`, `"int32_4"` or `"Int Array 7"`.
    ///
    /// Only the leading token names the kind; the ordinal that follows is ignored.
    pub fn from_header(header: &str) -> Result<Self> {
        let mut tokens = header
            .split(|c: char| c.is_whitespace() || c == '_')
            .filter(|t| !t.is_empty());
        let first = tokens
            .next()
            .ok_or_else(|| Error::UnknownColumnKind(header.to_string()))?;

        if first.eq_ignore_ascii_case("int")
            && tokens
                .next()
                .is_some_and(|t| t.eq_ignore_ascii_case("array"))
        {
            return Ok(ColumnKind::IntArray);
        }

        first
            .parse()
            .map_err(|_| Error::UnknownColumnKind(header.to_string()))
    }
}

impl TryFrom<u8> for ColumnKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        ColumnKind::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or_else(|| Error::UnknownColumnKind(format!("tag 0x{:X}", tag)))
    }
}

impl FromStr for ColumnKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let kind = match lower.as_str() {
            "int32" => ColumnKind::Int,
            "int16" => ColumnKind::Short,
            "int8" => ColumnKind::Byte,
            other => ColumnKind::ALL
                .into_iter()
                .find(|k| k.name().eq_ignore_ascii_case(other))
                .ok_or_else(|| Error::UnknownColumnKind(s.to_string()))?,
        };
        Ok(kind)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload shape of a variable-length value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    String,
    IntArray,
}

/// A variable-length value stored in the chunk section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkValue {
    String(String),
    IntArray(Vec<i32>),
}

impl ChunkValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            ChunkValue::String(_) => ValueShape::String,
            ChunkValue::IntArray(_) => ValueShape::IntArray,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ChunkValue::String(s) => Some(s),
            ChunkValue::IntArray(_) => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            ChunkValue::String(_) => None,
            ChunkValue::IntArray(v) => Some(v),
        }
    }
}

impl From<&str> for ChunkValue {
    fn from(value: &str) -> Self {
        ChunkValue::String(value.to_string())
    }
}

impl From<String> for ChunkValue {
    fn from(value: String) -> Self {
        ChunkValue::String(value)
    }
}

impl From<Vec<i32>> for ChunkValue {
    fn from(value: Vec<i32>) -> Self {
        ChunkValue::IntArray(value)
    }
}

/// Round a float to 3 decimal digits, ties to even.
///
/// Applied on every binary read and every CSV parse so that text and binary
/// round trips settle on the same bit pattern.
pub fn round_float(value: f32) -> f32 {
    ((value as f64 * 1000.0).round_ties_even() / 1000.0) as f32
}

/// Store a float in the 64-bit cell map as its rounded bit pattern
pub fn float_to_cell(value: f32) -> i64 {
    round_float(value).to_bits() as i32 as i64
}

/// Recover a float from its cell representation
pub fn cell_to_float(value: i64) -> f32 {
    f32::from_bits(value as i32 as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ordering_is_row_major() {
        let mut cells = vec![Cell::new(1, 0), Cell::new(0, 2), Cell::new(0, 1)];
        cells.sort();
        assert_eq!(cells, vec![Cell::new(0, 1), Cell::new(0, 2), Cell::new(1, 0)]);
    }

    #[test]
    fn test_kind_from_tag() {
        assert_eq!(ColumnKind::try_from(0x2).unwrap(), ColumnKind::Int);
        assert_eq!(ColumnKind::try_from(0x0).unwrap(), ColumnKind::IntArray);
        assert_eq!(ColumnKind::try_from(0xA).unwrap(), ColumnKind::Empty);
        assert!(matches!(
            ColumnKind::try_from(0xB),
            Err(Error::UnknownColumnKind(_))
        ));
    }

    #[test]
    fn test_kind_from_header() {
        assert_eq!(ColumnKind::from_header("Int 1").unwrap(), ColumnKind::Int);
        assert_eq!(ColumnKind::from_header("bool_7").unwrap(), ColumnKind::Bool);
        assert_eq!(ColumnKind::from_header("int32 2").unwrap(), ColumnKind::Int);
        assert_eq!(ColumnKind::from_header("INT16 3").unwrap(), ColumnKind::Short);
        assert_eq!(ColumnKind::from_header("int8").unwrap(), ColumnKind::Byte);
        assert_eq!(
            ColumnKind::from_header("Int Array 4").unwrap(),
            ColumnKind::IntArray
        );
        assert_eq!(
            ColumnKind::from_header("intarray 4").unwrap(),
            ColumnKind::IntArray
        );
        assert_eq!(
            ColumnKind::from_header("String2 9").unwrap(),
            ColumnKind::String2
        );
        assert!(matches!(
            ColumnKind::from_header("Double 1"),
            Err(Error::UnknownColumnKind(_))
        ));
        assert!(ColumnKind::from_header("").is_err());
    }

    #[test]
    fn test_round_float() {
        assert_eq!(round_float(1.23456), 1.235);
        assert_eq!(round_float(0.1), 0.1);
        assert_eq!(round_float(-2.0004), -2.0);
        assert_eq!(cell_to_float(float_to_cell(3.14159)), 3.142);
    }

    #[test]
    fn test_negative_float_cell_is_sign_extended() {
        let cell = float_to_cell(-1.0);
        assert!(cell < 0);
        assert_eq!(cell_to_float(cell), -1.0);
    }
}
