//! CSV transcoding for sheets
//!
//! The first CSV record is the schema header (`"<Kind> <ordinal>"` per
//! column); every following record is one data row.
//!
//! | Kind                | Emitted as                         | Parsed from                         |
//! |---------------------|------------------------------------|-------------------------------------|
//! | Bool                | `true` / `false`                   | `true`/`false`, or a leading digit  |
//! | Byte, Short, Int    | decimal integer                    | decimal integer                     |
//! | Float               | shortest decimal of rounded value  | decimal, rounded to 3 places        |
//! | String*, IntArray   | resolved value (ints space-joined) | verbatim text / whitespace-split    |
//! | Empty, Reserved     | resolved value if any, else empty  | ignored                             |
//!
//! Empty text in a numeric, Bool or Float column reads as 0.

use std::path::Path;

use crate::error::{Error, Result};
use crate::mbe::layout::Schema;
use crate::mbe::sheet::Sheet;
use crate::mbe::types::{cell_to_float, float_to_cell, round_float, Cell, ChunkValue, ColumnKind};

/// Options for reading and writing sheet CSV
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: u8,
    /// Terminate records with `\r\n` instead of `\n`
    pub crlf: bool,
    /// Trim one leftover layer of surrounding `"` from String cells after
    /// standard CSV unquoting
    pub legacy_quotes: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            crlf: false,
            legacy_quotes: false,
        }
    }
}

impl CsvOptions {
    fn reader<'a>(&self, text: &'a str, has_headers: bool) -> csv::Reader<&'a [u8]> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(text.as_bytes())
    }

    fn writer(&self) -> csv::Writer<Vec<u8>> {
        let terminator = if self.crlf {
            csv::Terminator::CRLF
        } else {
            csv::Terminator::Any(b'\n')
        };
        csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(terminator)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(Vec::new())
    }
}

impl Sheet {
    /// Build a sheet from CSV text with default options
    pub fn from_csv(name: impl Into<String>, text: &str) -> Result<Self> {
        Self::from_csv_with_options(name, text, &CsvOptions::default())
    }

    pub fn from_csv_with_options(
        name: impl Into<String>,
        text: &str,
        options: &CsvOptions,
    ) -> Result<Self> {
        let mut reader = options.reader(text, true);
        let kinds = reader
            .headers()?
            .iter()
            .map(ColumnKind::from_header)
            .collect::<Result<Vec<_>>>()?;

        let mut sheet = Sheet::new(name, Schema::new(kinds));
        for record in reader.records() {
            sheet.append_record(&record?, options)?;
        }
        Ok(sheet)
    }

    /// Load a CSV file; the sheet is named after the file stem
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_csv_file_with_options(path, &CsvOptions::default())
    }

    pub fn from_csv_file_with_options<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;
        Self::from_csv_with_options(name, &text, options)
    }

    /// Append header-less CSV rows after the last existing row
    pub fn append_csv(&mut self, text: &str) -> Result<()> {
        self.append_csv_with_options(text, &CsvOptions::default())
    }

    pub fn append_csv_with_options(&mut self, text: &str, options: &CsvOptions) -> Result<()> {
        let mut reader = options.reader(text, false);
        for record in reader.records() {
            self.append_record(&record?, options)?;
        }
        Ok(())
    }

    /// Append one row given as already split cell texts
    pub fn append_row<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let record: csv::StringRecord = fields.into_iter().collect();
        self.append_record(&record, &CsvOptions::default())
    }

    fn append_record(&mut self, record: &csv::StringRecord, options: &CsvOptions) -> Result<()> {
        let row = self.next_row();
        let expected = self.schema.len();
        if record.len() > expected {
            return Err(Error::ColumnCountMismatch {
                row,
                expected,
                found: record.len(),
            });
        }

        for (column, &kind) in self.schema.kinds().iter().enumerate() {
            let cell = Cell::new(row, column as i32);
            let text = record.get(column).unwrap_or("");
            let (value, resolved) = parse_cell(kind, text, cell, options)?;
            self.cells.insert(cell, value);
            if let Some(resolved) = resolved {
                self.values.insert(cell, resolved);
            }
        }
        self.grow_to(row);
        Ok(())
    }

    /// Render the sheet as CSV text with default options
    pub fn to_csv(&self) -> Result<String> {
        self.to_csv_with_options(&CsvOptions::default())
    }

    pub fn to_csv_with_options(&self, options: &CsvOptions) -> Result<String> {
        let mut writer = options.writer();
        writer.write_record(self.schema.header())?;

        let mut fields = Vec::with_capacity(self.schema.len());
        for row in 0..self.row_count as i32 {
            fields.clear();
            for (column, &kind) in self.schema.kinds().iter().enumerate() {
                let cell = Cell::new(row, column as i32);
                fields.push(format_cell(
                    kind,
                    self.cells.get(&cell).copied().unwrap_or(0),
                    self.values.get(&cell),
                ));
            }
            writer.write_record(&fields)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Render one cell as CSV text
pub fn format_cell(kind: ColumnKind, value: i64, resolved: Option<&ChunkValue>) -> String {
    match kind {
        ColumnKind::Bool => (if value == 0 { "false" } else { "true" }).to_string(),
        ColumnKind::Byte | ColumnKind::Short | ColumnKind::Int => value.to_string(),
        ColumnKind::Float => round_float(cell_to_float(value)).to_string(),
        _ => match resolved {
            Some(ChunkValue::String(s)) => s.clone(),
            Some(ChunkValue::IntArray(ints)) => ints
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        },
    }
}

/// Parse one CSV cell into its numeric value and, for variable-length
/// columns, its resolved value
pub fn parse_cell(
    kind: ColumnKind,
    text: &str,
    cell: Cell,
    options: &CsvOptions,
) -> Result<(i64, Option<ChunkValue>)> {
    let invalid = || Error::InvalidCellValue {
        row: cell.row,
        column: cell.column,
        kind,
        text: text.to_string(),
    };

    let numeric = match text.trim() {
        "" => "0",
        trimmed => trimmed,
    };

    let parsed = match kind {
        ColumnKind::Bool => {
            let value = match numeric.chars().next() {
                Some(c) if c.is_ascii_digit() => c == '1',
                _ if numeric.eq_ignore_ascii_case("true") => true,
                _ if numeric.eq_ignore_ascii_case("false") => false,
                _ => return Err(invalid()),
            };
            (value as i64, None)
        }
        ColumnKind::Byte => (numeric.parse::<i8>().map_err(|_| invalid())? as i64, None),
        ColumnKind::Short => (numeric.parse::<i16>().map_err(|_| invalid())? as i64, None),
        ColumnKind::Int => (numeric.parse::<i32>().map_err(|_| invalid())? as i64, None),
        ColumnKind::Float => {
            let value = numeric.parse::<f32>().map_err(|_| invalid())?;
            (float_to_cell(value), None)
        }
        ColumnKind::IntArray => {
            let ints = text
                .split_whitespace()
                .map(|t| t.parse::<i32>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>>>()?;
            (0, Some(ChunkValue::IntArray(ints)))
        }
        k if k.is_string() => {
            let value = if options.legacy_quotes {
                trim_one_quote(text)
            } else {
                text
            };
            (0, Some(ChunkValue::String(value.to_string())))
        }
        _ => (0, None),
    };
    Ok(parsed)
}

/// Strip one layer of surrounding quotes, including an unbalanced one
fn trim_one_quote(text: &str) -> &str {
    let text = text.strip_prefix('"').unwrap_or(text);
    text.strip_suffix('"').unwrap_or(text)
}
