//! MBE binary table format
//!
//! An MBE file is a container of named sheets. Every sheet has a fixed
//! schema of typed columns and stores its rows as fixed-stride, aligned
//! records. String and int-array cells hold an 8-byte placeholder in the row;
//! their payloads live in a chunk section at the end of the file, keyed by
//! the absolute offset of the placeholder.
//!
//! ## Format Overview
//!
//! - Header: magic `"EXPA"` and sheet count
//! - Sheets: name, column kind tags, row stride, row count, rows
//! - Chunk section: `"CHNK"`, entry count, `(offset, payload)` pairs
//!
//! Sheets convert losslessly to and from CSV, with the schema encoded in the
//! header row, and two sheets of the same schema can be diffed and merged.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mvlib::mbe::{Mbe, Sheet};
//!
//! let mut mbe = Mbe::open("item.mbe")?;
//! if let Some(sheet) = mbe.sheet("Item") {
//!     println!("{}", sheet.to_csv()?);
//! }
//!
//! let edited = Sheet::from_csv("Item", "Int 1,String 2\n1,sword\n")?;
//! mbe.insert_sheet(edited);
//! mbe.save("item_edited.mbe")?;
//! # Ok::<(), mvlib::Error>(())
//! ```

mod chunk;
mod container;
mod csv;
mod diff;
pub mod io;
mod layout;
mod sheet;
mod types;
pub mod utils;

pub use chunk::{ChunkTable, CHUNK_MAGIC};
pub use container::{Mbe, EXPA_MAGIC};
pub use self::csv::{format_cell, parse_cell, CsvOptions};
pub use diff::{MbePatch, SheetDiff, SheetPatch};
pub use io::{MbeReader, MbeWriter};
pub use layout::{FieldSlot, RowCodec, Schema};
pub use sheet::Sheet;
pub use types::{cell_to_float, float_to_cell, round_float, Cell, ChunkValue, ColumnKind, ValueShape};
pub use utils::{apply_patch_file, export_csv, export_dir, import_csv, show_mbe_info, write_patch};
