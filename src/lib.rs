//! # mvlib
//!
//! A Rust library for reading, writing and editing `.mbe` binary table files.
//!
//! ## Overview
//!
//! MBE files store game configuration data as named sheets of typed columns.
//! This library provides:
//!
//! - Bit-exact decoding and encoding of MBE containers
//! - Lossless conversion of sheets to and from CSV
//! - Sparse diffs between sheets and JSON patches between containers
//!
//! ## Example - Reading
//!
//! ```rust,no_run
//! use mvlib::Mbe;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mbe = Mbe::open("item.mbe")?;
//!
//!     for sheet in mbe.sheets() {
//!         println!("{} ({} rows)", sheet.name(), sheet.row_count());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Patching
//!
//! ```rust,no_run
//! use mvlib::Mbe;
//!
//! fn main() -> anyhow::Result<()> {
//!     let base = Mbe::open("item.mbe")?;
//!     let modified = Mbe::open("item_modified.mbe")?;
//!
//!     let patch = base.generate_patch(&modified)?;
//!
//!     let mut target = Mbe::open("item.mbe")?;
//!     target.apply_patch(&patch)?;
//!     target.save("item_patched.mbe")?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mbe;
pub mod utils;

pub use error::{Error, Result};
pub use mbe::{Cell, ChunkValue, ColumnKind, CsvOptions, Mbe, MbePatch, Schema, Sheet, SheetDiff};
pub use utils::{collect_files, create_glob_matcher, format_size, matches_filter};
