//! MBE container: the top-level binary framing around a set of sheets
//!
//! ```text
//! int32 "EXPA"
//! int32 sheet count
//! sheet × count      (each 8-byte aligned)
//! align 8
//! chunk section      ("CHNK" table, a single zero, or nothing at all)
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mbe::chunk::{ChunkTable, CHUNK_MAGIC};
use crate::mbe::io::{MbeReader, MbeWriter};
use crate::mbe::sheet::Sheet;

/// Magic number at the start of every MBE blob ("EXPA")
pub const EXPA_MAGIC: i32 = 0x41505845;

/// An ordered set of sheets with case-insensitive name lookup.
///
/// The chunk table only lives for one read or write pass; between passes the
/// variable-length values are held by their sheets.
#[derive(Debug, Clone, Default)]
pub struct Mbe {
    sheets: Vec<Sheet>,
}

impl Mbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an MBE file
    ///
    /// # Example
    /// ```no_run
    /// use mvlib::mbe::Mbe;
    /// let mbe = Mbe::open("item.mbe")?;
    /// for name in mbe.sheet_names() {
    ///     println!("{}", name);
    /// }
    /// # Ok::<(), mvlib::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(Cursor::new(bytes))
    }

    /// Decode a container from a stream positioned at the start of an MBE blob
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        let mut reader = MbeReader::new(reader);

        let magic = reader.read_i32("magic")?;
        if magic != EXPA_MAGIC {
            return Err(Error::MalformedHeader(format!(
                "expected magic {:#010x}, found {:#010x}",
                EXPA_MAGIC, magic
            )));
        }

        let sheet_count = reader.read_len("sheet count")?;
        let mut chunk = ChunkTable::new();
        let mut sheets = Vec::with_capacity(sheet_count.min(1 << 10));
        for _ in 0..sheet_count {
            sheets.push(Sheet::read(&mut reader, &mut chunk)?);
        }

        match Self::read_chunk_tag(&mut reader)? {
            Some(CHUNK_MAGIC) => chunk.read(&mut reader)?,
            Some(0) => debug!("Empty chunk section"),
            Some(tag) => warn!("Unknown chunk section tag {:#010x}; ignoring it", tag),
            None => debug!("No chunk section"),
        }

        for sheet in &mut sheets {
            sheet.apply_resolved_chunk(&chunk);
        }

        debug!(
            "Read MBE with {} sheets and {} chunk entries",
            sheets.len(),
            chunk.resolved_len()
        );
        Ok(Self { sheets })
    }

    /// Tag opening the chunk section, or `None` when the stream ends first
    fn read_chunk_tag<R: Read>(reader: &mut MbeReader<R>) -> Result<Option<i32>> {
        let tag = reader
            .align_to(8, "chunk section padding")
            .and_then(|_| reader.read_i32("chunk section tag"));
        match tag {
            Ok(tag) => Ok(Some(tag)),
            Err(Error::TruncatedStream(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encode the container.
    ///
    /// Chunk offsets are recomputed from scratch on every write.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = MbeWriter::new(writer);
        writer.write_i32(EXPA_MAGIC)?;
        writer.write_len(self.sheets.len())?;

        let mut chunk = ChunkTable::new();
        for sheet in &self.sheets {
            sheet.write(&mut writer, &mut chunk)?;
        }

        writer.align_to(8)?;
        chunk.write(&mut writer)?;
        writer.flush()?;

        debug!(
            "Wrote MBE with {} sheets ({} bytes)",
            self.sheets.len(),
            writer.position()
        );
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    /// Write the container to a file, replacing it if it exists
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write(BufWriter::new(file))
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Sheets in file order
    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter()
    }

    pub fn sheets_mut(&mut self) -> impl Iterator<Item = &mut Sheet> {
        self.sheets.iter_mut()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name())
    }

    /// Add a sheet, replacing any sheet with the same name in place.
    ///
    /// Returns the replaced sheet, if there was one.
    pub fn insert_sheet(&mut self, sheet: Sheet) -> Option<Sheet> {
        match self
            .sheets
            .iter()
            .position(|s| s.name().eq_ignore_ascii_case(sheet.name()))
        {
            Some(idx) => Some(std::mem::replace(&mut self.sheets[idx], sheet)),
            None => {
                self.sheets.push(sheet);
                None
            }
        }
    }

    pub fn remove_sheet(&mut self, name: &str) -> Option<Sheet> {
        let idx = self
            .sheets
            .iter()
            .position(|s| s.name().eq_ignore_ascii_case(name))?;
        Some(self.sheets.remove(idx))
    }

    /// Number of entries the chunk section will hold on the next write
    pub fn chunk_len(&self) -> usize {
        self.sheets.iter().map(|s| s.values().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}
