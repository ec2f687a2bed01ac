//! Sheet diffs and container patches
//!
//! A diff is the sparse set of cells and values that differ between a
//! baseline sheet and a modified sheet of the same schema. Merging the diff
//! onto a copy of the baseline reproduces every cell and value the modified
//! sheet defines, which is how edits are distributed without shipping whole
//! files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Error, Result};
use crate::mbe::container::Mbe;
use crate::mbe::sheet::Sheet;
use crate::mbe::types::{Cell, ChunkValue};

/// Changed cells and values of one sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetDiff {
    #[serde(with = "cell_entries")]
    pub cells: BTreeMap<Cell, i64>,
    #[serde(with = "cell_entries")]
    pub values: BTreeMap<Cell, ChunkValue>,
}

impl SheetDiff {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.values.is_empty()
    }

    /// Total number of changed entries
    pub fn len(&self) -> usize {
        self.cells.len() + self.values.len()
    }
}

impl Sheet {
    /// Cells and values of `modified` that are missing from or differ in `self`
    pub fn generate_diff(&self, modified: &Sheet) -> Result<SheetDiff> {
        if self.schema != modified.schema {
            return Err(Error::SchemaMismatch(format!(
                "sheet {} and sheet {} have different columns",
                self.name, modified.name
            )));
        }

        let cells = modified
            .cells
            .iter()
            .filter(|(cell, value)| self.cells.get(*cell) != Some(*value))
            .map(|(cell, value)| (*cell, *value))
            .collect();
        let values = modified
            .values
            .iter()
            .filter(|(cell, value)| self.values.get(*cell) != Some(*value))
            .map(|(cell, value)| (*cell, value.clone()))
            .collect();

        Ok(SheetDiff { cells, values })
    }

    /// Overwrite the cells and values named by `diff`, leaving the rest untouched
    pub fn merge_diff(&mut self, diff: &SheetDiff) -> Result<()> {
        for (cell, value) in &diff.cells {
            self.set_cell(cell.row, cell.column, *value)?;
        }
        for (cell, value) in &diff.values {
            self.set_value(cell.row, cell.column, value.clone())?;
        }
        Ok(())
    }
}

/// Diff of one named sheet inside a patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetPatch {
    pub sheet: String,
    pub diff: SheetDiff,
}

/// Set of sheet diffs for a whole MBE container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MbePatch {
    pub sheets: Vec<SheetPatch>,
}

impl MbePatch {
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

impl Mbe {
    /// Diff every sheet of `modified` against the same-named sheet of `self`.
    ///
    /// Sheets with no changes are left out. Sheets that only exist in
    /// `modified` cannot be expressed as a diff and are skipped.
    pub fn generate_patch(&self, modified: &Mbe) -> Result<MbePatch> {
        let mut sheets = Vec::new();
        for target in modified.sheets() {
            let Some(base) = self.sheet(target.name()) else {
                warn!("Sheet {} has no baseline; not included in patch", target.name());
                continue;
            };
            let diff = base.generate_diff(target)?;
            if !diff.is_empty() {
                sheets.push(SheetPatch {
                    sheet: base.name().to_string(),
                    diff,
                });
            }
        }
        Ok(MbePatch { sheets })
    }

    /// Merge every sheet diff of `patch` into the matching sheet.
    ///
    /// Nothing is changed unless every diff applies.
    pub fn apply_patch(&mut self, patch: &MbePatch) -> Result<()> {
        let mut patched: Vec<Sheet> = Vec::with_capacity(patch.sheets.len());
        for entry in &patch.sheets {
            let staged = patched
                .iter()
                .position(|s| s.name().eq_ignore_ascii_case(&entry.sheet));
            let sheet = match staged {
                Some(idx) => &mut patched[idx],
                None => {
                    let original = self
                        .sheet(&entry.sheet)
                        .ok_or_else(|| Error::SheetNotFound(entry.sheet.clone()))?;
                    patched.push(original.clone());
                    let last = patched.len() - 1;
                    &mut patched[last]
                }
            };
            sheet.merge_diff(&entry.diff)?;
        }

        for sheet in patched {
            self.insert_sheet(sheet);
        }
        Ok(())
    }
}

/// Serialize a cell-keyed map as a list of `[cell, value]` pairs, since JSON
/// object keys must be strings
mod cell_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    use crate::mbe::types::Cell;

    pub fn serialize<S, V>(map: &BTreeMap<Cell, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<Cell, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let entries = Vec::<(Cell, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
