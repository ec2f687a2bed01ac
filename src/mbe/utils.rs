//! MBE utility functions
//!
//! File-level conversions between MBE containers, CSV sheets and JSON patches.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

use super::{CsvOptions, Mbe, MbePatch, Sheet};
use crate::utils::{collect_files, create_glob_matcher, format_size, matches_filter, relative_name};

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn open_mbe(path: &Path) -> Result<Mbe> {
    Mbe::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Sheet names can contain characters that are not valid in file names
fn csv_file_name(sheet: &str) -> String {
    let name: String = sheet
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{}.csv", name)
}

/// Display MBE file information
pub fn show_mbe_info(mbe_path: &Path) -> Result<()> {
    let size = fs::metadata(mbe_path)
        .with_context(|| format!("Failed to read {}", mbe_path.display()))?
        .len();
    let mbe = open_mbe(mbe_path)?;

    println!("MBE Info: {}", mbe_path.display());
    println!("  File size: {}", format_size(size));
    println!("  Sheets: {}", mbe.len());
    println!("  Chunk entries: {}", mbe.chunk_len());

    for sheet in mbe.sheets() {
        println!();
        println!("  [{}]", sheet.name());
        println!(
            "    Rows: {}, row stride: {} bytes",
            sheet.row_count(),
            sheet.row_stride()
        );
        println!("    Columns: {}", sheet.schema().header().join(", "));
    }

    Ok(())
}

fn write_sheets(mbe: &Mbe, output_dir: &Path, options: &CsvOptions) -> Result<usize> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut count = 0;
    for sheet in mbe.sheets() {
        let out_path = output_dir.join(csv_file_name(sheet.name()));
        let text = sheet
            .to_csv_with_options(options)
            .with_context(|| format!("Failed to convert sheet {}", sheet.name()))?;
        fs::write(&out_path, text)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        count += 1;
    }
    Ok(count)
}

/// Export every sheet of an MBE file to `<output>/<sheet>.csv`
///
/// The output directory defaults to the MBE path without its extension.
pub fn export_csv(mbe_path: &Path, output: Option<&Path>, options: &CsvOptions) -> Result<usize> {
    let output_dir = output
        .map(PathBuf::from)
        .unwrap_or_else(|| mbe_path.with_extension(""));

    let mbe = open_mbe(mbe_path)?;
    let count = write_sheets(&mbe, &output_dir, options)?;

    println!(
        "Exported {} sheets from {} to {}",
        count,
        mbe_path.display(),
        output_dir.display()
    );
    Ok(count)
}

/// Export every `.mbe` file under `input_dir`, mirroring the directory layout
///
/// Each MBE becomes a directory of CSV files. Files that fail to convert are
/// reported and skipped.
pub fn export_dir(
    input_dir: &Path,
    output_dir: &Path,
    filter: Option<&str>,
    options: &CsvOptions,
) -> Result<()> {
    let matcher = filter.map(create_glob_matcher).transpose()?;
    let files: Vec<PathBuf> = collect_files(input_dir, "mbe")?
        .into_iter()
        .filter(|f| matches_filter(&relative_name(f, input_dir), matcher.as_ref()))
        .collect();

    println!(
        "Exporting {} MBE files from {} to {}...",
        files.len(),
        input_dir.display(),
        output_dir.display()
    );
    let pb = progress_bar(files.len() as u64)?;

    let mut sheets = 0usize;
    let mut failed = 0u64;

    for file in &files {
        pb.inc(1);

        let relative = file.strip_prefix(input_dir).unwrap_or(file);
        let target = output_dir.join(relative).with_extension("");
        match open_mbe(file).and_then(|mbe| write_sheets(&mbe, &target, options)) {
            Ok(count) => sheets += count,
            Err(e) => {
                eprintln!("Warning: Failed to export {}: {:#}", file.display(), e);
                failed += 1;
            }
        }
    }

    pb.finish_with_message("Done");
    println!(
        "\nExported {} sheets from {} files ({} failed)",
        sheets,
        files.len() as u64 - failed,
        failed
    );

    Ok(())
}

/// Build an MBE file from CSV files
///
/// Directories in `inputs` contribute every `.csv` file below them. Each CSV
/// becomes a sheet named after its file stem. With a `base` MBE, sheets of
/// the same name are replaced in place and all other base sheets are kept.
pub fn import_csv(
    inputs: &[PathBuf],
    base: Option<&Path>,
    output: &Path,
    options: &CsvOptions,
) -> Result<usize> {
    let mut mbe = match base {
        Some(path) => open_mbe(path)?,
        None => Mbe::new(),
    };

    let mut csv_files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            csv_files.extend(collect_files(input, "csv")?);
        } else {
            csv_files.push(input.clone());
        }
    }

    for path in &csv_files {
        let sheet = Sheet::from_csv_file_with_options(path, options)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let name = sheet.name().to_string();
        if mbe.insert_sheet(sheet).is_some() {
            println!("  Replaced sheet {}", name);
        } else {
            println!("  Added sheet {}", name);
        }
    }

    mbe.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Saved {} sheets to {} ({} imported)",
        mbe.len(),
        output.display(),
        csv_files.len()
    );

    Ok(csv_files.len())
}

/// Write the JSON patch turning `base_path` into `modified_path`
///
/// Returns the number of changed sheets.
pub fn write_patch(base_path: &Path, modified_path: &Path, output: &Path) -> Result<usize> {
    let base = open_mbe(base_path)?;
    let modified = open_mbe(modified_path)?;

    let patch = base
        .generate_patch(&modified)
        .context("Failed to diff MBE files")?;
    let json = serde_json::to_string_pretty(&patch)?;
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;

    let changes: usize = patch.sheets.iter().map(|s| s.diff.len()).sum();
    println!(
        "Wrote patch with {} changes in {} sheets to {}",
        changes,
        patch.sheets.len(),
        output.display()
    );
    Ok(patch.sheets.len())
}

/// Apply a JSON patch to an MBE file
///
/// The result is written to `output`, or back to `mbe_path` when none is given.
pub fn apply_patch_file(mbe_path: &Path, patch_path: &Path, output: Option<&Path>) -> Result<()> {
    let json = fs::read_to_string(patch_path)
        .with_context(|| format!("Failed to read {}", patch_path.display()))?;
    let patch: MbePatch = serde_json::from_str(&json)
        .with_context(|| format!("Invalid patch file {}", patch_path.display()))?;

    let mut mbe = open_mbe(mbe_path)?;
    mbe.apply_patch(&patch).context("Failed to apply patch")?;

    let output = output.unwrap_or(mbe_path);
    mbe.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Patched {} sheets into {}",
        patch.sheets.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ITEMS: &str = "Int 1,String 2,Float 3,IntArray 4\n1,sword,1.5,1 2\n2,shield,0.25,\n";
    const SHOPS: &str = "Short 1,Bool 2\n7,true\n";

    fn sample(dir: &Path) -> PathBuf {
        let mut mbe = Mbe::new();
        mbe.insert_sheet(Sheet::from_csv("Items", ITEMS).unwrap());
        mbe.insert_sheet(Sheet::from_csv("Shops", SHOPS).unwrap());
        let path = dir.join("data.mbe");
        mbe.save(&path).unwrap();
        path
    }

    #[test]
    fn test_csv_file_name() {
        assert_eq!(csv_file_name("a/b:c"), "a_b_c.csv");
        assert_eq!(csv_file_name("Items"), "Items.csv");
    }

    #[test]
    fn test_export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let mbe_path = sample(dir.path());
        show_mbe_info(&mbe_path).unwrap();

        let out = dir.path().join("csv");
        let count = export_csv(&mbe_path, Some(&out), &CsvOptions::default()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(out.join("Items.csv")).unwrap(), ITEMS);

        let rebuilt = dir.path().join("rebuilt.mbe");
        import_csv(&[out], None, &rebuilt, &CsvOptions::default()).unwrap();
        let mbe = Mbe::open(&rebuilt).unwrap();
        assert_eq!(mbe.sheet_names().collect::<Vec<_>>(), vec!["Items", "Shops"]);
        assert_eq!(mbe.sheet("items").unwrap().to_csv().unwrap(), ITEMS);
    }

    #[test]
    fn test_import_replaces_base_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let mbe_path = sample(dir.path());
        let csv_path = dir.path().join("Items.csv");
        fs::write(&csv_path, "Int 1\n99\n").unwrap();

        let output = dir.path().join("out.mbe");
        import_csv(&[csv_path], Some(&mbe_path), &output, &CsvOptions::default()).unwrap();

        let mbe = Mbe::open(&output).unwrap();
        assert_eq!(mbe.sheet_names().collect::<Vec<_>>(), vec!["Items", "Shops"]);
        assert_eq!(mbe.sheet("Items").unwrap().cell(0, 0), Some(99));
        assert_eq!(mbe.sheet("Shops").unwrap().to_csv().unwrap(), SHOPS);
    }

    #[test]
    fn test_export_dir_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("nested")).unwrap();
        sample(&input);
        sample(&input.join("nested"));
        fs::write(input.join("broken.mbe"), b"nope").unwrap();

        let output = dir.path().join("out");
        export_dir(&input, &output, Some("nested/*"), &CsvOptions::default()).unwrap();
        assert!(output.join("nested/data/Shops.csv").exists());
        assert!(!output.join("data").exists());

        // Unreadable files are skipped, not fatal
        export_dir(&input, &output, None, &CsvOptions::default()).unwrap();
        assert!(output.join("data/Items.csv").exists());
    }

    #[test]
    fn test_patch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = sample(dir.path());

        let mut modified = Mbe::open(&base_path).unwrap();
        modified
            .sheet_mut("Items")
            .unwrap()
            .append_row(["3", "bow", "2.125", "4"])
            .unwrap();
        modified.sheet_mut("Shops").unwrap().set_cell(0, 0, 8).unwrap();
        let modified_path = dir.path().join("modified.mbe");
        modified.save(&modified_path).unwrap();

        let patch_path = dir.path().join("patch.json");
        assert_eq!(write_patch(&base_path, &modified_path, &patch_path).unwrap(), 2);

        let patched = dir.path().join("patched.mbe");
        apply_patch_file(&base_path, &patch_path, Some(&patched)).unwrap();
        assert_eq!(fs::read(&patched).unwrap(), fs::read(&modified_path).unwrap());
    }
}
