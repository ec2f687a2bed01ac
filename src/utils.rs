//! General utility functions for mvlib
//!
//! File discovery and name filtering shared by the conversion helpers.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};

/// Format a file size in human-readable form (B, KB, MB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match size {
        s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
        s => format!("{} B", s),
    }
}

/// Create a glob matcher for relative paths or sheet names
///
/// - `*.mbe` becomes `**/*.mbe` (match in any directory)
/// - Plain text without wildcards becomes `**/*text*` (substring search)
pub fn create_glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.starts_with("*.") {
        format!("**/{}", pattern)
    } else if !pattern.contains(['*', '?', '[']) {
        format!("**/*{}*", pattern)
    } else {
        pattern.to_string()
    };

    let glob = Glob::new(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Check if a name matches the optional filter
pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    matcher.map_or(true, |m| m.is_match(name))
}

/// Check a file extension case-insensitively (`ext` without the dot)
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Recursively collect the files under `dir` with extension `ext`, sorted by path
pub fn collect_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files_recursive(dir, ext, &mut files)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    files.sort();
    Ok(files)
}

fn collect_files_recursive(dir: &Path, ext: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files_recursive(&path, ext, files)?;
        } else if has_extension(&path, ext) {
            files.push(path);
        }
    }
    Ok(())
}

/// `path` relative to `base` with forward slashes, for display and filtering
pub fn relative_name(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_glob_shorthands() {
        let ext = create_glob_matcher("*.mbe").unwrap();
        assert!(ext.is_match("data/item.mbe"));
        assert!(!ext.is_match("data/item.csv"));

        let substring = create_glob_matcher("item").unwrap();
        assert!(substring.is_match("data/shop_item_list.mbe"));
        assert!(matches_filter("anything", None));
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.mbe"), b"").unwrap();
        fs::write(dir.path().join("sub/a.MBE"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_files(dir.path(), "mbe").unwrap();
        let names: Vec<String> = files.iter().map(|f| relative_name(f, dir.path())).collect();
        assert_eq!(names, vec!["b.mbe", "sub/a.MBE"]);
    }
}
