//! C3: Context Gatherer.
//!
//! Walks the run's root paths, keeps files matching the include globs and
//! not matching the exclude globs, and reads each as UTF-8. Grounded on the
//! "walk paths, filter, collect" shape used throughout the pack for file
//! collection utilities, adapted to `walkdir` + `globset` for glob
//! filtering instead of hand-rolled pattern matching.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct GatherStats {
    pub files_included: usize,
    pub files_skipped: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GatheredFile {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GatherResult {
    pub files: Vec<GatheredFile>,
    pub stats: GatherStats,
}

#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, GatherError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| GatherError::InvalidGlob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| GatherError::InvalidGlob {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

/// Walk `roots`, keep regular files matching `include` (or every file if
/// `include` is empty) and not matching `exclude`, read each as UTF-8. Files
/// that fail to decode as UTF-8 are counted as skipped rather than failing
/// the whole gather. Output is sorted by relative-to-root path so identical
/// input trees always produce identical prompt bytes.
pub fn gather(roots: &[PathBuf], include: &[String], exclude: &[String]) -> Result<GatherResult, GatherError> {
    let include_set = build_globset(include)?;
    let exclude_set = build_globset(exclude)?;

    let mut entries: Vec<(PathBuf, PathBuf)> = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

            if !include.is_empty() && !include_set.is_match(&relative) {
                continue;
            }
            if !exclude.is_empty() && exclude_set.is_match(&relative) {
                continue;
            }
            entries.push((relative, path));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut stats = GatherStats::default();
    let mut files = Vec::with_capacity(entries.len());

    for (_, path) in entries {
        match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => {
                    stats.files_included += 1;
                    stats.total_bytes += content.len() as u64;
                    files.push(GatheredFile { path, content });
                }
                Err(_) => {
                    tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
                    stats.files_skipped += 1;
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                stats.files_skipped += 1;
            }
        }
    }

    Ok(GatherResult { files, stats })
}

#[allow(dead_code)]
fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn gathers_and_sorts_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b.txt", "b");
        write_file(dir.path(), "a.txt", "a");
        write_file(dir.path(), "sub/c.txt", "c");

        let result = gather(&[dir.path().to_path_buf()], &[], &[]).unwrap();
        let names: Vec<String> = result
            .files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string(), "sub/c.txt".replace('\\', "/")]);
        assert_eq!(result.stats.files_included, 3);
        assert_eq!(result.stats.files_skipped, 0);
    }

    #[test]
    fn include_glob_restricts_to_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "main.rs", "fn main() {}");
        write_file(dir.path(), "readme.md", "hi");

        let result = gather(&[dir.path().to_path_buf()], &["*.rs".to_string()], &[]).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("main.rs"));
    }

    #[test]
    fn exclude_glob_removes_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "keep.rs", "fn a() {}");
        write_file(dir.path(), "skip.rs", "fn b() {}");

        let result = gather(&[dir.path().to_path_buf()], &[], &["skip.rs".to_string()]).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("keep.rs"));
    }

    #[test]
    fn non_utf8_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("binary.bin"), [0xff, 0xfe, 0x00, 0xff]).unwrap();
        write_file(dir.path(), "text.txt", "hello");

        let result = gather(&[dir.path().to_path_buf()], &[], &[]).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.stats.files_skipped, 1);
    }

    #[test]
    fn invalid_glob_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = gather(&[dir.path().to_path_buf()], &["[".to_string()], &[]);
        assert!(result.is_err());
    }
}
