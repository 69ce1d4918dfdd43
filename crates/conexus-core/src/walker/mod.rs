//! Deterministic directory traversal honoring ignore patterns and size caps.
//!
//! Traversal is depth-first and lexicographic so that two runs over
//! unchanged bytes produce identical `walk()` output -- the indexer relies
//! on this for "file order" guarantees in its pipeline invariants.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::IndexingConfig;
use crate::error::{ConexusError, ConexusResult};

/// VCS and similar directories skipped regardless of configured patterns.
const ALWAYS_IGNORED_DIRS: &[&str] = &[".git", ".hg", ".svn", ".conexus"];

/// The Walker's recognized option set (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Glob patterns; any match excludes the path.
    pub ignore_patterns: Vec<String>,
    /// Files exceeding this are skipped (not errored).
    pub max_file_size: u64,
    /// When false, symlinks are skipped.
    pub follow_symlinks: bool,
    /// Optional allowlist of extensions (without leading dot). Empty means
    /// accept all text-like extensions.
    pub allowed_extensions: Vec<String>,
}

impl From<&IndexingConfig> for WalkOptions {
    fn from(cfg: &IndexingConfig) -> Self {
        Self {
            ignore_patterns: cfg.ignore_patterns.clone(),
            max_file_size: cfg.max_file_size,
            follow_symlinks: cfg.follow_symlinks,
            allowed_extensions: cfg.allowed_extensions.clone(),
        }
    }
}

/// A file discovered by the walker.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Path relative to the walk root, using `/` separators.
    pub path: String,
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last-modified time, when the platform reports one.
    pub mtime: Option<SystemTime>,
}

/// A non-fatal problem encountered during a walk; the walk continues.
#[derive(Debug, Clone)]
pub struct WalkWarning {
    /// Path (relative where possible) that triggered the warning.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

/// Result of a complete walk: discovered files plus any warnings.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Accepted files, in deterministic (lexicographic, depth-first) order.
    pub files: Vec<FileDescriptor>,
    /// Non-fatal problems; a single bad entry never aborts the walk.
    pub warnings: Vec<WalkWarning>,
}

fn build_ignore_set(patterns: &[String]) -> ConexusResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConexusError::InvalidParams {
            message: format!("invalid ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConexusError::internal(format!("failed to build ignore set: {e}")))
}

/// Validate that `candidate` (already joined to `root`) stays within `root`
/// after normalization. Returns the canonical-ish cleaned relative path.
fn validate_within_root(root: &Path, candidate: &Path) -> ConexusResult<PathBuf> {
    let relative = candidate.strip_prefix(root).map_err(|_| ConexusError::PathTraversal {
        path: candidate.display().to_string(),
    })?;

    for component in relative.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(ConexusError::PathTraversal {
                path: candidate.display().to_string(),
            });
        }
    }

    Ok(relative.to_path_buf())
}

/// Walk `root`, returning every accepted file in deterministic order.
///
/// A single bad entry (permission error, broken symlink, path-traversal
/// attempt) is recorded as a warning and skipped rather than aborting the
/// whole walk.
pub fn walk(root: &Path, options: &WalkOptions) -> ConexusResult<WalkReport> {
    let ignore_set = build_ignore_set(&options.ignore_patterns)?;
    let mut report = WalkReport::default();
    walk_dir(root, root, options, &ignore_set, &mut report);
    report.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(report)
}

fn walk_dir(root: &Path, dir: &Path, options: &WalkOptions, ignore_set: &GlobSet, report: &mut WalkReport) {
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(Result::ok).collect(),
        Err(e) => {
            report.warnings.push(WalkWarning {
                path: dir.display().to_string(),
                message: format!("failed to read directory: {e}"),
            });
            return;
        }
    };
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let name_str = file_name.to_string_lossy();

        if ignore_set.is_match(&*name_str) || ignore_set.is_match(&path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                report.warnings.push(WalkWarning {
                    path: path.display().to_string(),
                    message: format!("failed to stat: {e}"),
                });
                continue;
            }
        };

        if metadata.is_symlink() && !options.follow_symlinks {
            continue;
        }

        let relative = match validate_within_root(root, &path) {
            Ok(r) => r,
            Err(e) => {
                report.warnings.push(WalkWarning {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        if metadata.is_dir() {
            if ALWAYS_IGNORED_DIRS.contains(&name_str.as_ref()) {
                continue;
            }
            walk_dir(root, &path, options, ignore_set, report);
            continue;
        }

        if !metadata.is_file() {
            continue;
        }

        if metadata.len() > options.max_file_size {
            report.warnings.push(WalkWarning {
                path: relative.display().to_string(),
                message: format!("skipped: {} bytes exceeds max_file_size", metadata.len()),
            });
            continue;
        }

        if !options.allowed_extensions.is_empty() {
            let ext = path.extension().and_then(std::ffi::OsStr::to_str).unwrap_or("");
            if !options.allowed_extensions.iter().any(|e| e == ext) {
                continue;
            }
        }

        report.files.push(FileDescriptor {
            path: relative.to_string_lossy().replace('\\', "/"),
            absolute_path: path,
            size: metadata.len(),
            mtime: metadata.modified().ok(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn default_options() -> WalkOptions {
        WalkOptions {
            ignore_patterns: vec![".git".into()],
            max_file_size: 1024 * 1024,
            follow_symlinks: false,
            allowed_extensions: Vec::new(),
        }
    }

    #[test]
    fn walk_is_lexicographic_and_depth_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.rs"), "b").unwrap();
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.rs"), "c").unwrap();

        let report = walk(dir.path(), &default_options()).expect("walk");
        let paths: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["a.rs", "b.rs", "sub/c.rs"]);
    }

    #[test]
    fn walk_skips_oversized_files_with_warning_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("big.rs"), "x".repeat(200)).unwrap();
        let mut options = default_options();
        options.max_file_size = 10;

        let report = walk(dir.path(), &options).expect("walk");
        assert!(report.files.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn walk_skips_always_ignored_vcs_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let report = walk(dir.path(), &default_options()).expect("walk");
        let paths: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["main.rs"]);
    }

    #[test]
    fn walk_respects_allowed_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        let mut options = default_options();
        options.allowed_extensions = vec!["rs".into()];

        let report = walk(dir.path(), &options).expect("walk");
        let paths: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["a.rs"]);
    }
}
