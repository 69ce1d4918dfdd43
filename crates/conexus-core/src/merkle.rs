//! Content-addressed change detection between index runs.
//!
//! The Merkle index is a flat map of repository-relative path to content
//! hash, persisted as JSON (`spec.md` §6's `{version, entries}` shape).
//! `diff` is pure set algebra over paths; `commit` replaces the state file
//! atomically (write to a temp file, then rename) so a crash mid-write
//! never leaves a torn file behind.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConexusError, ConexusResult};
use crate::types::MerkleEntry;

const SCHEMA_VERSION: u32 = 1;

/// The persisted Merkle index: `{version, entries: {path: {hash, last_seen}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleIndex {
    /// Schema version, bumped if the on-disk shape ever changes.
    pub version: u32,
    /// Map of repository-relative path to its last-recorded entry.
    pub entries: HashMap<String, MerkleEntry>,
}

impl Default for MerkleIndex {
    fn default() -> Self {
        Self { version: SCHEMA_VERSION, entries: HashMap::new() }
    }
}

/// The result of comparing a new snapshot against a prior `MerkleIndex`.
#[derive(Debug, Clone, Default)]
pub struct MerkleDiff {
    /// Paths present in the new snapshot but absent from the old index.
    pub added: Vec<String>,
    /// Paths present in both, whose content hash differs.
    pub modified: Vec<String>,
    /// Paths present in the old index but absent from the new snapshot.
    pub deleted: Vec<String>,
}

impl MerkleDiff {
    /// True when the diff carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// SHA-256 hex digest of a byte slice, used for both chunk and Merkle
/// content hashing.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl MerkleIndex {
    /// Load a Merkle index from `state_path`. A missing file yields an
    /// empty index (not an error); a present-but-unparseable file yields
    /// `CorruptState`, which callers must treat as empty and warn on,
    /// never as a fatal abort.
    pub fn load(state_path: &Path) -> ConexusResult<Self> {
        if !state_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(state_path)?;
        let index: Self = serde_json::from_str(&content).map_err(|e| ConexusError::CorruptState {
            path: state_path.to_path_buf(),
            message: e.to_string(),
        })?;

        if index.version != SCHEMA_VERSION {
            return Err(ConexusError::CorruptState {
                path: state_path.to_path_buf(),
                message: format!("unsupported schema version {}", index.version),
            });
        }

        Ok(index)
    }

    /// Load a Merkle index, degrading a `CorruptState` error to an empty
    /// index (the caller is expected to have already logged a warning).
    pub fn load_or_empty(state_path: &Path) -> Self {
        Self::load(state_path).unwrap_or_default()
    }

    /// Compare `new_entries` (a fresh snapshot keyed by relative path hash)
    /// against this (the prior run's) index.
    pub fn diff(&self, new_entries: &HashMap<String, String>) -> MerkleDiff {
        let mut diff = MerkleDiff::default();
        let old_paths: HashSet<&str> = self.entries.keys().map(String::as_str).collect();
        let new_paths: HashSet<&str> = new_entries.keys().map(String::as_str).collect();

        for path in &new_paths {
            if !old_paths.contains(path) {
                diff.added.push((*path).to_string());
            } else if self.entries[*path].hash != new_entries[*path] {
                diff.modified.push((*path).to_string());
            }
        }
        for path in &old_paths {
            if !new_paths.contains(path) {
                diff.deleted.push((*path).to_string());
            }
        }

        diff.added.sort();
        diff.modified.sort();
        diff.deleted.sort();
        diff
    }

    /// Atomically replace the state file at `state_path` with a fresh
    /// index built from `new_entries`. Writes to `state_path.tmp` then
    /// renames, so a concurrent reader never observes a torn file.
    pub fn commit(state_path: &Path, new_entries: HashMap<String, String>, now_iso8601: &str) -> ConexusResult<Self> {
        let entries = new_entries
            .into_iter()
            .map(|(path, hash)| (path, MerkleEntry { hash, last_seen: now_iso8601.to_string() }))
            .collect();
        let index = Self { version: SCHEMA_VERSION, entries };

        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = state_path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(&index)?;
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, state_path)?;

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(p, h)| (p.to_string(), h.to_string())).collect()
    }

    #[test]
    fn load_missing_file_is_empty_not_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = MerkleIndex::load(&dir.path().join("merkle_state.json")).expect("load");
        assert!(index.entries.is_empty());
    }

    #[test]
    fn diff_reports_added_modified_deleted() {
        let mut old = MerkleIndex::default();
        old.entries.insert("a.rs".into(), MerkleEntry { hash: "h1".into(), last_seen: "t0".into() });
        old.entries.insert("b.rs".into(), MerkleEntry { hash: "h2".into(), last_seen: "t0".into() });

        let new_entries = entries(&[("a.rs", "h1"), ("b.rs", "h2-changed"), ("c.rs", "h3")]);
        let diff = old.diff(&new_entries);

        assert_eq!(diff.added, vec!["c.rs"]);
        assert_eq!(diff.modified, vec!["b.rs"]);
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn diff_unchanged_files_report_no_added_or_modified() {
        let mut old = MerkleIndex::default();
        old.entries.insert("a.rs".into(), MerkleEntry { hash: "h1".into(), last_seen: "t0".into() });

        let new_entries = entries(&[("a.rs", "h1")]);
        let diff = old.diff(&new_entries);
        assert!(diff.is_empty());
    }

    #[test]
    fn diff_reports_deleted_files() {
        let mut old = MerkleIndex::default();
        old.entries.insert("a.rs".into(), MerkleEntry { hash: "h1".into(), last_seen: "t0".into() });
        old.entries.insert("gone.rs".into(), MerkleEntry { hash: "h2".into(), last_seen: "t0".into() });

        let new_entries = entries(&[("a.rs", "h1")]);
        let diff = old.diff(&new_entries);
        assert_eq!(diff.deleted, vec!["gone.rs"]);
    }

    #[test]
    fn commit_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("merkle_state.json");
        let new_entries = entries(&[("a.rs", "h1"), ("b.rs", "h2")]);

        MerkleIndex::commit(&state_path, new_entries, "2026-01-01T00:00:00Z").expect("commit");
        let loaded = MerkleIndex::load(&state_path).expect("load");

        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries["a.rs"].hash, "h1");
    }

    #[test]
    fn load_corrupt_state_is_reported_not_panicked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state_path = dir.path().join("merkle_state.json");
        std::fs::write(&state_path, "not valid json").unwrap();

        let result = MerkleIndex::load(&state_path);
        assert!(matches!(result, Err(ConexusError::CorruptState { .. })));
        assert!(MerkleIndex::load_or_empty(&state_path).entries.is_empty());
    }
}
