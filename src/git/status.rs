//! Per-path repository status
//!
//! A [`WorktreeStatus`] is a snapshot: it is derived fresh on every query
//! because the agent (or a human) may touch the worktree between any two
//! calls. Nothing here is cached.
//!
//! Both backends produce snapshots that already exclude ignored untracked
//! paths, so "irrelevant noise" (progress logs, build artifacts) never
//! shows up as uncommitted work.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Classification of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Unmodified,
    StagedAdded,
    StagedModifiedOrDeleted,
    WorktreeModified,
    WorktreeDeleted,
    Untracked,
}

impl FileStatus {
    /// True for anything other than `Unmodified`.
    pub fn has_changes(self) -> bool {
        !matches!(self, FileStatus::Unmodified)
    }

    /// True when a tracked file has pending work: staged changes or a
    /// worktree modification/deletion. Untracked files are not "dirty" --
    /// a plan file sitting untracked must not look like unrelated work.
    pub fn is_dirty(self) -> bool {
        matches!(
            self,
            FileStatus::StagedAdded
                | FileStatus::StagedModifiedOrDeleted
                | FileStatus::WorktreeModified
                | FileStatus::WorktreeDeleted
        )
    }
}

/// One-shot status snapshot, keyed by root-relative path.
#[derive(Debug, Default)]
pub struct WorktreeStatus {
    entries: BTreeMap<PathBuf, FileStatus>,
}

impl WorktreeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path's status. `Unmodified` entries are dropped: absence
    /// from the snapshot means unmodified.
    pub fn record(&mut self, path: impl Into<PathBuf>, status: FileStatus) {
        if status.has_changes() {
            self.entries.insert(path.into(), status);
        }
    }

    /// Status of a single path.
    pub fn of(&self, path: &Path) -> FileStatus {
        self.entries
            .get(path)
            .copied()
            .unwrap_or(FileStatus::Unmodified)
    }

    /// Any tracked file staged, modified, or deleted.
    pub fn is_dirty(&self) -> bool {
        self.entries.values().any(|s| s.is_dirty())
    }

    /// Whether `path` is untracked, modified, deleted, or staged.
    pub fn file_has_changes(&self, path: &Path) -> bool {
        self.of(path).has_changes()
    }

    /// Whether any path other than `exclude` has changes. Ignored
    /// untracked paths never appear in the snapshot, so they cannot
    /// count as "other changes" here.
    pub fn has_changes_other_than(&self, exclude: &Path) -> bool {
        self.entries.keys().any(|p| p != exclude)
    }

    /// Paths with changes, in sorted order.
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, FileStatus)]) -> WorktreeStatus {
        let mut status = WorktreeStatus::new();
        for (path, file_status) in entries {
            status.record(*path, *file_status);
        }
        status
    }

    #[test]
    fn test_untracked_alone_is_not_dirty() {
        let status = snapshot(&[("docs/plans/feature.md", FileStatus::Untracked)]);
        assert!(!status.is_dirty());
        assert!(status.file_has_changes(Path::new("docs/plans/feature.md")));
    }

    #[test]
    fn test_tracked_changes_are_dirty() {
        for file_status in [
            FileStatus::StagedAdded,
            FileStatus::StagedModifiedOrDeleted,
            FileStatus::WorktreeModified,
            FileStatus::WorktreeDeleted,
        ] {
            let status = snapshot(&[("src/lib.rs", file_status)]);
            assert!(status.is_dirty(), "{file_status:?} should be dirty");
        }
    }

    #[test]
    fn test_has_changes_other_than() {
        let status = snapshot(&[
            ("docs/plans/feature.md", FileStatus::Untracked),
            ("src/lib.rs", FileStatus::WorktreeModified),
        ]);
        assert!(status.has_changes_other_than(Path::new("docs/plans/feature.md")));

        let only_plan = snapshot(&[("docs/plans/feature.md", FileStatus::Untracked)]);
        assert!(!only_plan.has_changes_other_than(Path::new("docs/plans/feature.md")));
    }

    #[test]
    fn test_unmodified_entries_are_dropped() {
        let status = snapshot(&[("src/lib.rs", FileStatus::Unmodified)]);
        assert!(status.is_empty());
        assert!(!status.file_has_changes(Path::new("src/lib.rs")));
    }
}
