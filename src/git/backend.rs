//! The dual-backend contract
//!
//! One trait, two interchangeable adapters: [`LocalBackend`] operates on
//! the repository object model in-process, [`CliBackend`] drives the `git`
//! executable and parses its porcelain output. Both must behave
//! identically; the shared contract suite in `tests/` runs every assertion
//! against both.
//!
//! A [`Workspace`] binds one backend to one repository root for the life
//! of the process run.

use std::path::{Path, PathBuf};

use crate::error::{GitResult, Result};
use crate::git::status::WorktreeStatus;
use crate::git::{CliBackend, LocalBackend};

/// Branch names recognized as "main" for the plan workflow.
pub const MAIN_BRANCHES: &[&str] = &["main", "master"];

/// Default-branch candidates checked when `origin/HEAD` is absent.
pub const DEFAULT_BRANCH_CANDIDATES: &[&str] = &["main", "master", "trunk", "develop"];

/// Identity used when neither repository nor global config carries one,
/// so automated commits never fail purely for lack of configuration.
pub const FALLBACK_AUTHOR_NAME: &str = "Plan Pilot";
pub const FALLBACK_AUTHOR_EMAIL: &str = "plan-pilot@localhost";

/// Which backend implementation to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-process repository object model (libgit2).
    #[default]
    InProcess,
    /// External `git` executable, output parsed.
    Cli,
}

/// Resolved commit identity. Computed once per commit call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_AUTHOR_NAME.to_string(),
            email: FALLBACK_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Diff summary against a base branch.
///
/// The zero value covers both "no difference" and "base unresolvable";
/// callers that need to distinguish must check branch existence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffTotals {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffTotals {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Human-readable one-liner for progress narration.
    pub fn summary(&self) -> String {
        if self.is_zero() {
            "No changes".to_string()
        } else {
            format!(
                "{} file(s), +{} -{} lines",
                self.files, self.additions, self.deletions
            )
        }
    }
}

/// Primitive repository operations, implemented twice.
///
/// Paths accepted by these methods may be absolute or relative; every
/// implementation resolves them against its root (rejecting escapes)
/// before use. State is re-derived from disk on every call -- external
/// actors mutate the worktree between calls.
pub trait GitBackend {
    /// Absolute worktree root. For a linked worktree this is the
    /// worktree's own directory, not the main repository's.
    fn root(&self) -> &Path;

    /// Current branch name, or the empty string for a detached HEAD.
    /// An unborn branch reports the name HEAD points at.
    fn current_branch(&self) -> GitResult<String>;

    /// Create `name` from HEAD and switch to it, preserving untracked
    /// files. Fails with `BranchExists` if the name is taken.
    fn create_branch(&self, name: &str) -> GitResult<()>;

    /// Switch to an existing branch, preserving untracked files.
    fn checkout_branch(&self, name: &str) -> GitResult<()>;

    fn branch_exists(&self, name: &str) -> GitResult<bool>;

    /// Stage a path (addition, modification, or deletion).
    fn add(&self, path: &Path) -> GitResult<()>;

    /// Commit staged changes. Fails with `NothingToCommit` when the index
    /// matches HEAD.
    fn commit(&self, message: &str) -> GitResult<()>;

    /// Identity the next commit would use: repository config, then global
    /// config, then the fixed fallback.
    fn commit_author(&self) -> GitResult<CommitAuthor>;

    /// Rename `src` to `dst` on disk, then stage both sides. A staging
    /// failure after the rename reverses the rename before reporting.
    fn move_file(&self, src: &Path, dst: &Path) -> GitResult<()>;

    fn is_ignored(&self, path: &Path) -> GitResult<bool>;

    /// False for an empty repository (unborn HEAD). A directory that is
    /// not a repository is an error, never `false`.
    fn has_commits(&self) -> GitResult<bool>;

    /// Stage every untracked, non-ignored path in sorted order and
    /// commit. Fails with `NothingToCommit` when nothing qualifies.
    fn create_initial_commit(&self, message: &str) -> GitResult<()>;

    /// Default branch: `origin/HEAD` target (local name preferred), then
    /// the first existing of `main`/`master`/`trunk`/`develop`, then the
    /// literal `"master"`.
    fn default_branch(&self) -> GitResult<String>;

    /// Diff against `base` (local branch, then `origin/<base>`, then an
    /// already-qualified `origin/...` name). Zero when unresolvable or
    /// identical to HEAD.
    fn diff_stats(&self, base: &str) -> GitResult<DiffTotals>;

    /// Fresh per-path status snapshot.
    fn status(&self) -> GitResult<WorktreeStatus>;
}

/// A repository root bound to one backend for the run's duration.
pub struct Workspace {
    backend: Box<dyn GitBackend>,
}

impl Workspace {
    /// Open the repository containing `dir`, binding the chosen backend.
    pub fn discover(dir: impl AsRef<Path>, kind: BackendKind) -> Result<Self> {
        let backend: Box<dyn GitBackend> = match kind {
            BackendKind::InProcess => Box::new(LocalBackend::discover(dir.as_ref())?),
            BackendKind::Cli => Box::new(CliBackend::discover(dir.as_ref())?),
        };
        Ok(Self { backend })
    }

    /// Bind an already-constructed backend (used by the contract tests).
    pub fn from_backend(backend: Box<dyn GitBackend>) -> Self {
        Self { backend }
    }

    pub fn root(&self) -> &Path {
        self.backend.root()
    }

    pub fn backend(&self) -> &dyn GitBackend {
        self.backend.as_ref()
    }

    /// Root-relative form of `path`, rejecting escapes.
    pub fn relative(&self, path: &Path) -> GitResult<PathBuf> {
        super::paths::to_relative(self.backend.root(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_totals_zero_summary() {
        assert!(DiffTotals::default().is_zero());
        assert_eq!(DiffTotals::default().summary(), "No changes");
    }

    #[test]
    fn test_diff_totals_summary() {
        let totals = DiffTotals {
            files: 2,
            additions: 10,
            deletions: 5,
        };
        assert!(!totals.is_zero());
        assert!(totals.summary().contains("2 file(s)"));
        assert!(totals.summary().contains("+10"));
        assert!(totals.summary().contains("-5"));
    }

    #[test]
    fn test_fallback_author() {
        let author = CommitAuthor::fallback();
        assert_eq!(author.name, FALLBACK_AUTHOR_NAME);
        assert_eq!(author.email, FALLBACK_AUTHOR_EMAIL);
    }
}
