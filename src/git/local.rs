//! In-process backend using the libgit2 object model
//!
//! No subprocesses: branches, commits, index surgery, and diffs all go
//! through `git2`. Ignore checks delegate to the three-tier
//! [`IgnoreMatcher`]; status snapshots use libgit2's own status walk,
//! which applies the same exclusion of ignored untracked paths.

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, Repository, Status, StatusOptions};
use tracing::{debug, info, instrument};

use crate::error::{GitError, GitResult};
use crate::git::backend::{CommitAuthor, DiffTotals, GitBackend, DEFAULT_BRANCH_CANDIDATES};
use crate::git::ignore::IgnoreMatcher;
use crate::git::paths;
use crate::git::status::{FileStatus, WorktreeStatus};

/// Backend operating directly on repository storage via libgit2.
pub struct LocalBackend {
    repo: Repository,
    root: PathBuf,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl LocalBackend {
    /// Open the repository containing `dir`, searching parent directories.
    /// The root is the worktree's own root, so a linked worktree resolves
    /// to itself rather than the main repository.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn discover(dir: impl AsRef<Path>) -> GitResult<Self> {
        let dir = dir.as_ref();
        let repo = Repository::discover(dir).map_err(|e| match e.code() {
            ErrorCode::NotFound => GitError::NotARepository(dir.to_path_buf()),
            _ => GitError::from(e),
        })?;
        let root = repo
            .workdir()
            .ok_or_else(|| {
                GitError::OperationFailed(format!(
                    "repository at {dir:?} is bare and has no worktree"
                ))
            })?
            .to_path_buf();

        debug!("Opened repository at {:?}", root);

        Ok(Self { repo, root })
    }

    fn relative(&self, path: &Path) -> GitResult<PathBuf> {
        paths::to_relative(&self.root, path)
    }

    /// Checkout `refs/heads/<name>` with a safe (untracked-preserving)
    /// worktree update, then repoint HEAD.
    fn switch_to(&self, name: &str) -> GitResult<()> {
        let refname = format!("refs/heads/{name}");
        let object = self.repo.revparse_single(&refname)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo.checkout_tree(&object, Some(&mut checkout))?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    fn signature(&self) -> GitResult<git2::Signature<'static>> {
        let author = self.commit_author()?;
        Ok(git2::Signature::now(&author.name, &author.email)?)
    }

    /// Resolve `base` to a commit: local branch, then `origin/<base>`,
    /// then an already-qualified `origin/...` remote-tracking name.
    fn resolve_base(&self, base: &str) -> GitResult<Option<git2::Commit<'_>>> {
        if let Ok(branch) = self.repo.find_branch(base, BranchType::Local) {
            return Ok(Some(branch.into_reference().peel_to_commit()?));
        }
        if let Ok(branch) = self
            .repo
            .find_branch(&format!("origin/{base}"), BranchType::Remote)
        {
            return Ok(Some(branch.into_reference().peel_to_commit()?));
        }
        if base.starts_with("origin/") {
            if let Ok(branch) = self.repo.find_branch(base, BranchType::Remote) {
                return Ok(Some(branch.into_reference().peel_to_commit()?));
            }
        }
        Ok(None)
    }
}

/// Map a libgit2 status bitfield onto the single classification the
/// workflow reasons about. Staged states win over worktree states when a
/// path carries both.
fn classify(status: Status) -> FileStatus {
    if status.contains(Status::WT_NEW) {
        FileStatus::Untracked
    } else if status.contains(Status::INDEX_NEW) {
        FileStatus::StagedAdded
    } else if status.intersects(
        Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    ) {
        FileStatus::StagedModifiedOrDeleted
    } else if status.contains(Status::WT_DELETED) {
        FileStatus::WorktreeDeleted
    } else if status.intersects(Status::WT_MODIFIED | Status::WT_RENAMED | Status::WT_TYPECHANGE) {
        FileStatus::WorktreeModified
    } else {
        FileStatus::Unmodified
    }
}

impl GitBackend for LocalBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn current_branch(&self) -> GitResult<String> {
        match self.repo.head() {
            Ok(head) => {
                if head.is_branch() {
                    Ok(head.shorthand().unwrap_or_default().to_string())
                } else {
                    // Detached HEAD
                    Ok(String::new())
                }
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // No commits yet: HEAD is a symbolic ref to a branch that
                // does not exist. Report the branch it points at.
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or_default();
                Ok(target
                    .strip_prefix("refs/heads/")
                    .unwrap_or(target)
                    .to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    fn create_branch(&self, name: &str) -> GitResult<()> {
        if self.branch_exists(name)? {
            return Err(GitError::BranchExists(name.to_string()));
        }
        let head = self.repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch => GitError::NoCommitsYet,
            _ => GitError::from(e),
        })?;
        let commit = head.peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        self.switch_to(name)?;
        info!("Created and switched to branch {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    fn checkout_branch(&self, name: &str) -> GitResult<()> {
        if !self.branch_exists(name)? {
            return Err(GitError::BranchNotFound(name.to_string()));
        }
        self.switch_to(name)?;
        info!("Switched to branch {}", name);
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> GitResult<bool> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn add(&self, path: &Path) -> GitResult<()> {
        let rel = self.relative(path)?;
        let mut index = self.repo.index()?;
        if self.root.join(&rel).exists() {
            index.add_path(&rel)?;
        } else {
            // Absent on disk: stage the deletion, matching `git add` on a
            // removed tracked file.
            index.remove_path(&rel)?;
        }
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str) -> GitResult<()> {
        let signature = self.signature()?;
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        match self.repo.head() {
            Ok(head) => {
                let parent = head.peel_to_commit()?;
                if parent.tree_id() == tree_oid {
                    return Err(GitError::NothingToCommit);
                }
                self.repo.commit(
                    Some("HEAD"),
                    &signature,
                    &signature,
                    message,
                    &tree,
                    &[&parent],
                )?;
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                if index.is_empty() {
                    return Err(GitError::NothingToCommit);
                }
                self.repo
                    .commit(Some("HEAD"), &signature, &signature, message, &tree, &[])?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!("Committed: {}", message);
        Ok(())
    }

    fn commit_author(&self) -> GitResult<CommitAuthor> {
        // The merged config already applies repository-over-global
        // precedence; the synthetic identity covers the unconfigured case.
        let config = self.repo.config()?;
        let name = config.get_string("user.name").ok();
        let email = config.get_string("user.email").ok();
        match (name, email) {
            (Some(name), Some(email)) => Ok(CommitAuthor { name, email }),
            _ => Ok(CommitAuthor::fallback()),
        }
    }

    #[instrument(skip(self), fields(src = %src.display(), dst = %dst.display()))]
    fn move_file(&self, src: &Path, dst: &Path) -> GitResult<()> {
        let src_rel = self.relative(src)?;
        let dst_rel = self.relative(dst)?;
        let src_abs = self.root.join(&src_rel);
        let dst_abs = self.root.join(&dst_rel);

        fs::rename(&src_abs, &dst_abs).map_err(|e| {
            GitError::OperationFailed(format!("rename {src_rel:?} -> {dst_rel:?}: {e}"))
        })?;

        let staged = (|| -> GitResult<()> {
            let mut index = self.repo.index()?;
            if index.get_path(&src_rel, 0).is_some() {
                index.remove_path(&src_rel)?;
            }
            index.add_path(&dst_rel)?;
            index.write()?;
            Ok(())
        })();

        if let Err(e) = staged {
            // The rename already happened; put the file back before
            // reporting so no state is left half-migrated.
            let rollback = match fs::rename(&dst_abs, &src_abs) {
                Ok(()) => "file restored to original path".to_string(),
                Err(re) => format!("rollback rename also failed: {re}"),
            };
            return Err(GitError::MoveFailed {
                src: src_rel,
                dst: dst_rel,
                reason: e.to_string(),
                rollback,
            });
        }

        Ok(())
    }

    fn is_ignored(&self, path: &Path) -> GitResult<bool> {
        let rel = self.relative(path)?;
        // Rebuilt per call: EnsureIgnored may have appended patterns since
        // the backend was constructed.
        let matcher = IgnoreMatcher::for_repo(&self.root);
        let is_dir = self.root.join(&rel).is_dir();
        Ok(matcher.matches(&rel, is_dir))
    }

    fn has_commits(&self) -> GitResult<bool> {
        match self.repo.head() {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    fn create_initial_commit(&self, message: &str) -> GitResult<()> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|e| e.status().contains(Status::WT_NEW))
            .filter_map(|e| e.path().map(String::from))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(GitError::NothingToCommit);
        }

        let mut index = self.repo.index()?;
        for path in &paths {
            index.add_path(Path::new(path))?;
        }
        index.write()?;

        self.commit(message)?;
        info!("Created initial commit with {} file(s)", paths.len());
        Ok(())
    }

    fn default_branch(&self) -> GitResult<String> {
        if let Ok(reference) = self.repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = reference.symbolic_target() {
                let name = target.strip_prefix("refs/remotes/origin/").unwrap_or(target);
                if self.branch_exists(name)? {
                    return Ok(name.to_string());
                }
                return Ok(format!("origin/{name}"));
            }
        }
        for candidate in DEFAULT_BRANCH_CANDIDATES {
            if self.branch_exists(candidate)? {
                return Ok((*candidate).to_string());
            }
        }
        Ok("master".to_string())
    }

    fn diff_stats(&self, base: &str) -> GitResult<DiffTotals> {
        let Some(base_commit) = self.resolve_base(base)? else {
            return Ok(DiffTotals::default());
        };
        let head_commit = match self.repo.head() {
            Ok(head) => head.peel_to_commit()?,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(DiffTotals::default()),
            Err(e) => return Err(e.into()),
        };

        let base_tree = base_commit.tree()?;
        let head_tree = head_commit.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
        let stats = diff.stats()?;

        Ok(DiffTotals {
            files: stats.files_changed(),
            additions: stats.insertions(),
            deletions: stats.deletions(),
        })
    }

    fn status(&self) -> GitResult<WorktreeStatus> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut snapshot = WorktreeStatus::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            snapshot.record(PathBuf::from(path), classify(entry.status()));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priorities() {
        assert_eq!(classify(Status::WT_NEW), FileStatus::Untracked);
        assert_eq!(classify(Status::INDEX_NEW), FileStatus::StagedAdded);
        assert_eq!(
            classify(Status::INDEX_NEW | Status::WT_MODIFIED),
            FileStatus::StagedAdded
        );
        assert_eq!(
            classify(Status::INDEX_MODIFIED),
            FileStatus::StagedModifiedOrDeleted
        );
        assert_eq!(classify(Status::WT_DELETED), FileStatus::WorktreeDeleted);
        assert_eq!(classify(Status::WT_MODIFIED), FileStatus::WorktreeModified);
        assert_eq!(classify(Status::CURRENT), FileStatus::Unmodified);
    }

    #[test]
    fn test_discover_rejects_non_repository() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = LocalBackend::discover(temp.path()).unwrap_err();
        assert!(matches!(err, GitError::NotARepository(_)));
    }
}
