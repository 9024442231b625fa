//! Plan-branch workflow
//!
//! The public surface of the git layer: one [`WorkflowService`] call per
//! lifecycle event. Branch setup before a plan executes
//! ([`create_branch_for_plan`](WorkflowService::create_branch_for_plan)),
//! archival after it completes
//! ([`move_plan_to_completed`](WorkflowService::move_plan_to_completed)),
//! plus ignore-file and empty-repository bootstrapping and diff
//! reporting. Everything is built from backend primitives; the service
//! holds no state beyond the workspace handle.

mod naming;

pub use naming::branch_name_for_plan;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::{GitResult, Result};
use crate::git::{GitBackend, DiffTotals, Workspace, MAIN_BRANCHES};

/// Caller-supplied progress narration. A single formatted-print
/// capability; the return value is ignored by design.
pub trait ProgressSink {
    fn say(&self, message: &str);
}

/// Default sink: forward narration to the tracing pipeline.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn say(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// Comment written above patterns appended by `ensure_ignored`.
const IGNORE_COMMENT: &str = "# added by plan-pilot: workflow artifacts that should stay untracked";

/// Plan-centric branch lifecycle built on backend primitives.
pub struct WorkflowService {
    workspace: Workspace,
    progress: Box<dyn ProgressSink>,
}

impl WorkflowService {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            progress: Box::new(TracingSink),
        }
    }

    /// Replace the progress sink (e.g. with the orchestrator's console).
    pub fn with_progress(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn backend(&self) -> &dyn GitBackend {
        self.workspace.backend()
    }

    fn say(&self, message: &str) {
        self.progress.say(message);
    }

    /// Create (or re-enter) the feature branch for a plan file.
    ///
    /// No-op when already off the main branch: the caller is isolated
    /// already, and re-running a plan must not branch again. Refuses to
    /// branch over unrelated uncommitted work; the plan file itself may
    /// be dirty and is committed onto the new branch.
    #[instrument(skip(self), fields(plan = %plan_file.display()))]
    pub fn create_branch_for_plan(&self, plan_file: &Path) -> Result<()> {
        let current = wrap(
            self.backend().current_branch(),
            "checking current branch before plan branch creation",
        )?;
        if !MAIN_BRANCHES.contains(&current.as_str()) {
            debug!("On branch '{current}', not a main branch; skipping branch creation");
            return Ok(());
        }

        let branch = branch_name_for_plan(plan_file);
        let plan_rel = self.workspace.relative(plan_file)?;

        let status = wrap(self.backend().status(), "inspecting repository status")?;
        if status.has_changes_other_than(&plan_rel) {
            return Err(crate::error::GitError::UncommittedConflict(format!(
                "cannot create branch '{branch}' from '{current}': the worktree has \
                 uncommitted changes besides the plan file. Stash them and retry, \
                 commit them first, or run in review-only mode to skip branch creation"
            ))
            .into());
        }

        // Captured before the switch: the checkout may alter what the
        // status query would report.
        let plan_dirty = status.file_has_changes(&plan_rel);

        if wrap(
            self.backend().branch_exists(&branch),
            "checking for existing plan branch",
        )? {
            wrap(
                self.backend().checkout_branch(&branch),
                format!("checking out existing branch '{branch}'"),
            )?;
            self.say(&format!("Switched to existing branch '{branch}'"));
        } else {
            wrap(
                self.backend().create_branch(&branch),
                format!("creating branch '{branch}' from '{current}'"),
            )?;
            self.say(&format!("Created branch '{branch}' from '{current}'"));
        }

        if plan_dirty {
            wrap(self.backend().add(&plan_rel), "staging plan file")?;
            wrap(
                self.backend().commit(&format!("add plan: {branch}")),
                "committing plan file",
            )?;
            self.say(&format!("Committed plan file to '{branch}'"));
        }

        Ok(())
    }

    /// Archive a finished plan under a `completed/` sibling directory and
    /// commit the move.
    ///
    /// Idempotent: when the source is already gone and the destination
    /// exists, the move is treated as done. (Destination content is not
    /// verified against the plan.)
    #[instrument(skip(self), fields(plan = %plan_file.display()))]
    pub fn move_plan_to_completed(&self, plan_file: &Path) -> Result<()> {
        let plan_rel = self.workspace.relative(plan_file)?;
        let root = self.workspace.root().to_path_buf();

        let base_name = plan_rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let completed_rel = plan_rel
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("completed");
        let dst_rel = completed_rel.join(&base_name);

        let src_abs = root.join(&plan_rel);
        let dst_abs = root.join(&dst_rel);

        if !src_abs.exists() && dst_abs.exists() {
            self.say(&format!("Plan '{base_name}' already moved to completed/"));
            return Ok(());
        }

        fs::create_dir_all(root.join(&completed_rel))?;

        if let Err(e) = self.backend().move_file(&plan_rel, &dst_rel) {
            // Fall back to a plain rename; an untracked plan has nothing
            // to stage on the removal side anyway.
            warn!("Tracked move failed ({e}); falling back to plain rename");
            if src_abs.exists() {
                fs::rename(&src_abs, &dst_abs)?;
            }
            if let Err(add_err) = self.backend().add(&dst_rel) {
                warn!("Could not stage moved plan: {add_err}");
            }
        }

        wrap(
            self.backend()
                .commit(&format!("move completed plan: {base_name}")),
            "committing completed-plan move",
        )?;
        self.say(&format!("Moved plan '{base_name}' to completed/"));
        Ok(())
    }

    /// Make sure paths like `probe` are ignored, appending `pattern` to
    /// the repository-root ignore file when they are not.
    ///
    /// A failing ignore check is logged and treated as "not ignored":
    /// adding a redundant pattern is harmless, blocking the workflow is
    /// not.
    pub fn ensure_ignored(&self, pattern: &str, probe: &Path) -> Result<()> {
        match self.backend().is_ignored(probe) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => warn!("Ignore check for {probe:?} failed ({e}); adding pattern anyway"),
        }

        let gitignore = self.workspace.root().join(".gitignore");
        let mut content = fs::read_to_string(&gitignore).unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("\n{IGNORE_COMMENT}\n{pattern}\n"));
        fs::write(&gitignore, content)?;

        self.say(&format!("Added '{pattern}' to .gitignore"));
        Ok(())
    }

    /// Bootstrap an empty repository. `prompt` abstracts "ask the user,
    /// get yes/no"; declining leaves the repository untouched and fails
    /// with an explicit error.
    pub fn ensure_has_commits(&self, prompt: impl FnOnce() -> bool) -> Result<()> {
        if wrap(self.backend().has_commits(), "checking for commits")? {
            return Ok(());
        }

        self.say("Repository has no commits yet");
        if !prompt() {
            return Err(crate::error::GitError::OperationFailed(
                "repository has no commits; create an initial commit manually and retry"
                    .to_string(),
            )
            .into());
        }

        wrap(
            self.backend().create_initial_commit("initial commit"),
            "creating initial commit",
        )?;
        self.say("Created initial commit");
        Ok(())
    }

    /// Diff summary of HEAD against `base_branch`.
    pub fn diff_stats(&self, base_branch: &str) -> Result<DiffTotals> {
        wrap(
            self.backend().diff_stats(base_branch),
            format!("computing diff stats against '{base_branch}'"),
        )
    }
}

/// Wrap a backend error with the attempted action before surfacing it.
fn wrap<T>(result: GitResult<T>, action: impl Into<String>) -> Result<T> {
    result.map_err(|e| e.while_doing(action).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, GitError, GitResult};
    use crate::git::{CommitAuthor, FileStatus, WorktreeStatus};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Scripted backend for exercising workflow decisions without a
    /// repository on disk. Repository-backed coverage lives in the
    /// integration suite.
    struct StubBackend {
        root: PathBuf,
        branch: String,
        entries: Vec<(PathBuf, FileStatus)>,
        branch_ops: Rc<RefCell<Vec<String>>>,
    }

    impl StubBackend {
        fn on_branch(branch: &str) -> Self {
            Self {
                root: PathBuf::from("/repo"),
                branch: branch.to_string(),
                entries: Vec::new(),
                branch_ops: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn with_entry(mut self, path: &str, status: FileStatus) -> Self {
            self.entries.push((PathBuf::from(path), status));
            self
        }

        fn ops_handle(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.branch_ops)
        }
    }

    impl GitBackend for StubBackend {
        fn root(&self) -> &Path {
            &self.root
        }
        fn current_branch(&self) -> GitResult<String> {
            Ok(self.branch.clone())
        }
        fn create_branch(&self, name: &str) -> GitResult<()> {
            self.branch_ops.borrow_mut().push(format!("create {name}"));
            Ok(())
        }
        fn checkout_branch(&self, name: &str) -> GitResult<()> {
            self.branch_ops.borrow_mut().push(format!("checkout {name}"));
            Ok(())
        }
        fn branch_exists(&self, _name: &str) -> GitResult<bool> {
            Ok(false)
        }
        fn add(&self, _path: &Path) -> GitResult<()> {
            Ok(())
        }
        fn commit(&self, _message: &str) -> GitResult<()> {
            Ok(())
        }
        fn commit_author(&self) -> GitResult<CommitAuthor> {
            Ok(CommitAuthor::fallback())
        }
        fn move_file(&self, _src: &Path, _dst: &Path) -> GitResult<()> {
            Err(GitError::OperationFailed("not scripted".to_string()))
        }
        fn is_ignored(&self, _path: &Path) -> GitResult<bool> {
            Ok(false)
        }
        fn has_commits(&self) -> GitResult<bool> {
            Ok(true)
        }
        fn create_initial_commit(&self, _message: &str) -> GitResult<()> {
            Ok(())
        }
        fn default_branch(&self) -> GitResult<String> {
            Ok("main".to_string())
        }
        fn diff_stats(&self, _base: &str) -> GitResult<DiffTotals> {
            Ok(DiffTotals::default())
        }
        fn status(&self) -> GitResult<WorktreeStatus> {
            let mut snapshot = WorktreeStatus::new();
            for (path, status) in &self.entries {
                snapshot.record(path.clone(), *status);
            }
            Ok(snapshot)
        }
    }

    fn service(stub: StubBackend) -> WorkflowService {
        WorkflowService::new(Workspace::from_backend(Box::new(stub)))
    }

    #[test]
    fn test_off_main_branch_is_a_noop() {
        let stub = StubBackend::on_branch("add-feature")
            .with_entry("src/lib.rs", FileStatus::WorktreeModified);
        let ops = stub.ops_handle();
        let svc = service(stub);
        // Would fail with a conflict if it did not early-return.
        svc.create_branch_for_plan(Path::new("docs/plans/add-feature.md"))
            .unwrap();
        assert!(ops.borrow().is_empty());
    }

    #[test]
    fn test_unrelated_changes_block_branch_creation() {
        let stub = StubBackend::on_branch("main")
            .with_entry("docs/plans/add-feature.md", FileStatus::Untracked)
            .with_entry("src/lib.rs", FileStatus::WorktreeModified);
        let svc = service(stub);

        let err = svc
            .create_branch_for_plan(Path::new("docs/plans/add-feature.md"))
            .unwrap_err();
        let Error::Git(git_err) = err else {
            panic!("expected git error");
        };
        let message = git_err.to_string();
        assert!(matches!(
            git_err.root_cause(),
            GitError::UncommittedConflict(_)
        ));
        // Remediation text names the branch, the current branch, and the
        // available ways out.
        assert!(message.contains("add-feature"));
        assert!(message.contains("main"));
        assert!(message.contains("Stash"));
        assert!(message.contains("commit them first"));
        assert!(message.contains("review-only"));
    }

    #[test]
    fn test_detached_head_skips_branch_creation() {
        let stub = StubBackend::on_branch("");
        let ops = stub.ops_handle();
        let svc = service(stub);
        svc.create_branch_for_plan(Path::new("docs/plans/x.md"))
            .unwrap();
        assert!(ops.borrow().is_empty());
    }
}
