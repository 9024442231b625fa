//! Shell backend driving the `git` executable
//!
//! Implements the same contract as [`LocalBackend`](super::LocalBackend)
//! by spawning `git` and parsing its machine-readable output: porcelain
//! status lines, `--numstat` summaries, and `symbolic-ref` output.
//!
//! The executable's exit conditions are mapped onto the same error
//! taxonomy as the in-process backend. The one a naive exit-code check
//! would conflate: `rev-parse HEAD` fails both for an empty repository
//! and for a missing repository, and only the latter is an error here.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info, instrument};

use crate::error::{GitError, GitResult};
use crate::git::backend::{CommitAuthor, DiffTotals, GitBackend, DEFAULT_BRANCH_CANDIDATES};
use crate::git::paths;
use crate::git::status::{FileStatus, WorktreeStatus};

/// Backend that shells out to the `git` executable.
#[derive(Debug)]
pub struct CliBackend {
    root: PathBuf,
}

impl CliBackend {
    /// Open the repository containing `dir`. Resolves the worktree root
    /// via `rev-parse --show-toplevel`, which is linked-worktree aware.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn discover(dir: impl AsRef<Path>) -> GitResult<Self> {
        let dir = dir.as_ref();
        let output = git_in(dir, &["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepository(dir.to_path_buf()));
            }
            return Err(GitError::CommandFailed {
                command: "rev-parse --show-toplevel".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());

        debug!("Opened repository at {:?}", root);

        Ok(Self { root })
    }

    fn run(&self, args: &[&str]) -> GitResult<Output> {
        git_in(&self.root, args)
    }

    /// Run, require success, return trimmed stdout.
    fn run_checked(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run and collapse the result to "exited zero". For existence
    /// probes where a non-zero exit is an answer, not an error.
    fn run_bool(&self, args: &[&str]) -> bool {
        self.run(args)
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn relative(&self, path: &Path) -> GitResult<PathBuf> {
        paths::to_relative(&self.root, path)
    }

    fn resolve_base(&self, base: &str) -> Option<String> {
        if self.run_bool(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{base}")]) {
            return Some(base.to_string());
        }
        if self.run_bool(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{base}"),
        ]) {
            return Some(format!("origin/{base}"));
        }
        if base.starts_with("origin/")
            && self.run_bool(&["show-ref", "--verify", "--quiet", &format!("refs/remotes/{base}")])
        {
            return Some(base.to_string());
        }
        None
    }
}

/// Run git with `args` in `dir`. Spawn failure (no git on PATH) is an
/// operation failure, not a repository condition.
fn git_in(dir: &Path, args: &[&str]) -> GitResult<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| GitError::OperationFailed(format!("failed to execute git {args:?}: {e}")))
}

/// Parse `git status --porcelain -uall` output into a snapshot.
fn parse_porcelain(output: &str) -> GitResult<WorktreeStatus> {
    let mut snapshot = WorktreeStatus::new();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let staged = line.as_bytes()[0] as char;
        let worktree = line.as_bytes()[1] as char;
        let rest = &line[3..];

        // Rename lines carry "old -> new". Status runs with --no-renames,
        // so this only triggers on output from other porcelain sources;
        // the new path is the one that exists.
        let path = match rest.split_once(" -> ") {
            Some((_, new)) => new,
            None => rest,
        };
        let path = unquote(path);

        let status = if staged == '?' && worktree == '?' {
            FileStatus::Untracked
        } else if staged == 'A' {
            FileStatus::StagedAdded
        } else if matches!(staged, 'M' | 'D' | 'R' | 'C' | 'T') {
            FileStatus::StagedModifiedOrDeleted
        } else if worktree == 'D' {
            FileStatus::WorktreeDeleted
        } else if matches!(worktree, 'M' | 'T') {
            FileStatus::WorktreeModified
        } else {
            FileStatus::Unmodified
        };

        snapshot.record(PathBuf::from(path), status);
    }
    Ok(snapshot)
}

/// Strip porcelain C-quoting from a path: backslash escapes plus octal
/// byte escapes (`\303\244` is how non-ASCII filenames come out).
fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    else {
        return path.to_string();
    };
    let raw = inner.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' {
            bytes.push(raw[i]);
            i += 1;
            continue;
        }
        i += 1;
        match raw.get(i).copied() {
            // Up to three octal digits encode one raw byte.
            Some(b'0'..=b'7') => {
                let mut value = 0u8;
                let mut digits = 0;
                while digits < 3 {
                    match raw.get(i).copied() {
                        Some(d) if (b'0'..=b'7').contains(&d) => {
                            value = value.wrapping_mul(8).wrapping_add(d - b'0');
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                bytes.push(value);
            }
            Some(b'n') => {
                bytes.push(b'\n');
                i += 1;
            }
            Some(b't') => {
                bytes.push(b'\t');
                i += 1;
            }
            Some(other) => {
                bytes.push(other);
                i += 1;
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Parse `git diff --numstat` output. Binary files report `-` for both
/// counts; they still count as a changed file.
fn parse_numstat(output: &str) -> DiffTotals {
    let mut totals = DiffTotals::default();
    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(added), Some(removed)) = (fields.next(), fields.next()) else {
            continue;
        };
        totals.files += 1;
        totals.additions += added.parse::<usize>().unwrap_or(0);
        totals.deletions += removed.parse::<usize>().unwrap_or(0);
    }
    totals
}

impl GitBackend for CliBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn current_branch(&self) -> GitResult<String> {
        let output = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        // A repository that vanished after discovery must not read as a
        // detached HEAD.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepository(self.root.clone()));
        }
        // Detached HEAD: symbolic-ref exits non-zero, quietly.
        Ok(String::new())
    }

    #[instrument(skip(self))]
    fn create_branch(&self, name: &str) -> GitResult<()> {
        if self.branch_exists(name)? {
            return Err(GitError::BranchExists(name.to_string()));
        }
        if !self.has_commits()? {
            return Err(GitError::NoCommitsYet);
        }
        self.run_checked(&["checkout", "-b", name])?;
        info!("Created and switched to branch {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    fn checkout_branch(&self, name: &str) -> GitResult<()> {
        if !self.branch_exists(name)? {
            return Err(GitError::BranchNotFound(name.to_string()));
        }
        self.run_checked(&["checkout", name])?;
        info!("Switched to branch {}", name);
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> GitResult<bool> {
        Ok(self.run_bool(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{name}")]))
    }

    fn add(&self, path: &Path) -> GitResult<()> {
        let rel = self.relative(path)?;
        let rel_str = rel.to_string_lossy();
        self.run_checked(&["add", "--", &rel_str])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> GitResult<()> {
        // On an unborn HEAD `diff --cached` has no base to compare
        // against; the index listing answers the same question there.
        let has_staged = if self.has_commits()? {
            let probe = self.run(&["diff", "--cached", "--quiet"])?;
            !probe.status.success()
        } else {
            !self.run_checked(&["ls-files", "--cached"])?.is_empty()
        };
        if !has_staged {
            return Err(GitError::NothingToCommit);
        }

        let author = self.commit_author()?;
        let name_arg = format!("user.name={}", author.name);
        let email_arg = format!("user.email={}", author.email);
        self.run_checked(&[
            "-c",
            name_arg.as_str(),
            "-c",
            email_arg.as_str(),
            "commit",
            "-m",
            message,
        ])?;

        debug!("Committed: {}", message);
        Ok(())
    }

    fn commit_author(&self) -> GitResult<CommitAuthor> {
        // `git config` already merges repository over global config.
        let name = self.run(&["config", "user.name"])?;
        let email = self.run(&["config", "user.email"])?;
        if name.status.success() && email.status.success() {
            Ok(CommitAuthor {
                name: String::from_utf8_lossy(&name.stdout).trim().to_string(),
                email: String::from_utf8_lossy(&email.stdout).trim().to_string(),
            })
        } else {
            Ok(CommitAuthor::fallback())
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
            let src_str = src_rel.to_string_lossy();
            let dst_str = dst_rel.to_string_lossy();
            let tracked = self.run_bool(&["ls-files", "--error-unmatch", "--", &src_str]);
            if tracked {
                // Stages the deletion of the now-absent source.
                self.run_checked(&["add", "--", &src_str])?;
            }
            self.run_checked(&["add", "--", &dst_str])?;
            Ok(())
        })();

        if let Err(e) = staged {
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
        let rel_str = rel.to_string_lossy();
        let output = self.run(&["check-ignore", "--quiet", "--", &rel_str])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: "check-ignore".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn has_commits(&self) -> GitResult<bool> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if output.status.success() {
            return Ok(true);
        }
        // Both "no commits yet" and "not a repository" exit non-zero;
        // only the stderr text tells them apart.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepository(self.root.clone()));
        }
        Ok(false)
    }

    #[instrument(skip(self))]
    fn create_initial_commit(&self, message: &str) -> GitResult<()> {
        let listing = self.run_checked(&["ls-files", "--others", "--exclude-standard"])?;
        let mut paths: Vec<&str> = listing.lines().filter(|l| !l.is_empty()).collect();
        paths.sort_unstable();

        if paths.is_empty() {
            return Err(GitError::NothingToCommit);
        }

        for path in &paths {
            self.run_checked(&["add", "--", path])?;
        }

        self.commit(message)?;
        info!("Created initial commit with {} file(s)", paths.len());
        Ok(())
    }

    fn default_branch(&self) -> GitResult<String> {
        let symref = self.run(&["symbolic-ref", "refs/remotes/origin/HEAD"])?;
        if symref.status.success() {
            let target = String::from_utf8_lossy(&symref.stdout).trim().to_string();
            let name = target
                .strip_prefix("refs/remotes/origin/")
                .unwrap_or(&target)
                .to_string();
            if self.branch_exists(&name)? {
                return Ok(name);
            }
            return Ok(format!("origin/{name}"));
        }
        for candidate in DEFAULT_BRANCH_CANDIDATES {
            if self.branch_exists(candidate)? {
                return Ok((*candidate).to_string());
            }
        }
        Ok("master".to_string())
    }

    fn diff_stats(&self, base: &str) -> GitResult<DiffTotals> {
        if !self.has_commits()? {
            return Ok(DiffTotals::default());
        }
        let Some(resolved) = self.resolve_base(base) else {
            return Ok(DiffTotals::default());
        };
        let output = self.run_checked(&["diff", "--numstat", &resolved, "HEAD"])?;
        Ok(parse_numstat(&output))
    }

    fn status(&self) -> GitResult<WorktreeStatus> {
        // --no-renames keeps a staged move as its delete/add pair, the
        // same shape the in-process status walk reports.
        let output = self.run_checked(&["status", "--porcelain", "--no-renames", "-uall"])?;
        parse_porcelain(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_parse_porcelain() {
        let output = concat!(
            " M src/lib.rs\n",
            "A  docs/plans/feature.md\n",
            "?? notes.txt\n",
            "D  removed.rs\n",
            " D gone.rs\n",
        );
        let snapshot = parse_porcelain(output).unwrap();

        assert_eq!(
            snapshot.of(Path::new("src/lib.rs")),
            FileStatus::WorktreeModified
        );
        assert_eq!(
            snapshot.of(Path::new("docs/plans/feature.md")),
            FileStatus::StagedAdded
        );
        assert_eq!(snapshot.of(Path::new("notes.txt")), FileStatus::Untracked);
        assert_eq!(
            snapshot.of(Path::new("removed.rs")),
            FileStatus::StagedModifiedOrDeleted
        );
        assert_eq!(snapshot.of(Path::new("gone.rs")), FileStatus::WorktreeDeleted);
    }

    #[test]
    fn test_parse_porcelain_rename() {
        let output = "R  old-name.md -> new-name.md\n";
        let snapshot = parse_porcelain(output).unwrap();
        assert_eq!(
            snapshot.of(Path::new("new-name.md")),
            FileStatus::StagedModifiedOrDeleted
        );
        assert!(!snapshot.file_has_changes(Path::new("old-name.md")));
    }

    #[test]
    fn test_parse_porcelain_quoted_path() {
        let output = "?? \"sp\\\\ecial.md\"\n";
        let snapshot = parse_porcelain(output).unwrap();
        assert_eq!(
            snapshot.of(Path::new("sp\\ecial.md")),
            FileStatus::Untracked
        );
    }

    #[test]
    fn test_parse_porcelain_staged_wins_over_worktree() {
        let output = "AM both.md\nMM edited.md\n";
        let snapshot = parse_porcelain(output).unwrap();
        assert_eq!(snapshot.of(Path::new("both.md")), FileStatus::StagedAdded);
        assert_eq!(
            snapshot.of(Path::new("edited.md")),
            FileStatus::StagedModifiedOrDeleted
        );
    }

    #[test]
    fn test_parse_numstat() {
        let output = "3\t0\tnew-file.md\n10\t5\tsrc/lib.rs\n";
        let totals = parse_numstat(output);
        assert_eq!(totals.files, 2);
        assert_eq!(totals.additions, 13);
        assert_eq!(totals.deletions, 5);
    }

    #[test]
    fn test_parse_numstat_binary_counts_file_only() {
        let output = "-\t-\tassets/logo.png\n2\t1\tREADME.md\n";
        let totals = parse_numstat(output);
        assert_eq!(totals.files, 2);
        assert_eq!(totals.additions, 2);
        assert_eq!(totals.deletions, 1);
    }

    #[test]
    fn test_parse_numstat_empty() {
        assert!(parse_numstat("").is_zero());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("plain.md"), "plain.md");
        assert_eq!(unquote("\"with\\\"quote.md\""), "with\"quote.md");
        assert_eq!(unquote("\"back\\\\slash.md\""), "back\\slash.md");
    }

    #[test]
    fn test_unquote_octal_escapes() {
        // Non-ASCII filenames come out as octal-escaped UTF-8 bytes.
        assert_eq!(unquote("\"\\303\\244.md\""), "\u{e4}.md");
        assert_eq!(unquote("\"tab\\there.md\""), "tab\there.md");
    }
}
