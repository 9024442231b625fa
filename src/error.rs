//! Error types for plan-pilot
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for plan-pilot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Git workflow errors
///
/// Both backends map their native failure modes onto these variants, so the
/// orchestrator can match on them without knowing which backend is bound.
/// `NoCommitsYet` and `NotARepository` are deliberately distinct: an empty
/// repository is a normal bootstrap state, a missing repository is not.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Repository has no commits yet")]
    NoCommitsYet,

    #[error("Path '{0}' escapes the repository root")]
    PathEscapesRoot(PathBuf),

    #[error("Branch '{0}' already exists")]
    BranchExists(String),

    #[error("Branch '{0}' not found")]
    BranchNotFound(String),

    #[error("{0}")]
    UncommittedConflict(String),

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Failed to move '{src}' to '{dst}': {reason} ({rollback})")]
    MoveFailed {
        src: PathBuf,
        dst: PathBuf,
        reason: String,
        /// What the compensating rename achieved ("restored" or an error).
        rollback: String,
    },

    #[error("Git operation failed: {0}")]
    OperationFailed(String),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse git output: {0}")]
    ParseError(String),

    #[error("libgit2 error: {0}")]
    Git2(String),

    #[error("{action}: {source}")]
    Context {
        action: String,
        #[source]
        source: Box<GitError>,
    },
}

impl GitError {
    /// Wrap this error with a description of the attempted action.
    pub fn while_doing(self, action: impl Into<String>) -> Self {
        GitError::Context {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any `Context` layers.
    pub fn root_cause(&self) -> &GitError {
        match self {
            GitError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(e: git2::Error) -> Self {
        GitError::Git2(e.message().to_string())
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for backend-level operations
pub type GitResult<T> = std::result::Result<T, GitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GitError::NotARepository(PathBuf::from("/tmp/foo"));
        assert!(err.to_string().contains("/tmp/foo"));

        let err = GitError::BranchExists("plans".to_string());
        assert!(err.to_string().contains("already exists"));

        let err = GitError::NoCommitsYet;
        assert!(err.to_string().contains("no commits"));
    }

    #[test]
    fn test_context_preserves_cause() {
        let err = GitError::NothingToCommit.while_doing("committing plan file");
        assert!(err.to_string().contains("committing plan file"));
        assert!(matches!(err.root_cause(), GitError::NothingToCommit));
    }

    #[test]
    fn test_error_conversion() {
        let git_err = GitError::NoCommitsYet;
        let top: Error = git_err.into();
        assert!(matches!(top, Error::Git(_)));
    }
}
