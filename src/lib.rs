//! Plan Pilot - plan-centric git workflow layer for autonomous coding agents
//!
//! Drives the repository side of an iterative plan-execution loop: one
//! feature branch per plan file, archival of completed plans, ignore-file
//! and empty-repository bootstrapping, and diff reporting.
//!
//! # Architecture
//!
//! Two interchangeable backends satisfy one contract:
//! - **In-process** - operates on the repository object model via libgit2
//! - **CLI** - drives the `git` executable and parses its porcelain output
//!
//! Select one at construction time with [`BackendKind`]; everything above
//! the [`GitBackend`] trait is backend-agnostic.
//!
//! # Modules
//!
//! - [`git`] - path resolution, ignore matching, status snapshots, and the
//!   dual backends
//! - [`workflow`] - the plan-branch lifecycle built on backend primitives
//! - [`error`] - error types
//!
//! # Concurrency
//!
//! All operations are synchronous and blocking, and a [`Workspace`] is not
//! designed for concurrent use: the owning process serializes calls.
//! Every query re-derives state from disk, since the coding agent (or a
//! human) may mutate the worktree between any two calls.

pub mod error;
pub mod git;
pub mod workflow;

pub use error::{Error, GitError, GitResult, Result};
pub use git::{
    BackendKind, CliBackend, CommitAuthor, DiffTotals, FileStatus, GitBackend, IgnoreMatcher,
    IgnoreTier, LocalBackend, Workspace, WorktreeStatus,
};
pub use workflow::{ProgressSink, TracingSink, WorkflowService, branch_name_for_plan};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
