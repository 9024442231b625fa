//! Backend-agnostic git layer
//!
//! One contract, two adapters:
//! - `LocalBackend` - in-process repository object model (libgit2)
//! - `CliBackend` - external `git` executable, parsed output
//!
//! Shared building blocks:
//! - `paths` - repository-relative path resolution (the sandbox boundary)
//! - `ignore` - three-tier gitignore evaluation
//! - `status` - per-path status snapshots and dirty predicates

mod backend;
mod cli;
mod ignore;
mod local;
pub mod paths;
mod status;

pub use self::backend::*;
pub use self::cli::*;
pub use self::ignore::*;
pub use self::local::*;
pub use self::status::*;
