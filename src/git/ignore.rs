//! Three-tier gitignore evaluation
//!
//! Merges system excludes, the user's global excludes, and every
//! `.gitignore` inside the repository tree into one matcher. More local
//! patterns win: a repository's own rules override the user's defaults,
//! which override system-wide ones. A tier that cannot be loaded simply
//! contributes no patterns.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

/// Precedence tier a pattern set came from, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IgnoreTier {
    System,
    Global,
    Local,
}

struct TierMatcher {
    tier: IgnoreTier,
    /// Directory the patterns are anchored at.
    base: PathBuf,
    matcher: Gitignore,
}

/// Merged ignore matcher for one repository.
pub struct IgnoreMatcher {
    root: PathBuf,
    /// Consulted in order; the first definitive verdict wins, so this is
    /// kept sorted highest-precedence first (deepest local files, then the
    /// root `.gitignore`, then global, then system).
    chain: Vec<TierMatcher>,
}

impl IgnoreMatcher {
    /// Load all three tiers for the repository rooted at `root`.
    pub fn for_repo(root: &Path) -> Self {
        let mut chain = Vec::new();

        // Local .gitignore files, deepest first so they take precedence
        // over shallower ones.
        let mut local_files = Vec::new();
        collect_gitignores(root, &mut local_files);
        local_files.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for file in local_files {
            let base = file.parent().unwrap_or(root).to_path_buf();
            if let Some(matcher) = load_patterns(&base, &file) {
                chain.push(TierMatcher {
                    tier: IgnoreTier::Local,
                    base,
                    matcher,
                });
            }
        }

        if let Some(file) = global_excludes_file() {
            if let Some(matcher) = load_patterns(root, &file) {
                chain.push(TierMatcher {
                    tier: IgnoreTier::Global,
                    base: root.to_path_buf(),
                    matcher,
                });
            }
        }

        if let Some(file) = system_excludes_file() {
            if let Some(matcher) = load_patterns(root, &file) {
                chain.push(TierMatcher {
                    tier: IgnoreTier::System,
                    base: root.to_path_buf(),
                    matcher,
                });
            }
        }

        debug!("Loaded {} ignore pattern sets for {:?}", chain.len(), root);

        Self {
            root: root.to_path_buf(),
            chain,
        }
    }

    /// Whether any tier contributed patterns. An empty matcher never
    /// ignores anything.
    pub fn is_empty(&self) -> bool {
        self.chain.iter().all(|t| t.matcher.is_empty())
    }

    /// Test a root-relative path against all tiers.
    ///
    /// Returns true when the highest-precedence matching pattern ignores
    /// the path; a whitelist pattern (`!pattern`) at a higher tier stops
    /// lower tiers from ignoring it.
    pub fn matches(&self, relative: &Path, is_dir: bool) -> bool {
        let absolute = self.root.join(relative);
        for scoped in &self.chain {
            if !absolute.starts_with(&scoped.base) {
                continue;
            }
            match scoped.matcher.matched_path_or_any_parents(&absolute, is_dir) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }
        false
    }

    /// Tiers that contributed at least one pattern, for diagnostics.
    pub fn loaded_tiers(&self) -> Vec<IgnoreTier> {
        let mut tiers: Vec<IgnoreTier> = self
            .chain
            .iter()
            .filter(|t| !t.matcher.is_empty())
            .map(|t| t.tier)
            .collect();
        tiers.sort();
        tiers.dedup();
        tiers
    }
}

/// Build a matcher from one pattern file, anchored at `base`.
/// Returns None when the file is missing or unparseable (non-fatal).
fn load_patterns(base: &Path, file: &Path) -> Option<Gitignore> {
    if !file.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(base);
    if let Some(err) = builder.add(file) {
        debug!("Skipping unreadable ignore file {:?}: {}", file, err);
        return None;
    }
    match builder.build() {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            debug!("Skipping malformed ignore file {:?}: {}", file, err);
            None
        }
    }
}

/// Recursively collect `.gitignore` files under `dir`, skipping `.git`.
fn collect_gitignores(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            if name != ".git" {
                collect_gitignores(&path, out);
            }
        } else if name == ".gitignore" {
            out.push(path);
        }
    }
}

/// The user's global excludes file: `core.excludesFile` from the global
/// git config, falling back to the XDG location (`<config>/git/ignore`).
fn global_excludes_file() -> Option<PathBuf> {
    let configured = git2::Config::find_global()
        .ok()
        .and_then(|p| git2::Config::open(&p).ok())
        .and_then(|c| c.get_path("core.excludesfile").ok());
    if configured.is_some() {
        return configured;
    }
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("git").join("ignore"))
}

/// System-wide excludes file, from the system git config if one exists.
fn system_excludes_file() -> Option<PathBuf> {
    git2::Config::find_system()
        .ok()
        .and_then(|p| git2::Config::open(&p).ok())
        .and_then(|c| c.get_path("core.excludesfile").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_empty_matcher_never_ignores() {
        let temp = TempDir::new().unwrap();
        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(!matcher.matches(Path::new("anything.log"), false));
    }

    #[test]
    fn test_root_gitignore() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", "*.log\ntarget/\n");

        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(matcher.matches(Path::new("progress.log"), false));
        assert!(matcher.matches(Path::new("deep/progress.log"), false));
        assert!(matcher.matches(Path::new("target"), true));
        assert!(!matcher.matches(Path::new("plan.md"), false));
    }

    #[test]
    fn test_file_inside_ignored_dir() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", "target/\n");

        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(matcher.matches(Path::new("target/debug/build.out"), false));
    }

    #[test]
    fn test_nested_gitignore_is_anchored() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "sub/.gitignore", "scratch/\n");
        fs::create_dir_all(temp.path().join("sub/scratch")).unwrap();

        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(matcher.matches(Path::new("sub/scratch/notes.txt"), false));
        assert!(!matcher.matches(Path::new("other/scratch/notes.txt"), false));
    }

    #[test]
    fn test_local_whitelist_overrides() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", "*.log\n");
        write(temp.path(), "keep/.gitignore", "!important.log\n");
        fs::create_dir_all(temp.path().join("keep")).unwrap();

        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(matcher.matches(Path::new("noise.log"), false));
        assert!(!matcher.matches(Path::new("keep/important.log"), false));
    }

    #[test]
    fn test_loaded_tiers_reports_local() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", "*.tmp\n");

        let matcher = IgnoreMatcher::for_repo(temp.path());
        assert!(matcher.loaded_tiers().contains(&IgnoreTier::Local));
        assert!(!matcher.is_empty());
    }
}
