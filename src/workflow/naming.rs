//! Branch-name derivation from plan filenames
//!
//! This mapping is a public contract: it determines which branch an
//! operator will find checked out after a plan run. Plan files are
//! conventionally named `YYYY-MM-DD-description.md` (optionally with an
//! `-HH-MM` time part); the branch drops the extension and the date
//! prefix.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    // One leading date-style prefix, time part optional, followed by a dash.
    Regex::new(r"^\d{4}-\d{2}-\d{2}(-\d{2}-\d{2})?-").expect("valid regex")
});

/// Derive the plan branch name from a plan file path.
///
/// Takes the base filename, strips one trailing `.md`, strips one leading
/// `YYYY-MM-DD(-HH-MM)?-` prefix, and collapses leftover leading dashes.
/// If stripping leaves nothing (a plan named purely by date), the
/// un-date-stripped name is kept instead.
pub fn branch_name_for_plan(plan_file: &Path) -> String {
    let base = plan_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = base.strip_suffix(".md").unwrap_or(&base);

    let stripped = DATE_PREFIX.replace(stem, "");
    let name = stripped.trim_start_matches('-');

    if name.is_empty() {
        stem.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn derive(path: &str) -> String {
        branch_name_for_plan(Path::new(path))
    }

    #[test]
    fn test_plain_name() {
        assert_eq!(derive("add-feature.md"), "add-feature");
    }

    #[test]
    fn test_date_prefix_stripped() {
        assert_eq!(derive("docs/plans/2024-01-15-add-tests.md"), "add-tests");
    }

    #[test]
    fn test_date_time_prefix_stripped() {
        assert_eq!(derive("2024-01-15-12-30-my-feature.md"), "my-feature");
    }

    #[test]
    fn test_date_only_name_kept() {
        // Nothing left after stripping, so the original stem survives.
        assert_eq!(derive("2024-01-15.md"), "2024-01-15");
    }

    #[test]
    fn test_numeric_name_untouched() {
        assert_eq!(derive("12345.md"), "12345");
    }

    #[test]
    fn test_extra_leading_dashes_collapsed() {
        assert_eq!(derive("2024-01-15--double-dash.md"), "double-dash");
    }

    #[test]
    fn test_non_md_extension_kept() {
        assert_eq!(derive("notes.txt"), "notes.txt");
    }
}
