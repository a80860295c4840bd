//! Markdown document discovery.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::SyncError;

/// Find documents under `root` matching `pattern`.
///
/// # Arguments
///
/// * `root` - Directory the pattern is relative to
/// * `pattern` - Glob pattern such as `**/*.md`
/// * `exclude` - Directory or file names; any path with a matching component
///   below `root` is skipped
///
/// Returns regular files in sorted order.
///
/// # Errors
///
/// Returns [`SyncError::Pattern`] if the pattern is invalid or `root` is not
/// valid UTF-8.
pub fn discover_documents(
    root: &Path,
    pattern: &str,
    exclude: &[String],
) -> Result<Vec<PathBuf>, SyncError> {
    let invalid = |message: String| SyncError::Pattern {
        pattern: pattern.to_owned(),
        message,
    };
    let root_str = root
        .to_str()
        .ok_or_else(|| invalid(format!("root {} is not valid UTF-8", root.display())))?;
    let full = format!(
        "{}/{}",
        Pattern::escape(root_str.trim_end_matches('/')),
        pattern.trim_start_matches("./")
    );

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let entries = glob::glob_with(&full, options).map_err(|e| invalid(e.to_string()))?;

    let mut documents = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path");
                continue;
            }
        };
        if !path.is_file() || is_excluded(root, &path, exclude) {
            continue;
        }
        documents.push(path);
    }
    documents.sort();
    Ok(documents)
}

fn is_excluded(root: &Path, path: &Path, exclude: &[String]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| {
        let name = component.as_os_str();
        exclude.iter().any(|ex| name == ex.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "# Doc\n").unwrap();
    }

    fn relative(root: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_discovers_sorted_markdown() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "z.md");
        touch(temp.path(), "a.md");
        touch(temp.path(), "guide/intro.md");
        touch(temp.path(), "guide/diagram.puml");

        let found = discover_documents(temp.path(), "**/*.md", &[]).unwrap();

        assert_eq!(
            relative(temp.path(), found),
            vec!["a.md", "guide/intro.md", "z.md"]
        );
    }

    #[test]
    fn test_excluded_components_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "docs/a.md");
        touch(temp.path(), "node_modules/pkg/readme.md");
        touch(temp.path(), "docs/target/b.md");

        let exclude = vec!["node_modules".to_owned(), "target".to_owned()];
        let found = discover_documents(temp.path(), "**/*.md", &exclude).unwrap();

        assert_eq!(relative(temp.path(), found), vec!["docs/a.md"]);
    }

    #[test]
    fn test_pattern_is_relative_to_root() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "docs/a.md");
        touch(temp.path(), "b.md");

        let found = discover_documents(temp.path(), "./docs/*.md", &[]).unwrap();

        assert_eq!(relative(temp.path(), found), vec!["docs/a.md"]);
    }

    #[test]
    fn test_directories_are_not_documents() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("folder.md")).unwrap();

        let found = discover_documents(temp.path(), "*.md", &[]).unwrap();

        assert!(found.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = tempfile::tempdir().unwrap();

        let err = discover_documents(temp.path(), "[", &[]).unwrap_err();

        assert!(matches!(err, SyncError::Pattern { ref pattern, .. } if pattern == "["));
    }
}
