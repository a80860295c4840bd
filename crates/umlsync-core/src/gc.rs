//! Asset garbage collection and integrity check.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{MissingAsset, SyncError};
use crate::hash::ContentHash;
use crate::registry::RunRegistry;
use crate::store::AssetStore;

/// Whether orphaned artifacts are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcMode {
    Delete,
    /// List orphans without touching the filesystem.
    Report,
}

/// Result of a collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Artifacts still referenced by some document.
    pub kept: usize,
    /// Orphaned artifacts, deleted or (in report mode) deletable.
    pub orphaned: Vec<PathBuf>,
    /// Live hashes without an artifact whose absence this run explains.
    pub pending: Vec<ContentHash>,
}

/// Remove artifacts no document references, then verify every live hash
/// has an artifact.
///
/// Must run after every document of the run has been processed. A live
/// hash with no artifact is an integrity error unless the registry knows why
/// (it failed to render, or a dry run skipped rendering it).
pub async fn collect_garbage(
    store: &AssetStore,
    registry: &RunRegistry,
    mode: GcMode,
) -> Result<GcReport, SyncError> {
    let mut report = GcReport::default();
    let mut present = BTreeSet::new();

    for asset in store.list().await? {
        if let Some(hash) = asset.hash().filter(|h| registry.is_live(h)) {
            report.kept += 1;
            present.insert(hash);
            continue;
        }
        if mode == GcMode::Delete {
            store.remove(&asset).await?;
            tracing::info!(path = %asset.path.display(), "Deleted orphaned asset");
        }
        report.orphaned.push(asset.path);
    }

    let mut missing = Vec::new();
    for hash in registry.live_hashes().filter(|h| !present.contains(*h)) {
        if registry.absence_explained(hash) {
            report.pending.push(hash.clone());
            continue;
        }
        missing.push(MissingAsset {
            hash: hash.clone(),
            documents: registry.documents(hash).map(PathBuf::from).collect(),
        });
    }

    if !missing.is_empty() {
        return Err(SyncError::Integrity { missing });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RenderFailure;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    async fn store_with(temp: &tempfile::TempDir, sources: &[&str]) -> AssetStore {
        let store = AssetStore::open(temp.path(), "svg", true).await.unwrap();
        for source in sources {
            store.write(&ContentHash::of(source), b"<svg/>").await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_deletes_orphans_and_keeps_live() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_with(&temp, &["live", "orphan"]).await;
        std::fs::write(temp.path().join("stray.svg"), "x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "x").unwrap();
        let mut registry = RunRegistry::new();
        registry.declare(ContentHash::of("live"), Path::new("a.md"));

        let report = collect_garbage(&store, &registry, GcMode::Delete)
            .await
            .unwrap();

        assert_eq!(report.kept, 1);
        assert_eq!(report.orphaned.len(), 2);
        assert!(store.path_for(&ContentHash::of("live")).exists());
        assert!(!store.path_for(&ContentHash::of("orphan")).exists());
        assert!(!temp.path().join("stray.svg").exists());
        assert!(temp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_report_mode_deletes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_with(&temp, &["orphan"]).await;
        let registry = RunRegistry::new();

        let report = collect_garbage(&store, &registry, GcMode::Report)
            .await
            .unwrap();

        assert_eq!(report.orphaned, vec![store.path_for(&ContentHash::of("orphan"))]);
        assert!(store.path_for(&ContentHash::of("orphan")).exists());
    }

    #[tokio::test]
    async fn test_missing_live_asset_is_integrity_error() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_with(&temp, &[]).await;
        let mut registry = RunRegistry::new();
        let hash = ContentHash::of("gone");
        registry.declare(hash.clone(), Path::new("b.md"));
        registry.declare(hash.clone(), Path::new("a.md"));

        let err = collect_garbage(&store, &registry, GcMode::Delete)
            .await
            .unwrap_err();

        let SyncError::Integrity { missing } = err else {
            panic!("expected integrity error, got {err}");
        };
        assert_eq!(
            missing,
            vec![MissingAsset {
                hash,
                documents: vec![PathBuf::from("a.md"), PathBuf::from("b.md")],
            }]
        );
    }

    #[tokio::test]
    async fn test_explained_absence_is_pending() {
        let temp = tempfile::tempdir().unwrap();
        let store = store_with(&temp, &[]).await;
        let mut registry = RunRegistry::new();
        let failed = ContentHash::of("broken");
        let planned = ContentHash::of("planned");
        registry.declare(failed.clone(), Path::new("a.md"));
        registry.declare(planned.clone(), Path::new("a.md"));
        registry.record_failure(RenderFailure {
            document: PathBuf::from("a.md"),
            hash: failed.clone(),
            message: "syntax error".to_owned(),
        });
        registry.plan(planned.clone());

        let report = collect_garbage(&store, &registry, GcMode::Delete)
            .await
            .unwrap();

        let mut expected = vec![failed, planned];
        expected.sort();
        assert_eq!(report.pending, expected);
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let store = AssetStore::open(temp.path().join("none"), "svg", false)
            .await
            .unwrap();

        let report = collect_garbage(&store, &RunRegistry::new(), GcMode::Delete)
            .await
            .unwrap();

        assert_eq!(report, GcReport::default());
    }
}
