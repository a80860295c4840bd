//! Run orchestration.
//!
//! A run processes documents one at a time. For each document the rewriter
//! computes the new text, the coordinator renders the requested artifacts
//! concurrently, and only then is the document written. Garbage collection
//! runs once, after the last document.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::coordinator::render_all;
use crate::error::SyncError;
use crate::gc::{GcMode, GcReport, collect_garbage};
use crate::hash::ContentHash;
use crate::reconcile::Reconciler;
use crate::registry::{RenderFailure, RunRegistry};
use crate::render::Renderer;
use crate::rewriter::{DecisionCounts, persist, rewrite};
use crate::store::AssetStore;

/// Flags for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Regenerate every diagram even when its annotation is current.
    pub rewrite_all: bool,
    /// Compute changes without rendering, writing or deleting anything.
    pub dry_run: bool,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub path: PathBuf,
    /// Whether the text changed (and, outside a dry run, was written).
    pub changed: bool,
    pub counts: DecisionCounts,
    /// Artifacts written, or in a dry run, that would be rendered.
    pub rendered: Vec<ContentHash>,
    pub failed: Vec<RenderFailure>,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub documents: Vec<DocumentReport>,
    pub gc: GcReport,
}

impl RunReport {
    /// Documents whose text changed.
    pub fn changed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.changed)
    }

    /// Every diagram the renderer rejected.
    pub fn failures(&self) -> impl Iterator<Item = &RenderFailure> {
        self.documents.iter().flat_map(|d| &d.failed)
    }

    /// Total number of artifacts rendered (or planned, in a dry run).
    #[must_use]
    pub fn rendered(&self) -> usize {
        self.documents.iter().map(|d| d.rendered.len()).sum()
    }

    /// Whether the run changed, or in a dry run would change, anything on disk.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.changed().next().is_some() || self.rendered() > 0 || !self.gc.orphaned.is_empty()
    }
}

/// Keeps documents and the asset store in sync.
#[derive(Debug)]
pub struct SyncEngine<R> {
    renderer: R,
    store: AssetStore,
    options: SyncOptions,
}

impl<R: Renderer> SyncEngine<R> {
    #[must_use]
    pub fn new(renderer: R, store: AssetStore, options: SyncOptions) -> Self {
        Self {
            renderer,
            store,
            options,
        }
    }

    #[must_use]
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Process `documents` in order, then collect garbage.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. Documents processed before it keep
    /// their changes; garbage collection does not run.
    pub async fn run(&self, documents: &[PathBuf]) -> Result<RunReport, SyncError> {
        let mut registry = RunRegistry::new();
        let mut reports = Vec::with_capacity(documents.len());

        for path in documents {
            reports.push(self.sync_document(path, &mut registry).await?);
        }

        let mode = if self.options.dry_run {
            GcMode::Report
        } else {
            GcMode::Delete
        };
        let gc = collect_garbage(&self.store, &registry, mode).await?;

        tracing::info!(
            documents = reports.len(),
            live = registry.len(),
            kept = gc.kept,
            orphaned = gc.orphaned.len(),
            "Sync finished"
        );
        Ok(RunReport {
            documents: reports,
            gc,
        })
    }

    /// Reconcile one document, render its new artifacts and write it back.
    ///
    /// The document's live hashes are declared in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written, an
    /// artifact cannot be stored, or the renderer fails for a reason other
    /// than a syntax error. The document is left untouched in that case.
    pub async fn sync_document(
        &self,
        path: &Path,
        registry: &mut RunRegistry,
    ) -> Result<DocumentReport, SyncError> {
        let path = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let original = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::io(&path, e))?;

        let reconciler = Reconciler::new(&path, &self.store, self.options.rewrite_all);
        let rewritten = rewrite(&original, &reconciler).await;

        let (rendered, failed) = if self.options.dry_run {
            for hash in rewritten.requests.keys() {
                registry.plan(hash.clone());
            }
            (rewritten.requests.keys().cloned().collect(), Vec::new())
        } else {
            let summary = render_all(&self.renderer, &self.store, &path, &rewritten.requests).await?;
            for failure in &summary.failed {
                registry.record_failure(failure.clone());
            }
            (summary.rendered, summary.failed)
        };

        declare_live(registry, &rewritten.live, &path);

        let changed = if self.options.dry_run {
            rewritten.changed
        } else {
            persist(&path, &rewritten).await?
        };

        tracing::debug!(
            path = %path.display(),
            changed,
            blocks = rewritten.counts.total(),
            rendered = rendered.len(),
            failed = failed.len(),
            "Processed document"
        );
        Ok(DocumentReport {
            path,
            changed,
            counts: rewritten.counts,
            rendered,
            failed,
        })
    }
}

fn declare_live(registry: &mut RunRegistry, live: &BTreeSet<ContentHash>, document: &Path) {
    for hash in live {
        registry.declare(hash.clone(), document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubRenderer;
    use pretty_assertions::assert_eq;

    struct Workspace {
        _temp: tempfile::TempDir,
        root: PathBuf,
        store: AssetStore,
    }

    impl Workspace {
        async fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let root = temp.path().canonicalize().unwrap();
            std::fs::create_dir(root.join("docs")).unwrap();
            let store = AssetStore::open(root.join("docs/generated-assets"), "svg", true)
                .await
                .unwrap();
            Self {
                _temp: temp,
                root,
                store,
            }
        }

        fn write(&self, relative: &str, text: &str) -> PathBuf {
            let path = self.root.join(relative);
            std::fs::write(&path, text).unwrap();
            path
        }

        fn read(&self, relative: &str) -> String {
            std::fs::read_to_string(self.root.join(relative)).unwrap()
        }

        fn assets(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.store.dir())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        fn engine(&self, renderer: StubRenderer, options: SyncOptions) -> SyncEngine<StubRenderer> {
            SyncEngine::new(renderer, self.store.clone(), options)
        }
    }

    fn annotated(hash: &ContentHash, source: &str) -> String {
        format!(
            "<!-- puml:{hash} -->\n![UML](generated-assets/{hash}.svg)\n\n<details>\n<summary>PlantUML source</summary>\n\n```puml\n{source}\n```\n\n</details>"
        )
    }

    #[tokio::test]
    async fn test_raw_block_gains_annotation_and_artifact() {
        let ws = Workspace::new().await;
        let doc = ws.write("docs/guide.md", "# Guide\n\n```puml\nA--B;\n```\n");
        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());

        let report = engine.run(&[doc]).await.unwrap();

        let hash = ContentHash::of("A--B;");
        assert_eq!(
            ws.read("docs/guide.md"),
            format!("# Guide\n\n{}\n", annotated(&hash, "A--B;"))
        );
        assert_eq!(ws.assets(), vec![format!("{hash}.svg")]);
        assert_eq!(
            std::fs::read_to_string(ws.store.path_for(&hash)).unwrap(),
            "<svg>A--B;</svg>"
        );
        assert_eq!(engine.renderer().calls(), vec!["A--B;".to_owned()]);
        assert_eq!(report.documents[0].counts.regenerated, 1);
        assert!(report.documents[0].changed);
    }

    #[tokio::test]
    async fn test_stale_annotation_updated_and_orphan_collected() {
        let ws = Workspace::new().await;
        let old = ContentHash::of("A--B;");
        ws.store.write(&old, b"<svg>old</svg>").await.unwrap();
        let doc = ws.write(
            "docs/guide.md",
            &format!("{}\n", annotated(&old, "A--C;")),
        );
        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());

        let report = engine.run(&[doc]).await.unwrap();

        let new = ContentHash::of("A--C;");
        assert_eq!(ws.read("docs/guide.md"), format!("{}\n", annotated(&new, "A--C;")));
        assert_eq!(ws.assets(), vec![format!("{new}.svg")]);
        assert_eq!(report.gc.orphaned, vec![ws.store.path_for(&old)]);
        assert_eq!(report.gc.kept, 1);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let ws = Workspace::new().await;
        let doc = ws.write("docs/guide.md", "```puml\nA--B;\n```\n\n![](flow.puml)\n");
        ws.write("docs/flow.puml", "X--Y;\n");
        ws.engine(StubRenderer::new(), SyncOptions::default())
            .run(&[doc.clone()])
            .await
            .unwrap();
        let after_first = ws.read("docs/guide.md");
        let assets_first = ws.assets();

        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());
        let report = engine.run(&[doc]).await.unwrap();

        assert_eq!(ws.read("docs/guide.md"), after_first);
        assert_eq!(ws.assets(), assets_first);
        assert!(engine.renderer().calls().is_empty());
        assert!(!report.is_dirty());
    }

    #[tokio::test]
    async fn test_rewrite_all_renders_current_diagrams() {
        let ws = Workspace::new().await;
        let hash = ContentHash::of("A--B;");
        ws.store.write(&hash, b"<svg>stale</svg>").await.unwrap();
        let text = format!("{}\n", annotated(&hash, "A--B;"));
        let doc = ws.write("docs/guide.md", &text);
        let options = SyncOptions {
            rewrite_all: true,
            ..SyncOptions::default()
        };
        let engine = ws.engine(StubRenderer::new(), options);

        let report = engine.run(&[doc]).await.unwrap();

        assert_eq!(ws.read("docs/guide.md"), text);
        assert!(!report.documents[0].changed);
        assert_eq!(engine.renderer().calls(), vec!["A--B;".to_owned()]);
        assert_eq!(
            std::fs::read_to_string(ws.store.path_for(&hash)).unwrap(),
            "<svg>A--B;</svg>"
        );
    }

    #[tokio::test]
    async fn test_literal_blocks_are_never_touched() {
        let ws = Workspace::new().await;
        let text = "Example:\n\n    ```puml\n    A--B;\n    ```\n";
        let doc = ws.write("docs/guide.md", text);
        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());

        let report = engine.run(&[doc]).await.unwrap();

        assert_eq!(ws.read("docs/guide.md"), text);
        assert!(ws.assets().is_empty());
        assert!(engine.renderer().calls().is_empty());
        assert_eq!(report.documents[0].counts.literal, 1);
    }

    #[tokio::test]
    async fn test_broken_reference_does_not_stop_the_document() {
        let ws = Workspace::new().await;
        let doc = ws.write(
            "docs/guide.md",
            "![Gone](missing.puml)\n\n```puml\nA--B;\n```\n",
        );
        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());

        let report = engine.run(&[doc]).await.unwrap();

        let text = ws.read("docs/guide.md");
        assert!(text.starts_with("![Gone](missing.puml)\n\n<!-- puml:"));
        assert_eq!(report.documents[0].counts.broken, 1);
        assert_eq!(report.documents[0].counts.regenerated, 1);
    }

    #[tokio::test]
    async fn test_syntax_error_does_not_stop_other_documents() {
        let ws = Workspace::new().await;
        let first = ws.write("docs/a.md", "```puml\nbad\n```\n\n```puml\nA;\n```\n");
        let second = ws.write("docs/b.md", "```puml\nB;\n```\n");
        let engine = ws.engine(
            StubRenderer::new().with_syntax_error("bad"),
            SyncOptions::default(),
        );

        let report = engine.run(&[first, second]).await.unwrap();

        let bad = ContentHash::of("bad");
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].hash, bad);
        assert!(report.gc.pending.contains(&bad));
        assert_eq!(
            ws.assets(),
            {
                let mut expected = vec![
                    format!("{}.svg", ContentHash::of("A;")),
                    format!("{}.svg", ContentHash::of("B;")),
                ];
                expected.sort();
                expected
            }
        );
        assert!(ws.read("docs/a.md").contains(&format!("<!-- puml:{bad} -->")));
        assert!(ws.read("docs/b.md").starts_with("<!-- puml:"));
    }

    #[tokio::test]
    async fn test_missing_artifact_for_current_annotation_is_reported() {
        let ws = Workspace::new().await;
        let hash = ContentHash::of("A--B;");
        let doc = ws.write("docs/guide.md", &format!("{}\n", annotated(&hash, "A--B;")));
        let engine = ws.engine(StubRenderer::new(), SyncOptions::default());

        let err = engine.run(&[doc]).await.unwrap_err();

        let SyncError::Integrity { missing } = err else {
            panic!("expected integrity error, got {err}");
        };
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].hash, hash);
        assert_eq!(missing[0].documents, vec![ws.root.join("docs/guide.md")]);
    }

    #[tokio::test]
    async fn test_fatal_renderer_error_leaves_document_untouched() {
        let ws = Workspace::new().await;
        let text = "```puml\nA;\n```\n\n```puml\ncrash\n```\n";
        let doc = ws.write("docs/guide.md", text);
        let engine = ws.engine(
            StubRenderer::new().with_fatal_error("crash"),
            SyncOptions::default(),
        );

        let err = engine.run(&[doc]).await.unwrap_err();

        assert!(matches!(err, SyncError::Render { .. }));
        assert_eq!(ws.read("docs/guide.md"), text);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let ws = Workspace::new().await;
        let orphan = ContentHash::of("old");
        ws.store.write(&orphan, b"<svg/>").await.unwrap();
        let text = "```puml\nA--B;\n```\n";
        let doc = ws.write("docs/guide.md", text);
        let options = SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        };
        let engine = ws.engine(StubRenderer::new(), options);

        let report = engine.run(&[doc]).await.unwrap();

        assert_eq!(ws.read("docs/guide.md"), text);
        assert_eq!(ws.assets(), vec![format!("{orphan}.svg")]);
        assert!(engine.renderer().calls().is_empty());
        assert!(report.is_dirty());
        assert_eq!(report.changed().count(), 1);
        assert_eq!(report.documents[0].rendered, vec![ContentHash::of("A--B;")]);
        assert_eq!(report.gc.orphaned, vec![ws.store.path_for(&orphan)]);
    }

    #[tokio::test]
    async fn test_shared_diagram_across_documents_is_kept() {
        let ws = Workspace::new().await;
        let first = ws.write("docs/a.md", "```puml\nA--B;\n```\n");
        let second = ws.write("docs/b.md", "```puml\nA--B;\n```\n");
        let docs = [first, second];
        ws.engine(StubRenderer::new(), SyncOptions::default())
            .run(&docs)
            .await
            .unwrap();

        // Dropping the diagram from one document keeps the shared artifact.
        ws.write("docs/a.md", "No diagrams left.\n");
        let report = ws
            .engine(StubRenderer::new(), SyncOptions::default())
            .run(&docs)
            .await
            .unwrap();

        assert_eq!(ws.assets(), vec![format!("{}.svg", ContentHash::of("A--B;"))]);
        assert!(report.gc.orphaned.is_empty());
    }
}
