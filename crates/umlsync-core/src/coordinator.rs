//! Concurrent artifact generation for one document.

use std::collections::BTreeMap;
use std::path::Path;

use futures::future::join_all;

use crate::error::SyncError;
use crate::hash::ContentHash;
use crate::registry::RenderFailure;
use crate::render::Renderer;
use crate::store::AssetStore;

/// What happened to a document's generation requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Hashes whose artifact was written.
    pub rendered: Vec<ContentHash>,
    /// Diagrams the renderer rejected.
    pub failed: Vec<RenderFailure>,
}

enum Outcome {
    Rendered(ContentHash),
    Failed(RenderFailure),
}

/// Render every request concurrently and store the results.
///
/// All invocations are awaited before returning, so a fatal error from one
/// never leaves siblings running. Syntax errors are collected in the summary;
/// the first fatal error is returned once every invocation has finished.
pub async fn render_all<R: Renderer>(
    renderer: &R,
    store: &AssetStore,
    document: &Path,
    requests: &BTreeMap<ContentHash, String>,
) -> Result<RenderSummary, SyncError> {
    let tasks = requests.iter().map(|(hash, source)| async move {
        match renderer.render(source).await {
            Ok(bytes) => store.write(hash, &bytes).await.map(|()| {
                tracing::debug!(path = %document.display(), hash = %hash, "Rendered diagram");
                Outcome::Rendered(hash.clone())
            }),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    path = %document.display(),
                    hash = %hash,
                    error = %e,
                    "Diagram failed to render"
                );
                Ok(Outcome::Failed(RenderFailure {
                    document: document.to_path_buf(),
                    hash: hash.clone(),
                    message: e.to_string(),
                }))
            }
            Err(source) => Err(SyncError::Render {
                document: document.to_path_buf(),
                hash: hash.clone(),
                source,
            }),
        }
    });

    let mut summary = RenderSummary::default();
    let mut fatal = None;
    for result in join_all(tasks).await {
        match result {
            Ok(Outcome::Rendered(hash)) => summary.rendered.push(hash),
            Ok(Outcome::Failed(failure)) => summary.failed.push(failure),
            Err(e) if fatal.is_none() => fatal = Some(e),
            Err(e) => tracing::error!(error = %e, "Additional renderer failure"),
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}
