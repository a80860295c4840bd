//! Run-wide accumulator of live artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::hash::ContentHash;

/// A diagram the renderer rejected as syntactically invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    /// Document that contains the diagram.
    pub document: PathBuf,
    pub hash: ContentHash,
    /// Diagnostic text from the renderer.
    pub message: String,
}

/// Everything one run learns about which artifacts must exist.
///
/// Documents only append to the registry while they are processed; the
/// garbage collector reads it once, after the last document. Passing it by
/// `&mut` through the sequential document loop keeps a single writer.
#[derive(Debug, Default)]
pub struct RunRegistry {
    /// Live hashes and the documents declaring them.
    live: BTreeMap<ContentHash, BTreeSet<PathBuf>>,
    /// Hashes whose generation was requested but deliberately not performed.
    planned: BTreeSet<ContentHash>,
    failures: Vec<RenderFailure>,
}

impl RunRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `document` references the artifact for `hash`.
    pub fn declare(&mut self, hash: ContentHash, document: &Path) {
        self.live
            .entry(hash)
            .or_default()
            .insert(document.to_path_buf());
    }

    /// Record a generation request that a dry run skipped.
    pub fn plan(&mut self, hash: ContentHash) {
        self.planned.insert(hash);
    }

    /// Record a per-artifact render failure.
    pub fn record_failure(&mut self, failure: RenderFailure) {
        self.failures.push(failure);
    }

    /// Whether any processed document references `hash`.
    #[must_use]
    pub fn is_live(&self, hash: &ContentHash) -> bool {
        self.live.contains_key(hash)
    }

    /// All live hashes in sorted order.
    pub fn live_hashes(&self) -> impl Iterator<Item = &ContentHash> {
        self.live.keys()
    }

    /// Documents that declared `hash`.
    pub fn documents(&self, hash: &ContentHash) -> impl Iterator<Item = &Path> {
        self.live
            .get(hash)
            .into_iter()
            .flat_map(|docs| docs.iter().map(PathBuf::as_path))
    }

    /// Render failures recorded during the run.
    #[must_use]
    pub fn failures(&self) -> &[RenderFailure] {
        &self.failures
    }

    /// Whether the absence of the artifact for `hash` is accounted for by
    /// this run: it failed to render, or a dry run skipped rendering it.
    #[must_use]
    pub fn absence_explained(&self, hash: &ContentHash) -> bool {
        self.planned.contains(hash) || self.failures.iter().any(|f| &f.hash == hash)
    }

    /// Number of live hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
