//! Document rewriting.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::SyncError;
use crate::hash::ContentHash;
use crate::reconcile::{Decision, Reconciler};
use crate::scanner::{Segment, scan};

/// Number of blocks per decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub unchanged: usize,
    pub regenerated: usize,
    pub literal: usize,
    pub broken: usize,
}

impl DecisionCounts {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Unchanged => self.unchanged += 1,
            Decision::Regenerate => self.regenerated += 1,
            Decision::SkipLiteral => self.literal += 1,
            Decision::Broken => self.broken += 1,
        }
    }

    /// Total number of classified blocks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.unchanged + self.regenerated + self.literal + self.broken
    }
}

/// Result of rewriting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// Whether `text` differs from the original.
    pub changed: bool,
    /// Artifacts to generate, one per distinct hash.
    pub requests: BTreeMap<ContentHash, String>,
    /// Hashes the document references after the rewrite.
    pub live: BTreeSet<ContentHash>,
    pub counts: DecisionCounts,
}

/// Reconcile every block of `original` in document order and splice the
/// replacements into a new text.
pub async fn rewrite(original: &str, reconciler: &Reconciler<'_>) -> Rewrite {
    let mut text = String::with_capacity(original.len());
    let mut requests = BTreeMap::new();
    let mut live = BTreeSet::new();
    let mut counts = DecisionCounts::default();

    for segment in scan(original) {
        let block = match segment {
            Segment::Text(verbatim) => {
                text.push_str(verbatim);
                continue;
            }
            Segment::Block(block) => block,
        };

        let reconciled = reconciler.reconcile(&block).await;
        counts.record(reconciled.decision);
        text.push_str(&reconciled.replacement);
        if let Some(hash) = reconciled.live {
            live.insert(hash);
        }
        if let Some(request) = reconciled.request {
            requests.entry(request.hash).or_insert(request.source);
        }
    }

    let changed = ContentHash::of(&text) != ContentHash::of(original);
    Rewrite {
        text,
        changed,
        requests,
        live,
        counts,
    }
}

/// Write the rewritten text to `path` if it changed. Returns whether it wrote.
pub async fn persist(path: &Path, rewrite: &Rewrite) -> Result<bool, SyncError> {
    if !rewrite.changed {
        return Ok(false);
    }
    tokio::fs::write(path, &rewrite.text)
        .await
        .map_err(|e| SyncError::io(path, e))?;
    tracing::info!(path = %path.display(), "Updated document");
    Ok(true)
}
