//! Incremental diagram synchronization for markdown documents.
//!
//! Documents embed `PlantUML` diagrams as fenced source blocks or as image
//! references to `.puml` files. A run rewrites each diagram into an annotated
//! form carrying the content hash of its source and a link to a rendered
//! artifact named by that hash, renders only artifacts whose source changed,
//! and removes artifacts no document references anymore.
//!
//! # Architecture
//!
//! - [`scan`]: splits a document into verbatim text and classified blocks
//! - [`Reconciler`]: decides per block whether to keep, regenerate or skip it
//! - [`rewrite`]: splices replacements into the new document text
//! - [`render_all`]: renders a document's artifacts concurrently
//! - [`collect_garbage`]: deletes orphaned artifacts and checks integrity
//! - [`SyncEngine`]: runs the above over a list of documents
//!
//! # Example
//!
//! ```ignore
//! use umlsync_core::{AssetStore, ProcessRenderer, SyncEngine, SyncOptions};
//!
//! let store = AssetStore::open("docs/generated-assets", "svg", true).await?;
//! let renderer = ProcessRenderer::new("plantuml", ProcessRenderer::plantuml_args("svg"));
//! let engine = SyncEngine::new(renderer, store, SyncOptions::default());
//! let report = engine.run(&documents).await?;
//! ```

mod coordinator;
mod discover;
mod engine;
mod error;
mod gc;
mod hash;
mod markup;
mod reconcile;
mod registry;
mod render;
mod rewriter;
mod scanner;
mod store;

pub use coordinator::{RenderSummary, render_all};
pub use discover::discover_documents;
pub use engine::{DocumentReport, RunReport, SyncEngine, SyncOptions};
pub use error::{MissingAsset, SyncError};
pub use gc::{GcMode, GcReport, collect_garbage};
pub use hash::ContentHash;
pub use markup::{DEFAULT_CAPTION, DEFAULT_TOGGLE, DIAGRAM_LANGUAGES, InlineAttrs, SOURCE_EXTENSIONS};
pub use reconcile::{Decision, GenerationRequest, Reconciled, Reconciler};
pub use registry::{RenderFailure, RunRegistry};
pub use render::{ProcessRenderer, RenderError, Renderer};
pub use rewriter::{DecisionCounts, Rewrite, persist, rewrite};
pub use scanner::{
    AnnotatedImage, AnnotatedSource, Block, BlockKind, FencedSource, RawImage, Scanner, Segment,
    scan,
};
pub use store::{AssetStore, StoredAsset};
