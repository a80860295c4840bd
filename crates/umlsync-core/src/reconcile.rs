//! Per-block reconciliation.
//!
//! Decides what each classified block becomes: kept verbatim, regenerated
//! with a fresh annotation, or passed through untouched because it is a
//! literal example or a broken reference.

use std::borrow::Cow;
use std::path::Path;

use crate::hash::ContentHash;
use crate::markup::{self, DEFAULT_CAPTION, DEFAULT_TOGGLE, InlineAttrs, SourceAnnotation};
use crate::scanner::{AnnotatedImage, AnnotatedSource, Block, BlockKind, FencedSource, RawImage};
use crate::store::AssetStore;

/// What happens to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Already up to date; emitted verbatim.
    Unchanged,
    /// Annotation rewritten and an artifact requested.
    Regenerate,
    /// Literal example; emitted verbatim and never hashed.
    SkipLiteral,
    /// Reference that could not be resolved; emitted verbatim.
    Broken,
}

/// Artifact the renderer must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub hash: ContentHash,
    /// Diagram source without trailing line breaks.
    pub source: String,
}

/// Outcome of reconciling one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled<'t> {
    pub decision: Decision,
    /// Text that replaces the block in the document.
    pub replacement: Cow<'t, str>,
    /// Hash the document keeps referencing after this block.
    pub live: Option<ContentHash>,
    /// Present only for [`Decision::Regenerate`].
    pub request: Option<GenerationRequest>,
}

impl<'t> Reconciled<'t> {
    fn verbatim(block: &Block<'t>, decision: Decision, live: Option<ContentHash>) -> Self {
        Self {
            decision,
            replacement: Cow::Borrowed(block.text),
            live,
            request: None,
        }
    }

    fn regenerate(markup: String, hash: ContentHash, source: &str) -> Self {
        Self {
            decision: Decision::Regenerate,
            replacement: Cow::Owned(markup),
            live: Some(hash.clone()),
            request: Some(GenerationRequest {
                hash,
                source: source.to_owned(),
            }),
        }
    }
}

/// Reconciles the blocks of one document.
#[derive(Debug)]
pub struct Reconciler<'a> {
    document: &'a Path,
    dir: &'a Path,
    store: &'a AssetStore,
    rewrite_all: bool,
}

impl<'a> Reconciler<'a> {
    /// `document` should be absolute so asset links resolve against its directory.
    #[must_use]
    pub fn new(document: &'a Path, store: &'a AssetStore, rewrite_all: bool) -> Self {
        Self {
            document,
            dir: document.parent().unwrap_or(Path::new("")),
            store,
            rewrite_all,
        }
    }

    #[must_use]
    pub fn document(&self) -> &Path {
        self.document
    }

    pub async fn reconcile<'t>(&self, block: &Block<'t>) -> Reconciled<'t> {
        match &block.kind {
            BlockKind::Literal => Reconciled::verbatim(block, Decision::SkipLiteral, None),
            BlockKind::RawSource(body) => self.source_block(block, None, body),
            BlockKind::AnnotatedSource(annotated) => {
                self.source_block(block, Some(annotated), &annotated.body)
            }
            BlockKind::RawImage(image) => self.raw_image(block, image).await,
            BlockKind::AnnotatedImage(image) => self.annotated_image(block, image).await,
        }
    }

    fn source_block<'t>(
        &self,
        block: &Block<'t>,
        annotated: Option<&AnnotatedSource<'t>>,
        body: &FencedSource<'t>,
    ) -> Reconciled<'t> {
        let hash = ContentHash::of(body.source);

        if let Some(annotated) = annotated
            && !self.rewrite_all
            && ContentHash::parse(annotated.stored_hash).as_ref() == Some(&hash)
        {
            return Reconciled::verbatim(block, Decision::Unchanged, Some(hash));
        }

        let attrs = InlineAttrs::parse(body.info);
        if !attrs.unknown.is_empty() {
            tracing::warn!(
                path = %self.document.display(),
                attributes = ?attrs.unknown,
                "Ignoring unknown diagram attributes"
            );
        }
        let stored_caption = annotated.map(|a| markup::unescape_alt(a.caption));
        let stored_toggle = annotated.map(|a| markup::unescape_html(a.toggle));
        let caption = markup::resolve(
            attrs.caption.as_deref(),
            stored_caption.as_deref(),
            DEFAULT_CAPTION,
        );
        let toggle = markup::resolve(
            attrs.toggle.as_deref(),
            stored_toggle.as_deref(),
            DEFAULT_TOGGLE,
        );
        let asset_link = self.store.link_from(self.dir, &hash);

        let markup = markup::annotated_source(&SourceAnnotation {
            hash: hash.as_str(),
            caption,
            toggle,
            asset_link: &asset_link,
            fence: body.fence,
            info: body.info,
            source: body.source,
            line_ending: block.line_ending,
        });
        Reconciled::regenerate(markup, hash, body.source)
    }

    async fn raw_image<'t>(&self, block: &Block<'t>, image: &RawImage<'t>) -> Reconciled<'t> {
        match self.read_source(image.path).await {
            Some(source) => self.image_reference(block, image.path, image.caption, &source),
            None => Reconciled::verbatim(block, Decision::Broken, None),
        }
    }

    async fn annotated_image<'t>(
        &self,
        block: &Block<'t>,
        image: &AnnotatedImage<'t>,
    ) -> Reconciled<'t> {
        let stored = ContentHash::parse(image.stored_hash);

        if !self.rewrite_all
            && let Some(hash) = stored.clone()
        {
            tracing::debug!(
                path = %self.document.display(),
                hash = %hash,
                "Keeping image reference without re-reading its source"
            );
            return Reconciled::verbatim(block, Decision::Unchanged, Some(hash));
        }

        let Some(source_path) = image.source_path else {
            tracing::warn!(
                path = %self.document.display(),
                stored = image.stored_hash,
                "Image annotation records no source file, leaving it as is"
            );
            return Reconciled::verbatim(block, Decision::Broken, stored);
        };
        match self.read_source(source_path).await {
            Some(source) => self.image_reference(block, source_path, image.caption, &source),
            None => Reconciled::verbatim(block, Decision::Broken, stored),
        }
    }

    fn image_reference<'t>(
        &self,
        block: &Block<'_>,
        source_path: &str,
        caption: &str,
        source: &str,
    ) -> Reconciled<'t> {
        let hash = ContentHash::of(source);
        let caption = markup::unescape_alt(caption);
        let caption = markup::resolve(None, Some(&*caption), DEFAULT_CAPTION);
        let asset_link = self.store.link_from(self.dir, &hash);
        let markup = markup::annotated_image(
            hash.as_str(),
            source_path,
            caption,
            &asset_link,
            block.line_ending,
        );
        Reconciled::regenerate(markup, hash, source)
    }

    /// Read a diagram source file relative to the document's directory.
    ///
    /// Failures are logged and reported as `None`.
    async fn read_source(&self, relative: &str) -> Option<String> {
        let path = self.dir.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text.trim_end_matches(['\r', '\n']).to_owned()),
            Err(e) => {
                tracing::warn!(
                    path = %self.document.display(),
                    file = %path.display(),
                    error = %e,
                    "Cannot read referenced diagram source"
                );
                None
            }
        }
    }
}
