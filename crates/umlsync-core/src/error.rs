//! Run-level errors.
//!
//! Everything in [`SyncError`] aborts the run. Recoverable problems (an
//! unreadable diagram source file, a syntax error in one diagram) are logged
//! and recorded instead of being returned.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::hash::ContentHash;
use crate::render::RenderError;

/// Fatal error while synchronizing documents with the asset store.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Reading or writing a document or asset failed.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The renderer could not be run, or failed for a reason other than a
    /// diagram syntax error.
    #[error("renderer failed on {} for diagram {hash}: {source}", .document.display())]
    Render {
        document: PathBuf,
        hash: ContentHash,
        #[source]
        source: RenderError,
    },

    /// The document discovery pattern is invalid.
    #[error("invalid document pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// Assets declared by documents are absent from the output directory.
    #[error(
        "{} generated asset(s) missing: {}. Run again with --rewrite-all to rebuild every diagram",
        .missing.len(),
        MissingList(.missing)
    )]
    Integrity { missing: Vec<MissingAsset> },
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A live hash with no artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAsset {
    pub hash: ContentHash,
    /// Documents that reference the asset.
    pub documents: Vec<PathBuf>,
}

impl fmt::Display for MissingAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)?;
        if let Some((first, rest)) = self.documents.split_first() {
            write!(f, " (referenced by {}", first.display())?;
            for doc in rest {
                write!(f, ", {}", doc.display())?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

struct MissingList<'a>(&'a [MissingAsset]);

impl fmt::Display for MissingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, asset) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{asset}")?;
        }
        Ok(())
    }
}
