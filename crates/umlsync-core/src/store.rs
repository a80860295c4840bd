//! Content-addressed asset store.
//!
//! All artifacts live in one directory as `<hash>.<format>`.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::SyncError;
use crate::hash::ContentHash;

/// The shared output directory for rendered diagrams.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
    format: String,
    url_prefix: Option<String>,
}

/// A file in the output directory with the store's extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub path: PathBuf,
    /// File name without the extension.
    pub stem: String,
}

impl StoredAsset {
    /// The hash encoded in the file name, if it is one.
    #[must_use]
    pub fn hash(&self) -> Option<ContentHash> {
        ContentHash::parse(&self.stem)
    }
}

impl AssetStore {
    /// Open the store at `dir` for artifacts with extension `format`.
    ///
    /// With `create`, the directory is created if needed. The path is made
    /// absolute (and canonical when it exists) so asset links can be computed
    /// relative to canonical document paths.
    pub async fn open(
        dir: impl Into<PathBuf>,
        format: impl Into<String>,
        create: bool,
    ) -> Result<Self, SyncError> {
        let dir = dir.into();
        if create {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| SyncError::io(&dir, e))?;
        }
        let dir = match tokio::fs::canonicalize(&dir).await {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                std::path::absolute(&dir).map_err(|e| SyncError::io(&dir, e))?
            }
            Err(e) => return Err(SyncError::io(&dir, e)),
        };

        Ok(Self {
            dir,
            format: format.into(),
            url_prefix: None,
        })
    }

    /// Link assets as `<prefix>/<file>` instead of relative to each document.
    #[must_use]
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.url_prefix = Some(prefix.trim_end_matches('/').to_owned());
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// File name of the artifact for `hash`.
    #[must_use]
    pub fn file_name(&self, hash: &ContentHash) -> String {
        format!("{hash}.{}", self.format)
    }

    #[must_use]
    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(self.file_name(hash))
    }

    /// Image target for the artifact of `hash` as seen from `document_dir`.
    #[must_use]
    pub fn link_from(&self, document_dir: &Path, hash: &ContentHash) -> String {
        let file = self.file_name(hash);
        match &self.url_prefix {
            Some(prefix) => format!("{prefix}/{file}"),
            None => relative_link(document_dir, &self.dir.join(file)),
        }
    }

    /// Write rendered bytes for `hash`.
    ///
    /// Bytes go to a hidden temporary file first and are renamed into place, so
    /// an interrupted run never leaves a truncated artifact under a valid name.
    /// The temporary file is removed again when either step fails.
    pub async fn write(&self, hash: &ContentHash, bytes: &[u8]) -> Result<(), SyncError> {
        let target = self.path_for(hash);
        let staging = self.dir.join(format!(".{}.tmp", self.file_name(hash)));
        let staged = match tokio::fs::write(&staging, bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &target)
                .await
                .map_err(|e| SyncError::io(&target, e)),
            Err(e) => Err(SyncError::io(&staging, e)),
        };
        if staged.is_err()
            && let Err(e) = tokio::fs::remove_file(&staging).await
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %staging.display(),
                error = %e,
                "Cannot remove temporary asset file"
            );
        }
        staged
    }

    /// List files carrying the store's extension. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<StoredAsset>, SyncError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(&self.dir, e)),
        };

        let mut assets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::io(&self.dir, e))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            let matches_format = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.format));
            if !is_file || !matches_format {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            assets.push(StoredAsset { path, stem });
        }
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(assets)
    }

    /// Delete an asset file.
    pub async fn remove(&self, asset: &StoredAsset) -> Result<(), SyncError> {
        tokio::fs::remove_file(&asset.path)
            .await
            .map_err(|e| SyncError::io(&asset.path, e))
    }
}

/// Path of `target` relative to `from_dir`, joined with forward slashes.
///
/// Both paths are compared component by component without touching the
/// filesystem.
fn relative_link(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component<'_>> = from_dir.components().collect();
    let to: Vec<Component<'_>> = target.components().collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let ups = std::iter::repeat_n("..".to_owned(), from.len() - common);
    let downs = to[common..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}
