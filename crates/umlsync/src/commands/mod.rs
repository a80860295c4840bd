//! CLI command implementations.

pub(crate) mod check;
pub(crate) mod sync;

use std::path::{Path, PathBuf};

use clap::Args;
use umlsync_config::{CliSettings, Config};
use umlsync_core::{AssetStore, ProcessRenderer, SyncEngine, SyncOptions, discover_documents};

use crate::error::CliError;
use crate::output::Output;

pub(crate) use check::CheckArgs;
pub(crate) use sync::SyncArgs;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct SourceArgs {
    /// Path to configuration file (default: auto-discover umlsync.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory documents are discovered in (overrides config).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Glob pattern selecting documents, relative to the root (overrides config).
    #[arg(short, long)]
    pattern: Option<String>,

    /// Directory rendered diagrams are written to (overrides config).
    #[arg(short, long, env = "UMLSYNC_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Enable verbose output (per-document progress logs).
    #[arg(short, long)]
    pub verbose: bool,
}

/// A configured engine and the documents it should process.
pub(crate) struct Prepared {
    pub engine: SyncEngine<ProcessRenderer>,
    pub documents: Vec<PathBuf>,
}

impl SourceArgs {
    /// Load configuration, discover documents and build the engine.
    ///
    /// The output directory is created unless `options.dry_run` is set.
    pub(crate) async fn prepare(
        self,
        options: SyncOptions,
        output: &Output,
    ) -> Result<Prepared, CliError> {
        let cli_settings = CliSettings {
            root: self.root,
            pattern: self.pattern,
            output_dir: self.output_dir,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            output.info(&format!("Using {}", display(path)));
        }

        let format = config.assets.format.extension();
        let mut store =
            AssetStore::open(&config.assets.output_dir, format, !options.dry_run).await?;
        if let Some(prefix) = &config.assets.url_prefix {
            store = store.with_url_prefix(prefix);
        }

        let args = config
            .renderer
            .args
            .clone()
            .unwrap_or_else(|| ProcessRenderer::plantuml_args(format));
        let renderer = ProcessRenderer::new(config.renderer.command.clone(), args);

        let documents = discover_documents(
            &config.docs.root,
            &config.docs.pattern,
            &config.docs.exclude,
        )?;
        output.info(&format!(
            "Found {} document(s) matching {} in {}",
            documents.len(),
            config.docs.pattern,
            display(&config.docs.root)
        ));

        Ok(Prepared {
            engine: SyncEngine::new(renderer, store, options),
            documents,
        })
    }
}

/// Path relative to the working directory when it is below it.
pub(crate) fn display(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| {
            let cwd = cwd.canonicalize().unwrap_or(cwd);
            path.strip_prefix(&cwd).ok().map(Path::to_path_buf)
        })
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_outside_cwd_is_unchanged() {
        assert_eq!(
            display(Path::new("/nonexistent-root/docs/a.md")),
            "/nonexistent-root/docs/a.md"
        );
    }

    #[test]
    fn test_display_below_cwd_is_relative() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let expected = Path::new("docs").join("a.md");
        assert_eq!(
            display(&cwd.join("docs").join("a.md")),
            expected.display().to_string()
        );
    }
}
