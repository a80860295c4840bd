//! `umlsync check` command implementation.

use clap::Args;
use umlsync_core::{RunReport, SyncOptions};

use super::{SourceArgs, display};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// Nothing is rendered, written or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::OutOfDate`] if `sync` would change anything, or
    /// another error if configuration fails or an asset is missing.
    pub(crate) async fn execute(self, output: &Output) -> Result<(), CliError> {
        let options = SyncOptions {
            rewrite_all: false,
            dry_run: true,
        };
        let prepared = self.source.prepare(options, output).await?;
        let report = prepared.engine.run(&prepared.documents).await?;

        let pending = pending_changes(&report, output);
        if pending > 0 {
            return Err(CliError::OutOfDate(pending));
        }
        output.success("Everything is up to date");
        Ok(())
    }
}

/// List what `sync` would do and return the number of changes.
fn pending_changes(report: &RunReport, output: &Output) -> usize {
    let mut pending = 0;
    for document in &report.documents {
        if document.changed {
            output.item(&format!(
                "would update {} ({} diagram(s) to render)",
                display(&document.path),
                document.rendered.len()
            ));
            pending += 1;
        } else if !document.rendered.is_empty() {
            output.item(&format!(
                "would render {} diagram(s) for {}",
                document.rendered.len(),
                display(&document.path)
            ));
            pending += 1;
        }
    }
    for path in &report.gc.orphaned {
        output.item(&format!("would delete {}", display(path)));
        pending += 1;
    }
    pending
}
