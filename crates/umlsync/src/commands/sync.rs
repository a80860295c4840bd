//! `umlsync sync` command implementation.

use clap::Args;
use umlsync_core::{RunReport, SyncOptions};

use super::{SourceArgs, display};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the sync command.
#[derive(Args)]
pub(crate) struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Regenerate every diagram, including ones whose annotation is current.
    #[arg(long)]
    rewrite_all: bool,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the run hits a fatal error.
    /// Diagrams with syntax errors are reported as warnings only.
    pub(crate) async fn execute(self, output: &Output) -> Result<(), CliError> {
        let options = SyncOptions {
            rewrite_all: self.rewrite_all,
            dry_run: false,
        };
        let prepared = self.source.prepare(options, output).await?;
        let report = prepared.engine.run(&prepared.documents).await?;

        print_report(&report, output);
        Ok(())
    }
}

fn print_report(report: &RunReport, output: &Output) {
    for document in report.changed() {
        output.item(&format!("updated {}", display(&document.path)));
    }
    for path in &report.gc.orphaned {
        output.item(&format!("deleted {}", display(path)));
    }

    let failures: Vec<_> = report.failures().collect();
    for failure in &failures {
        output.warning(&format!(
            "Diagram {} in {} failed to render: {}",
            failure.hash,
            display(&failure.document),
            failure.message
        ));
    }

    let summary = format!(
        "{} document(s) updated, {} diagram(s) rendered, {} asset(s) deleted",
        report.changed().count(),
        report.rendered(),
        report.gc.orphaned.len()
    );
    if failures.is_empty() {
        output.success(&summary);
    } else {
        output.warning(&format!("{summary}, {} diagram(s) failed", failures.len()));
    }
}
