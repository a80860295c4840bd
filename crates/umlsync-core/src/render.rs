//! Renderer boundary.
//!
//! [`Renderer`] turns diagram source into image bytes. [`ProcessRenderer`]
//! runs an external program (`plantuml -pipe` by default) that reads source on
//! stdin and writes the image to stdout.

use std::future::Future;
use std::io;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Marker the renderer prints for invalid diagram source.
const SYNTAX_ERROR_MARKER: &str = "syntax error";

/// Error from a single renderer invocation.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The diagram source is invalid. Only this diagram is affected.
    #[error("syntax error: {message}")]
    Syntax { message: String },

    /// The renderer program could not be started.
    #[error("failed to start renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The renderer exited unsuccessfully without reporting a syntax error.
    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// Talking to the renderer process failed.
    #[error("renderer I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RenderError {
    /// Whether the run can continue after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

/// Turns diagram source into an image.
pub trait Renderer: Send + Sync {
    /// Render `source`, returning the image bytes.
    fn render(&self, source: &str) -> impl Future<Output = Result<Vec<u8>, RenderError>> + Send;
}

/// Renders by piping source through an external program.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: String,
    args: Vec<String>,
}

impl ProcessRenderer {
    /// Create a renderer running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Arguments that make `plantuml` read stdin and write `format` to stdout.
    #[must_use]
    pub fn plantuml_args(format: &str) -> Vec<String> {
        vec![
            format!("-t{format}"),
            "-pipe".to_owned(),
            "-charset".to_owned(),
            "UTF-8".to_owned(),
        ]
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Renderer for ProcessRenderer {
    async fn render(&self, source: &str) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("renderer stdin was not captured"))?;
        let mut input = String::with_capacity(source.len() + 1);
        input.push_str(source);
        input.push('\n');

        // Feed stdin while draining stdout so large diagrams cannot deadlock.
        let feed = async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if mentions_syntax_error(&stderr) || mentions_syntax_error(&stdout) {
                let message = if stderr.trim().is_empty() {
                    "renderer reported a syntax error".to_owned()
                } else {
                    stderr.trim().to_owned()
                };
                return Err(RenderError::Syntax { message });
            }
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }
        fed?;

        if !stderr.trim().is_empty() {
            tracing::warn!(program = %self.program, stderr = %stderr.trim(), "Renderer diagnostics");
        }
        Ok(output.stdout)
    }
}

fn mentions_syntax_error(text: &str) -> bool {
    text.to_ascii_lowercase().contains(SYNTAX_ERROR_MARKER)
}
