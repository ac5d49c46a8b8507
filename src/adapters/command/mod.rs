//! Adapters that drive external commands over stdin/stdout.
//!
//! The transform under test and the change proposer are both arbitrary
//! executables; the quality gate only ever talks to them through pipes.

mod proposer;
mod transform;

pub use proposer::{CommandProposer, ProposerRequest};
pub use transform::CommandTransform;

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::errors::TransformError;

/// Program plus fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Write `input` to the command's stdin and return its stdout.
///
/// The child is killed when the timeout elapses or the future is dropped.
pub(crate) async fn run_with_stdin(
    spec: &CommandSpec,
    input: &str,
) -> Result<String, TransformError> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransformError::Process(format!("failed to spawn {}: {e}", spec.program)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| TransformError::Process("child stdin unavailable".to_string()))?;
    let payload = input.as_bytes().to_vec();
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&payload).await;
        drop(stdin);
        result
    });

    let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| TransformError::Process(e.to_string()))?,
        Err(_) => return Err(TransformError::Timeout(spec.timeout.as_secs())),
    };

    // A child that exits without reading stdin closes the pipe early; only
    // its exit status matters then.
    if let Ok(Err(e)) = writer.await {
        tracing::debug!(program = %spec.program, error = %e, "stdin write ended early");
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransformError::Process(format!(
            "{} exited with {}: {}",
            spec.program,
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| TransformError::InvalidOutput(format!("stdout is not UTF-8: {e}")))
}
