use async_trait::async_trait;

use super::{run_with_stdin, CommandSpec};
use crate::domain::errors::TransformError;
use crate::domain::ports::Transform;

/// Transform backed by an external command: input on stdin, output on stdout.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    spec: CommandSpec,
}

impl CommandTransform {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn transform(&self, input: &str) -> Result<String, TransformError> {
        let output = run_with_stdin(&self.spec, input).await?;
        // Shell-style tools terminate their output with a newline.
        Ok(output.strip_suffix('\n').unwrap_or(&output).to_string())
    }
}
