use std::process::Command;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Human-readable rendering used for the per-step command log.
    pub fn describe(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push('"');
                out.push_str(arg.as_str());
                out.push('"');
            } else {
                out.push_str(arg.as_str());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait PipelineCommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PipelineRuntimeError>;
}

#[derive(Debug, Default, Clone)]
pub struct StdPipelineCommandRunner;

impl PipelineCommandRunner for StdPipelineCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PipelineRuntimeError> {
        let mut command = Command::new(spec.program.as_str());
        command.args(spec.args.iter().map(String::as_str));
        let output = command.output().map_err(|source| PipelineRuntimeError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).to_string(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineRuntimeError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_quotes_arguments_with_whitespace() {
        let spec = CommandSpec::new(
            "magick",
            vec![
                String::from("in.png"),
                String::from("-annotate"),
                String::from("+10+10"),
                String::from("hello world"),
                String::from("out.png"),
            ],
        );
        assert_eq!(
            spec.describe(),
            "magick in.png -annotate +10+10 \"hello world\" out.png"
        );
    }

    #[test]
    fn std_runner_reports_spawn_failure_for_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-7f3a", Vec::new());
        let err = StdPipelineCommandRunner
            .run(&spec)
            .expect_err("missing binary should fail to spawn");
        match err {
            PipelineRuntimeError::Spawn { program, .. } => {
                assert_eq!(program, "definitely-not-a-real-binary-7f3a");
            }
        }
    }
}
