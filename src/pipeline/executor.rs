use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::pipeline::aliases::AliasTable;
use crate::pipeline::artifacts::{
    extension_of, final_artifact_name, temp_artifact_name, unique_token, ArtifactScope,
};
use crate::pipeline::engine::{EngineError, SharedTransformEngine};
use crate::pipeline::error::PipelineError;
use crate::pipeline::normalize::{normalize_operation, NormalizedOperation, OperationDescriptor};
use crate::pipeline::routines::{self, target_format, RoutineContext, StepOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub final_path: PathBuf,
    pub final_filename: String,
    pub commands: Vec<String>,
}

/// Runs an ordered list of operations against a seed image, one engine call per
/// step, threading each step's output into the next.
#[derive(Clone)]
pub struct PipelineExecutor {
    engine: SharedTransformEngine,
    aliases: Arc<AliasTable>,
    output_dir: PathBuf,
    uploads_dir: PathBuf,
    output_prefix: String,
}

impl PipelineExecutor {
    pub fn new(
        engine: SharedTransformEngine,
        aliases: Arc<AliasTable>,
        output_dir: impl Into<PathBuf>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            aliases,
            output_dir: output_dir.into(),
            uploads_dir: uploads_dir.into(),
            output_prefix: String::from("processed_"),
        }
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    pub async fn run(
        &self,
        seed: &Path,
        operations: &[OperationDescriptor],
    ) -> Result<PipelineResult, PipelineError> {
        if operations.is_empty() {
            return Err(PipelineError::InvalidRequest(String::from(
                "operations must contain at least one step",
            )));
        }

        let token = unique_token();
        let base_name = seed
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("image")
            .to_string();
        let last = operations.len() - 1;
        let mut scope = ArtifactScope::new();
        let mut current = seed.to_path_buf();
        let mut commands = Vec::with_capacity(operations.len());

        tracing::info!(
            seed = %seed.display(),
            steps = operations.len(),
            token = %token,
            "pipeline started"
        );

        for (step, descriptor) in operations.iter().enumerate() {
            let operation =
                normalize_operation(&self.aliases, descriptor).map_err(|err| err.at_step(step))?;

            let proposed = if step == last {
                let ext = requested_extension(&operation).unwrap_or_else(|| extension_of(&current));
                self.output_dir
                    .join(final_artifact_name(&self.output_prefix, &token, &base_name, &ext))
            } else {
                self.output_dir
                    .join(temp_artifact_name(&token, step, &extension_of(&current)))
            };
            scope.register(&proposed);
            scope.register(routines::output_path_for(&operation, &proposed));

            let outcome = self
                .run_step(step, operation, current.clone(), proposed)
                .await
                .inspect_err(|err| {
                    tracing::warn!(step, code = err.code(), error = %err, "pipeline step failed");
                })?;
            scope.register(&outcome.output_path);
            tracing::debug!(step, command = %outcome.command, "pipeline step finished");
            commands.push(outcome.command);

            if current != seed && current != outcome.output_path {
                scope.retire(&current);
            }
            current = outcome.output_path;
        }

        scope.commit(&current);
        let final_filename = current
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::info!(output = %final_filename, steps = commands.len(), "pipeline finished");
        Ok(PipelineResult {
            final_path: current,
            final_filename,
            commands,
        })
    }

    async fn run_step(
        &self,
        step: usize,
        operation: NormalizedOperation,
        input: PathBuf,
        proposed: PathBuf,
    ) -> Result<StepOutcome, PipelineError> {
        let family = match &operation {
            NormalizedOperation::Canonical(op) => op.family,
            NormalizedOperation::Unrecognized { type_name, .. } => {
                return Err(PipelineError::UnsupportedOperationType {
                    step,
                    family: type_name.clone(),
                })
            }
        };
        let engine = Arc::clone(&self.engine);
        let ctx = RoutineContext {
            step,
            uploads_dir: self.uploads_dir.clone(),
        };
        tokio::task::spawn_blocking(move || {
            routines::dispatch(engine.as_ref(), &ctx, &operation, &input, &proposed)
        })
        .await
        .map_err(|err| PipelineError::EngineInvocationFailed {
            step,
            family,
            source: EngineError::Interrupted(err.to_string()),
        })?
    }
}

fn requested_extension(operation: &NormalizedOperation) -> Option<String> {
    let params = match operation {
        NormalizedOperation::Canonical(op) => &op.params,
        NormalizedOperation::Unrecognized { params, .. } => params,
    };
    target_format(params).map(|format| format!(".{format}"))
}
