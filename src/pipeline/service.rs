use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::acquire::{Provenance, ResourceResolver};
use crate::pipeline::aliases::AliasTable;
use crate::pipeline::engine::{EngineStatus, SharedTransformEngine};
use crate::pipeline::error::PipelineError;
use crate::pipeline::executor::PipelineExecutor;
use crate::pipeline::normalize::OperationDescriptor;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub operations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub output_file: String,
    #[serde(skip)]
    pub output_path: PathBuf,
    pub commands: Vec<String>,
    pub source: Provenance,
    pub original_filename: String,
}

/// Acquire, then execute. One instance serves every request.
#[derive(Clone)]
pub struct ImageProcessService {
    resolver: ResourceResolver,
    executor: PipelineExecutor,
    engine: SharedTransformEngine,
    aliases: Arc<AliasTable>,
}

impl ImageProcessService {
    pub fn new(
        resolver: ResourceResolver,
        engine: SharedTransformEngine,
        aliases: Arc<AliasTable>,
        output_dir: impl Into<PathBuf>,
        output_prefix: impl Into<String>,
    ) -> Self {
        let executor = PipelineExecutor::new(
            Arc::clone(&engine),
            Arc::clone(&aliases),
            output_dir,
            resolver.uploads_dir().to_path_buf(),
        )
        .with_output_prefix(output_prefix);
        Self {
            resolver,
            executor,
            engine,
            aliases,
        }
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.engine.check_installation()
    }

    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessOutcome, PipelineError> {
        let filename = request
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::InvalidRequest(String::from("filename is required")))?
            .to_string();
        let operations = parse_operations(request.operations)?;

        let resolved = self.resolver.resolve(&filename).await?;
        let result = self.executor.run(&resolved.path, &operations).await?;
        Ok(ProcessOutcome {
            output_file: result.final_filename,
            output_path: result.final_path,
            commands: result.commands,
            source: resolved.provenance,
            original_filename: resolved.original_name,
        })
    }
}

fn parse_operations(raw: Option<Vec<Value>>) -> Result<Vec<OperationDescriptor>, PipelineError> {
    let raw = raw
        .filter(|ops| !ops.is_empty())
        .ok_or_else(|| {
            PipelineError::InvalidRequest(String::from("operations must be a non-empty array"))
        })?;
    raw.into_iter()
        .enumerate()
        .map(|(step, value)| {
            let descriptor: OperationDescriptor = serde_json::from_value(value).map_err(|e| {
                PipelineError::InvalidRequest(format!("operation {step} is malformed: {e}"))
            })?;
            if descriptor.type_name.trim().is_empty() {
                return Err(PipelineError::InvalidRequest(format!(
                    "operation {step} is missing a type"
                )));
            }
            Ok(descriptor)
        })
        .collect()
}
