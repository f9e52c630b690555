//! Artifact naming and scoped cleanup of intermediate files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = ".jpg";

/// `{unix_millis}-{8 hex}`; unique across concurrent pipelines.
pub fn unique_token() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Dotted extension of `path`, `.jpg` when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn temp_artifact_name(token: &str, step: usize, ext: &str) -> String {
    format!("temp_{token}_{step}{ext}")
}

pub fn final_artifact_name(prefix: &str, token: &str, base_name: &str, ext: &str) -> String {
    format!("{prefix}{token}_{base_name}{ext}")
}

/// Deletes `path`, logging instead of failing. A missing file is not an error.
pub fn remove_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed artifact"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            path = %path.display(),
            error = %err,
            "failed to remove artifact"
        ),
    }
}

/// Owns every artifact path a pipeline may write. Anything still registered when
/// the scope drops is deleted; `commit` hands one path back to the caller.
#[derive(Debug, Default)]
pub struct ArtifactScope {
    registered: Vec<PathBuf>,
}

impl ArtifactScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.registered.contains(&path) {
            self.registered.push(path);
        }
    }

    /// Deletes a superseded intermediate now rather than at scope end.
    pub fn retire(&mut self, path: &Path) {
        self.registered.retain(|p| p != path);
        remove_best_effort(path);
    }

    pub fn registered(&self) -> &[PathBuf] {
        &self.registered
    }

    /// Keeps `keep` and deletes everything else that was registered.
    pub fn commit(mut self, keep: &Path) {
        self.registered.retain(|p| p != keep);
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        for path in self.registered.drain(..) {
            remove_best_effort(&path);
        }
    }
}
