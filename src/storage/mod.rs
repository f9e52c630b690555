use std::fs;
use std::io;
use std::path::PathBuf;

use crate::config::ServiceConfig;

/// The two working areas: caller uploads and downloaded seeds, and produced
/// artifacts (final and intermediate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub uploads_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(uploads_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.uploads_dir.clone(), config.output_dir.clone())
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads_dir)?;
        fs::create_dir_all(&self.output_dir)
    }

    /// Public URL path under which an output artifact is served.
    pub fn output_url(filename: &str) -> String {
        format!("/output/{filename}")
    }

    /// Public URL path under which an uploaded source is served.
    pub fn upload_url(filename: &str) -> String {
        format!("/uploads/{filename}")
    }
}
