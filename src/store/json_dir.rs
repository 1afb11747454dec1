//! File-backed partitions and output containers.
//!
//! ## Layout
//!
//! ```text
//! <root>/<vpu>/<layer>.json     one serialized Table per layer
//! <out>/<layer>.json            extracted layers
//! <out>/manifest.json           SubsetManifest
//! ```
//!
//! Tables are written exactly as extracted; column names are never rewritten.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use super::{LayerWriter, PartitionDataset, PartitionSource};
use crate::manifest::SubsetManifest;
use crate::types::{PartitionKey, Table};

/// Error type for the JSON directory backend.
#[derive(Debug, thiserror::Error)]
pub enum JsonDirError {
    /// Partition directory does not exist.
    #[error("partition directory not found: {0}")]
    PartitionNotFound(PathBuf),
    /// Filesystem failure.
    #[error("I/O error on {path}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Malformed table or manifest JSON.
    #[error("invalid JSON in {path}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl JsonDirError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json { path: path.to_path_buf(), source }
    }
}

/// Read a JSON table file.
pub async fn read_table(path: &Path) -> Result<Table, JsonDirError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| JsonDirError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| JsonDirError::json(path, e))
}

/// Partition source over a directory of per-partition subdirectories.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PartitionSource for JsonDirSource {
    type Error = JsonDirError;
    type Dataset = JsonDirDataset;

    async fn fetch(&self, key: &PartitionKey) -> Result<Self::Dataset, Self::Error> {
        let dir = self.root.join(key.as_str());
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                tracing::debug!(partition = %key, dir = %dir.display(), "opened partition");
                Ok(JsonDirDataset { key: key.clone(), dir })
            }
            Ok(_) => Err(JsonDirError::PartitionNotFound(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(JsonDirError::PartitionNotFound(dir)),
            Err(e) => Err(JsonDirError::io(&dir, e)),
        }
    }
}

/// One opened partition directory.
#[derive(Debug)]
pub struct JsonDirDataset {
    key: PartitionKey,
    dir: PathBuf,
}

#[async_trait]
impl PartitionDataset for JsonDirDataset {
    type Error = JsonDirError;

    fn key(&self) -> &PartitionKey {
        &self.key
    }

    async fn read_layer(&self, name: &str) -> Result<Option<Table>, Self::Error> {
        let path = self.dir.join(format!("{}.json", name));
        match read_table(&path).await {
            Ok(table) => Ok(Some(table)),
            Err(JsonDirError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Writes extracted layers into an output directory.
#[derive(Debug, Clone)]
pub struct JsonDirWriter {
    dir: PathBuf,
    created: bool,
}

impl JsonDirWriter {
    /// Manifest file name inside the output directory.
    pub const MANIFEST_FILE: &'static str = "manifest.json";

    /// Create a writer targeting `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), created: false }
    }

    async fn ensure_dir(&mut self) -> Result<(), JsonDirError> {
        if !self.created {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| JsonDirError::io(&self.dir, e))?;
            self.created = true;
        }
        Ok(())
    }

    async fn write_json<T: serde::Serialize + Sync>(&mut self, file: &str, value: &T) -> Result<(), JsonDirError> {
        self.ensure_dir().await?;
        let path = self.dir.join(file);
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| JsonDirError::json(&path, e))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| JsonDirError::io(&path, e))
    }
}

#[async_trait]
impl LayerWriter for JsonDirWriter {
    type Error = JsonDirError;

    async fn write_layer(&mut self, name: &str, table: &Table) -> Result<(), Self::Error> {
        self.write_json(&format!("{}.json", name), table).await?;
        tracing::debug!(layer = name, rows = table.len(), "layer written");
        Ok(())
    }

    async fn finish(&mut self, manifest: &SubsetManifest) -> Result<PathBuf, Self::Error> {
        self.write_json(Self::MANIFEST_FILE, manifest).await?;
        Ok(self.dir.clone())
    }
}
