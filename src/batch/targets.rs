/*!
 * Batch targets and the sources that enumerate them.
 */

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::errors::BatchError;
use crate::file_utils::FileManager;
use crate::model::ImageData;

/// Where a target's bytes come from
#[derive(Debug, Clone)]
enum TargetData {
    Inline(ImageData),
    File(PathBuf),
}

/// One image to detect and translate
#[derive(Debug, Clone)]
pub struct ImageTarget {
    /// Stable identifier reported in events
    pub id: String,
    data: TargetData,
}

impl ImageTarget {
    /// Target over bytes already in memory
    pub fn inline(image: ImageData) -> Self {
        Self {
            id: image.id.clone(),
            data: TargetData::Inline(image),
        }
    }

    /// Target read from disk when its batch starts
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.to_string_lossy().to_string(),
            data: TargetData::File(path),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            TargetData::File(path) => Some(path),
            TargetData::Inline(_) => None,
        }
    }

    /// Materialize the image
    pub async fn load(&self) -> std::io::Result<ImageData> {
        match &self.data {
            TargetData::Inline(image) => Ok(image.clone()),
            TargetData::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                let mime_type = path
                    .extension()
                    .map(|ext| ImageData::mime_for_extension(&ext.to_string_lossy()))
                    .unwrap_or("application/octet-stream");
                Ok(ImageData::new(self.id.clone(), bytes, mime_type))
            }
        }
    }
}

/// Host-side enumeration of batch targets, called once per run
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn targets(&self) -> Result<Vec<ImageTarget>, BatchError>;
}

#[async_trait]
impl TargetSource for Vec<ImageTarget> {
    async fn targets(&self) -> Result<Vec<ImageTarget>, BatchError> {
        Ok(self.clone())
    }
}

/// Image files under a directory, sorted by path
#[derive(Debug, Clone)]
pub struct DirectoryTargets {
    root: PathBuf,
    min_image_bytes: u64,
}

impl DirectoryTargets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_image_bytes: 0,
        }
    }

    /// Skip images smaller than `bytes`
    pub fn with_min_image_bytes(mut self, bytes: u64) -> Self {
        self.min_image_bytes = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TargetSource for DirectoryTargets {
    async fn targets(&self) -> Result<Vec<ImageTarget>, BatchError> {
        if !FileManager::dir_exists(&self.root) {
            return Err(BatchError::Enumeration(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let root = self.root.clone();
        let min_bytes = self.min_image_bytes;
        let paths = tokio::task::spawn_blocking(move || FileManager::find_images(root, min_bytes))
            .await
            .map_err(|e| BatchError::Enumeration(e.to_string()))?
            .map_err(|e| BatchError::Enumeration(format!("{:#}", e)))?;

        Ok(paths.into_iter().map(ImageTarget::file).collect())
    }
}
