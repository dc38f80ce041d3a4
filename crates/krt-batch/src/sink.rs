//! Output destinations for finished documents
//!
//! Each article id is written at most once; a second write for the same
//! id is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use krt_core::{KrtDocument, KrtError, Result};

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist one article's document, returning where it went
    async fn write(&self, article_id: &str, document: &KrtDocument) -> Result<String>;
}

// ============================================================================
// Directory sink
// ============================================================================

/// Writes `<article id>_krt.json` into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory if needed
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| KrtError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, article_id: &str) -> PathBuf {
        self.dir.join(format!("{article_id}_krt.json"))
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn write(&self, article_id: &str, document: &KrtDocument) -> Result<String> {
        let path = self.path_for(article_id);
        let json = document.to_json_pretty()?;

        let io_error = |source: std::io::Error| KrtError::Io {
            path: path.display().to_string(),
            source,
        };

        // create_new: an existing file means this id was already written
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(io_error)?;
        file.write_all(json.as_bytes()).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;

        tracing::debug!(path = %path.display(), rows = document.rows.len(), "Wrote KRT document");
        Ok(path.display().to_string())
    }
}

// ============================================================================
// Memory sink
// ============================================================================

/// Keeps documents in memory, keyed by article id
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<BTreeMap<String, KrtDocument>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, article_id: &str) -> Option<KrtDocument> {
        self.documents
            .lock()
            .ok()
            .and_then(|docs| docs.get(article_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, article_id: &str, document: &KrtDocument) -> Result<String> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| KrtError::Output("memory sink lock poisoned".to_string()))?;
        if documents.contains_key(article_id) {
            return Err(KrtError::Output(format!(
                "document for '{article_id}' already written"
            )));
        }
        documents.insert(article_id.to_string(), document.clone());
        Ok(format!("memory:{article_id}"))
    }
}
