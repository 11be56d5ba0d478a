use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use super::{check_replace, finish_listing, TaskStore};
use crate::error::StoreError;
use crate::task::{GenerationTask, TaskFilter};

/// One JSON file per task under `dir`.
///
/// Writes go to a uniquely named temp file in the same directory and are then
/// renamed over the record, so a reader sees either the old or the new record.
/// The terminal-record check reads the current file first; two processes
/// writing the same record can still interleave between that read and the
/// rename.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub async fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_err(&dir, source))?;
        Ok(Self { dir })
    }

    fn record_path(&self, task_id: &str) -> Option<PathBuf> {
        if !is_safe_id(task_id) {
            return None;
        }
        Some(self.dir.join(format!("task_{task_id}.json")))
    }

    async fn read_record(path: &Path) -> Result<GenerationTask, StoreError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| io_err(path, source))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, task_id: &str) -> Result<Option<GenerationTask>, StoreError> {
        let Some(path) = self.record_path(task_id) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_err(&path, source)),
        }
    }

    async fn upsert(&self, task: &GenerationTask) -> Result<(), StoreError> {
        let path = self
            .record_path(&task.id)
            .ok_or_else(|| StoreError::Backend(format!("unsafe task id '{}'", task.id)))?;
        match self.get(&task.id).await {
            Ok(stored) => check_replace(stored.as_ref(), task)?,
            Err(e) => warn!(task_id = %task.id, error = %e, "overwriting unreadable task record"),
        }
        let json = serde_json::to_string_pretty(task)?;

        let tmp = self
            .dir
            .join(format!(".task_{}.{}.tmp", task.id, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| io_err(&tmp, source))?;
        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, source));
        }
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| io_err(&self.dir, source))?;

        let mut tasks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_err(&self.dir, source))?
        {
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|name| name.starts_with("task_") && name.ends_with(".json"))
                .unwrap_or(false);
            if !is_record {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(task) if filter.matches(&task) => tasks.push(task),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable task record"),
            }
        }

        Ok(finish_listing(tasks, filter))
    }
}

fn is_safe_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id.len() <= 128
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
