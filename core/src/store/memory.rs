use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_replace, finish_listing, TaskStore};
use crate::error::StoreError;
use crate::task::{GenerationTask, TaskFilter};

/// Process-local store. Records live as long as the store does.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, GenerationTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, task_id: &str) -> Result<Option<GenerationTask>, StoreError> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn upsert(&self, task: &GenerationTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        check_replace(tasks.get(&task.id), task)?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<GenerationTask>, StoreError> {
        let tasks = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        Ok(finish_listing(tasks, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SubjectType, TaskRequest, TaskStatus};

    #[tokio::test]
    async fn upsert_then_get_returns_latest() {
        let store = InMemoryTaskStore::new();
        let mut task = GenerationTask::new(TaskRequest::new("Alpha", SubjectType::World));
        store.upsert(&task).await.unwrap();

        task.enter_phase(TaskStatus::Analyzing, "analyze").unwrap();
        store.upsert(&task).await.unwrap();

        let loaded = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Analyzing);
        assert_eq!(store.len().await, 1);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_status_and_type() {
        let store = InMemoryTaskStore::new();
        let a = GenerationTask::new(TaskRequest::new("A", SubjectType::World));
        let mut b = GenerationTask::new(TaskRequest::new("B", SubjectType::Quest));
        b.fail("boom").unwrap();
        store.upsert(&a).await.unwrap();
        store.upsert(&b).await.unwrap();

        let failed = store
            .list(&TaskFilter::with_status(TaskStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.id);

        let worlds = store
            .list(&TaskFilter {
                subject_type: Some(SubjectType::World),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(worlds.len(), 1);
        assert_eq!(worlds[0].id, a.id);

        let limited = store
            .list(&TaskFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn terminal_records_are_final() {
        let store = InMemoryTaskStore::new();
        let mut running = GenerationTask::new(TaskRequest::new("Alpha", SubjectType::World));
        running.enter_phase(TaskStatus::Generating, "world").unwrap();

        let mut cancelled = running.clone();
        cancelled.cancel().unwrap();
        store.upsert(&cancelled).await.unwrap();
        // same record again is fine
        store.upsert(&cancelled).await.unwrap();

        let err = store.upsert(&running).await.unwrap_err();
        assert!(err.is_conflict());
        let mut completed = running.clone();
        completed.complete(serde_json::json!({"title": "Alpha"})).unwrap();
        assert!(store.upsert(&completed).await.unwrap_err().is_conflict());

        let stored = store.get(&running.id).await.unwrap().unwrap();
        assert_eq!(stored, cancelled);
    }
}
