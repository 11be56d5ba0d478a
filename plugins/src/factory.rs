use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use taleforge_core::api::{
    GenerationConfig, GenerationProvider, PipelineDefinition, Stage, StoreConfig, StoreKind,
};
use taleforge_core::config::get_taleforge_data_dir;
use taleforge_core::store::{FileTaskStore, InMemoryTaskStore, TaskStore};

use crate::llm::{ChatCompletionsClient, OfflineGenerator, TextGenerator};
use crate::stages::{AnalysisStage, ContentStage, GenerationPolicy, ValidationStage};

pub const STANDARD_PIPELINE: &str = "standard-content";

const GENERATION_RETRY_BACKOFF_MS: u64 = 500;

pub async fn build_store(cfg: &StoreConfig) -> Result<Arc<dyn TaskStore>> {
    match cfg.kind {
        StoreKind::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
        StoreKind::File => {
            let dir = match &cfg.directory {
                Some(dir) => PathBuf::from(dir),
                None => get_taleforge_data_dir()?.join("tasks"),
            };
            let store = FileTaskStore::open(&dir)
                .await
                .with_context(|| format!("failed to open task store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub fn build_generator(cfg: &GenerationConfig) -> Result<Arc<dyn TextGenerator>> {
    match cfg.provider {
        GenerationProvider::Offline => Ok(Arc::new(OfflineGenerator::new())),
        GenerationProvider::Http => Ok(Arc::new(ChatCompletionsClient::new(
            &cfg.base_url,
            cfg.api_key.clone(),
            cfg.model.clone(),
            cfg.temperature,
            cfg.timeout_ms,
        )?)),
    }
}

pub fn build_standard_pipeline(
    generator: Arc<dyn TextGenerator>,
    cfg: &GenerationConfig,
) -> Result<PipelineDefinition> {
    let policy = GenerationPolicy::new(cfg.max_retries, GENERATION_RETRY_BACKOFF_MS);
    let stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(AnalysisStage::new(generator.clone(), policy)),
        Arc::new(ContentStage::new(generator, policy)),
        Arc::new(ValidationStage::new()),
    ];
    Ok(PipelineDefinition::new(STANDARD_PIPELINE, stages)?)
}
