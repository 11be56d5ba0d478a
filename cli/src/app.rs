//! Assembly: config, store, generator and pipeline into an orchestrator.

use std::path::Path;
use std::sync::Arc;

use taleforge_core::api::{AppConfig, CliError, Orchestrator, TaskEvent};
use taleforge_plugins::factory::{build_generator, build_standard_pipeline, build_store};
use tokio::sync::broadcast;

pub fn load_config(path: Option<&str>) -> Result<AppConfig, CliError> {
    let cfg = match path {
        Some(p) => taleforge_core::config::load_explicit(Path::new(p)),
        None => taleforge_core::config::load_default(),
    };
    cfg.map_err(|e| CliError::Config(format!("{e:#}")))
}

#[tracing::instrument(name = "cli.build_orchestrator", skip(cfg))]
pub async fn build_orchestrator(cfg: &AppConfig) -> Result<Orchestrator, CliError> {
    let store = build_store(&cfg.store).await?;
    let generator = build_generator(&cfg.generation)?;
    let pipeline = build_standard_pipeline(generator.clone(), &cfg.generation)?;
    tracing::debug!(
        store = store.name(),
        generator = generator.name(),
        pipeline = pipeline.name(),
        "orchestrator assembled"
    );
    Ok(Orchestrator::from_config(
        &cfg.runner,
        store,
        Arc::new(pipeline),
    ))
}

/// Logs task lifecycle events until the channel closes.
pub fn spawn_event_logger(mut event_rx: broadcast::Receiver<TaskEvent>) {
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &TaskEvent) {
    match event {
        TaskEvent::Submitted {
            task_id,
            subject_type,
            ..
        } => tracing::debug!("Task {} submitted ({})", task_id, subject_type),
        TaskEvent::StatusChanged {
            task_id,
            old_status,
            new_status,
            ..
        } => tracing::debug!("Task {} {} -> {}", task_id, old_status, new_status),
        TaskEvent::Progress {
            task_id,
            progress,
            step,
            ..
        } => tracing::trace!("Task {} at {:.0}% after {}", task_id, progress * 100.0, step),
        TaskEvent::CancellationRequested { task_id, .. } => {
            tracing::info!("Task {} cancellation requested", task_id)
        }
        TaskEvent::Completed {
            task_id,
            duration_ms,
            ..
        } => tracing::info!("Task {} completed ({}ms)", task_id, duration_ms),
        TaskEvent::Failed { task_id, error, .. } => {
            tracing::error!("Task {} failed: {}", task_id, error)
        }
        TaskEvent::Cancelled {
            task_id, progress, ..
        } => tracing::info!("Task {} cancelled at {:.0}%", task_id, progress * 100.0),
    }
}
