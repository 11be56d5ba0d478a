//! `status`, `list` and `cancel` against the configured store.

use taleforge_core::api::{CliError, Orchestrator, TaskFilter, TaskSnapshot};

use super::cli::{CancelArgs, ListArgs, StatusArgs};

pub async fn handle_status(args: StatusArgs, orch: &Orchestrator) -> Result<i32, CliError> {
    let snapshot = orch
        .get_status(&args.task_id)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(args.task_id.clone()))?;

    if args.json {
        println!("{}", to_json(&snapshot)?);
    } else {
        print!("{}", render_snapshot(&snapshot));
    }
    Ok(0)
}

pub async fn handle_list(args: ListArgs, orch: &Orchestrator) -> Result<i32, CliError> {
    let filter = TaskFilter {
        status: (!args.status.is_empty()).then_some(args.status),
        subject_type: None,
        limit: args.limit,
    };
    let tasks = orch.list(&filter).await?;

    if args.json {
        println!("{}", to_json(&tasks)?);
        return Ok(0);
    }
    if tasks.is_empty() {
        eprintln!("no tasks");
        return Ok(0);
    }
    for task in &tasks {
        println!("{}", render_row(task));
    }
    Ok(0)
}

/// Writes `Cancelled` straight to the store. A `taleforge serve` process that
/// still runs the task stops at its next checkpoint, when the store refuses
/// to overwrite the terminal record.
pub async fn handle_cancel(args: CancelArgs, orch: &Orchestrator) -> Result<i32, CliError> {
    if orch.get_status(&args.task_id).await?.is_none() {
        return Err(CliError::TaskNotFound(args.task_id));
    }
    let cancelled = orch.cancel(&args.task_id).await?;
    if cancelled {
        println!("cancellation requested for {}", args.task_id);
    } else {
        println!("{} is already finished", args.task_id);
    }
    Ok(0)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Command(e.to_string()))
}

fn render_row(task: &TaskSnapshot) -> String {
    format!(
        "{}  {:<10} {:>3.0}%  {:<18} {}",
        task.task_id,
        task.status.as_str(),
        task.progress * 100.0,
        task.current_step,
        task.updated_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn render_snapshot(task: &TaskSnapshot) -> String {
    let mut out = format!(
        "task:     {}\nstatus:   {}\nprogress: {:.0}%\nstep:     {}\ncreated:  {}\nupdated:  {}\n",
        task.task_id,
        task.status,
        task.progress * 100.0,
        task.current_step,
        task.created_at.to_rfc3339(),
        task.updated_at.to_rfc3339(),
    );
    if task.cancellation_requested && !task.is_terminal() {
        out.push_str("note:     cancellation requested\n");
    }
    if let Some(error) = &task.error {
        out.push_str(&format!("error:    {error}\n"));
    }
    if task.result_ref.is_some() {
        out.push_str("result:   available (use --json)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taleforge_core::api::TaskStatus;

    fn snapshot(status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            task_id: "t-1".into(),
            status,
            progress: 0.45,
            current_step: "world_building".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            result_ref: None,
            error: None,
            cancellation_requested: false,
        }
    }

    #[test]
    fn row_shows_status_and_percent() {
        let row = render_row(&snapshot(TaskStatus::Generating));
        assert!(row.starts_with("t-1  generating"));
        assert!(row.contains(" 45%"));
    }

    #[test]
    fn failed_snapshot_shows_error() {
        let mut s = snapshot(TaskStatus::Failed);
        s.error = Some("characters: model unavailable".into());
        let text = render_snapshot(&s);
        assert!(text.contains("status:   failed"));
        assert!(text.contains("error:    characters: model unavailable"));
    }
}
