//! `taleforge run`: submit in-process and follow the task to a terminal state.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use taleforge_core::api::{
    CliError, ErrorCode, Orchestrator, TaskRequest, TaskSnapshot, TaskStatus,
};

use super::cli::RunArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn build_request(args: &RunArgs) -> Result<TaskRequest, CliError> {
    let mut req = TaskRequest::new(args.title.clone(), args.subject_type);
    if let Some(context) = &args.context {
        req = req.with_context(context.clone());
    }
    for raw in &args.options {
        let (key, value) = parse_option(raw)?;
        req = req.with_option(key, value);
    }
    Ok(req)
}

/// `key=value`; the value is JSON when it parses as JSON, else a string.
fn parse_option(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Command(format!("invalid option '{raw}', expected KEY=VALUE")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Command(format!("invalid option '{raw}', empty key")));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn handle_run(args: RunArgs, orch: &Orchestrator) -> Result<i32, CliError> {
    let request = build_request(&args)?;
    let task_id = orch.submit(request).await?;
    tracing::info!(task_id = %task_id, "task submitted");

    let bar = progress_bar(args.quiet);
    bar.set_message(format!("{task_id} pending"));

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;
    let snapshot = loop {
        tokio::select! {
            res = &mut ctrl_c, if !cancel_sent => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                } else {
                    bar.println("cancellation requested, waiting for the current step to finish");
                    orch.cancel(&task_id).await?;
                }
                cancel_sent = true;
            }
            _ = ticker.tick() => {
                let Some(snapshot) = orch.get_status(&task_id).await? else {
                    return Err(CliError::TaskNotFound(task_id));
                };
                bar.set_position(percent(snapshot.progress));
                bar.set_message(format!("{} {}", snapshot.status, snapshot.current_step));
                if snapshot.is_terminal() {
                    break snapshot;
                }
            }
        }
    };
    bar.finish_and_clear();

    print_outcome(&snapshot)?;
    Ok(exit_code_for(&snapshot))
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn percent(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u64
}

fn print_outcome(snapshot: &TaskSnapshot) -> Result<(), CliError> {
    match snapshot.status {
        TaskStatus::Completed => {
            let result = snapshot.result_ref.clone().unwrap_or(Value::Null);
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| CliError::Command(e.to_string()))?;
            println!("{json}");
        }
        TaskStatus::Failed => eprintln!(
            "task {} failed: {}",
            snapshot.task_id,
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        status => eprintln!(
            "task {} {} at {}%",
            snapshot.task_id,
            status,
            percent(snapshot.progress)
        ),
    }
    Ok(())
}

pub fn exit_code_for(snapshot: &TaskSnapshot) -> i32 {
    let code = match snapshot.status {
        TaskStatus::Completed => ErrorCode::Success,
        TaskStatus::Cancelled => ErrorCode::Cancelled,
        TaskStatus::Failed => ErrorCode::StageFailed,
        _ => ErrorCode::GeneralError,
    };
    i32::from(code.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taleforge_core::api::SubjectType;

    fn args(options: &[&str]) -> RunArgs {
        RunArgs {
            title: "Alpha".into(),
            subject_type: SubjectType::Quest,
            context: Some("a heist".into()),
            options: options.iter().map(|s| s.to_string()).collect(),
            quiet: true,
        }
    }

    #[test]
    fn options_accept_json_or_plain_strings() {
        let req = build_request(&args(&["length=3", "tone=grim", "tags=[\"a\"]"])).unwrap();
        assert_eq!(req.options["length"], json!(3));
        assert_eq!(req.options["tone"], json!("grim"));
        assert_eq!(req.options["tags"], json!(["a"]));
        assert_eq!(req.additional_context.as_deref(), Some("a heist"));
    }

    #[test]
    fn option_without_equals_is_rejected() {
        assert!(build_request(&args(&["loud"])).is_err());
        assert!(build_request(&args(&["=3"])).is_err());
    }

    #[test]
    fn percent_is_clamped_and_rounded() {
        assert_eq!(percent(0.456), 46);
        assert_eq!(percent(1.2), 100);
        assert_eq!(percent(-1.0), 0);
    }
}
