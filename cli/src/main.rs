use clap::Parser;
use taleforge_cli::app;
use taleforge_cli::commands::{cli, inspect, run};
use taleforge_cli::http;
use taleforge_core::api::{AppConfig, CliError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = app::load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    dispatch(args.command, &cfg).await
}

fn exit_code_for_error(e: &CliError) -> i32 {
    i32::from(e.error_code().as_u16())
}

async fn dispatch(cmd: cli::Commands, cfg: &AppConfig) -> Result<i32, CliError> {
    let orchestrator = app::build_orchestrator(cfg).await?;

    match cmd {
        cli::Commands::Serve(serve_args) => {
            app::spawn_event_logger(orchestrator.subscribe());
            http::handle_serve(serve_args, cfg, orchestrator).await?;
            Ok(0)
        }
        cli::Commands::Run(run_args) => {
            app::spawn_event_logger(orchestrator.subscribe());
            let exit = run::handle_run(run_args, &orchestrator).await;
            orchestrator.shutdown().await;
            exit
        }
        cli::Commands::Status(status_args) => {
            inspect::handle_status(status_args, &orchestrator).await
        }
        cli::Commands::List(list_args) => inspect::handle_list(list_args, &orchestrator).await,
        cli::Commands::Cancel(cancel_args) => {
            inspect::handle_cancel(cancel_args, &orchestrator).await
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taleforge"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("taleforge.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
