use clap::{Args as ClapArgs, Parser, Subcommand};
use taleforge_core::api::{SubjectType, TaskStatus};

#[derive(Parser, Debug)]
#[command(name = "taleforge", version, about = "Generate game content through a staged pipeline")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the task API over HTTP.
    Serve(ServeArgs),
    /// Submit one task and follow it to the end.
    Run(RunArgs),
    /// Show one task.
    Status(StatusArgs),
    /// List stored tasks.
    List(ListArgs),
    /// Request cancellation of a task.
    Cancel(CancelArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long = "type", value_parser = parse_subject_type)]
    pub subject_type: SubjectType,

    #[arg(long)]
    pub context: Option<String>,

    /// Extra generation options (KEY=VALUE). Values that parse as JSON are
    /// passed as JSON, anything else as a string. Can be specified multiple times.
    #[arg(long = "option", action = clap::ArgAction::Append)]
    pub options: Vec<String>,

    /// Print only the final result, without the progress bar.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    pub task_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ListArgs {
    /// Only tasks in these states (comma separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_task_status)]
    pub status: Vec<TaskStatus>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CancelArgs {
    pub task_id: String,
}

fn parse_subject_type(s: &str) -> Result<SubjectType, String> {
    s.parse()
}

fn parse_task_status(s: &str) -> Result<TaskStatus, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_parse() {
        let args = Args::try_parse_from([
            "taleforge",
            "run",
            "--title",
            "Alpha",
            "--type",
            "world",
            "--option",
            "tone=\"grim\"",
            "--option",
            "length=3",
        ])
        .unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.subject_type, SubjectType::World);
        assert_eq!(run.options, vec!["tone=\"grim\"", "length=3"]);
    }

    #[test]
    fn list_status_is_comma_separated() {
        let args =
            Args::try_parse_from(["taleforge", "list", "--status", "completed,failed"]).unwrap();
        let Commands::List(list) = args.command else {
            panic!("expected list");
        };
        assert_eq!(list.status, vec![TaskStatus::Completed, TaskStatus::Failed]);
    }

    #[test]
    fn unknown_subject_type_is_rejected() {
        assert!(
            Args::try_parse_from(["taleforge", "run", "--title", "A", "--type", "ship"]).is_err()
        );
    }
}
