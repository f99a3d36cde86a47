pub mod args;
pub mod commands;

pub use args::{
    CancelArgs, ConnectionArgs, HealthArgs, JobsArgs, ProjectsArgs, RunArgs, StatusArgs, ToolsArgs,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "geoengine-client")]
#[command(version = crate::VERSION)]
#[command(about = "Run GeoEngine geoprocessing tools locally or via the proxy service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Check that the engine is reachable",
        after_help = "Example:\n    geoengine-client health --host gis-server --port 9876"
    )]
    Health(HealthArgs),
    #[command(
        about = "List registered projects",
        after_help = "Example:\n    geoengine-client projects --backend local --binary /usr/local/bin/geoengine"
    )]
    Projects(ProjectsArgs),
    #[command(
        about = "List the tools a project declares",
        after_help = "Example:\n    geoengine-client tools hydrology"
    )]
    Tools(ToolsArgs),
    #[command(
        about = "Run a tool and stream its progress",
        long_about = "Run executes one tool to termination on the selected backend, streams \
                      diagnostic output as it arrives, and prints the resolved output mapping. \
                      Ctrl-C cancels the run.",
        after_help = "Example:\n    geoengine-client run hydrology flow_accumulation \\\n        --input dem=srtm.tif --output-dir ./results"
    )]
    Run(RunArgs),
    #[command(about = "List jobs on the proxy service")]
    Jobs(JobsArgs),
    #[command(
        about = "Show a job's status, optionally waiting for completion",
        after_help = "Example:\n    geoengine-client status 4f1c-22 --wait --timeout 10m"
    )]
    Status(StatusArgs),
    #[command(about = "Cancel a running or queued job")]
    Cancel(CancelArgs),
}

pub async fn run(cli: Cli) -> crate::Result<()> {
    match cli.command {
        Command::Health(args) => commands::health(args).await,
        Command::Projects(args) => commands::projects(args).await,
        Command::Tools(args) => commands::tools(args).await,
        Command::Run(args) => commands::run(args).await,
        Command::Jobs(args) => commands::jobs(args).await,
        Command::Status(args) => commands::status(args).await,
        Command::Cancel(args) => commands::cancel(args).await,
    }
}
