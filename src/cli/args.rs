use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::BackendKind;

/// Connection flags shared by every subcommand. Flags override the settings
/// file, which overrides built-in defaults (localhost:9876, remote backend).
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Execution backend to use
    #[arg(long, value_enum, help_heading = "Connection")]
    pub backend: Option<BackendKind>,

    /// GeoEngine service host (remote backend)
    #[arg(long, value_name = "HOST", help_heading = "Connection")]
    pub host: Option<String>,

    /// GeoEngine service port (remote backend)
    #[arg(long, value_name = "PORT", help_heading = "Connection")]
    pub port: Option<u16>,

    /// Path to the geoengine binary (local backend)
    #[arg(long, value_name = "PATH", help_heading = "Connection")]
    pub binary: Option<PathBuf>,

    /// Path to custom settings file (default: ~/.geoengine/client.toml)
    #[arg(long, value_name = "FILE", help_heading = "Connection")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct ProjectsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Project name
    pub project: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Project name
    pub project: String,

    /// Tool name to execute
    pub tool: String,

    /// Input parameters (format: KEY=VALUE, repeatable)
    #[arg(short, long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Directory to write output files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Sleep between job status checks (remote backend)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", value_name = "DURATION")]
    pub poll_interval: Duration,

    /// Give up waiting after this long (remote backend)
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Include completed, failed, and cancelled jobs
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job ID
    pub job_id: String,

    /// Block until the job reaches a terminal state
    #[arg(long)]
    pub wait: bool,

    /// Sleep between status checks when waiting
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", value_name = "DURATION")]
    pub poll_interval: Duration,

    /// Give up waiting after this long
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Job ID
    pub job_id: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}
