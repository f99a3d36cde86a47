use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cli::args::{
    CancelArgs, ConnectionArgs, HealthArgs, JobsArgs, ProjectsArgs, RunArgs, StatusArgs, ToolsArgs,
};
use crate::core::{BackendKind, ClientSettings, RunReport, ToolInvocation, ToolResult};
use crate::engine::{resolve_outputs, ExecutionBackend, LocalRunner, RemoteClient};

fn load_settings(connection: &ConnectionArgs) -> Result<ClientSettings> {
    match &connection.config {
        Some(path) => ClientSettings::load_from(path),
        None => ClientSettings::load(),
    }
}

/// Build the remote client for job-queue commands and the remote backend.
fn remote_client(connection: &ConnectionArgs, settings: &ClientSettings) -> Result<RemoteClient> {
    let host = connection.host.as_deref().unwrap_or_else(|| settings.host());
    let port = connection.port.unwrap_or_else(|| settings.port());
    Ok(RemoteClient::new(host, port)?)
}

fn local_runner(connection: &ConnectionArgs, settings: &ClientSettings) -> Result<LocalRunner> {
    let binary = connection
        .binary
        .clone()
        .or_else(|| settings.binary.clone())
        .context(
            "local backend selected but no geoengine binary configured \
             (pass --binary or set `binary` in ~/.geoengine/client.toml)",
        )?;
    Ok(LocalRunner::new(binary))
}

/// Select the execution backend from flags and settings.
fn backend(connection: &ConnectionArgs) -> Result<Box<dyn ExecutionBackend>> {
    let settings = load_settings(connection)?;
    match connection.backend.unwrap_or_else(|| settings.backend()) {
        BackendKind::Local => Ok(Box::new(local_runner(connection, &settings)?)),
        BackendKind::Remote => Ok(Box::new(remote_client(connection, &settings)?)),
    }
}

pub async fn health(args: HealthArgs) -> Result<()> {
    let backend = backend(&args.connection)?;
    let health = backend.health().await?;
    println!("Status: {}", health.status);
    if let Some(version) = health.version {
        println!("Version: {}", version);
    }
    Ok(())
}

pub async fn projects(args: ProjectsArgs) -> Result<()> {
    let backend = backend(&args.connection)?;
    let projects = backend.list_projects().await?;
    if projects.is_empty() {
        println!("No registered projects.");
        return Ok(());
    }
    for project in projects {
        let tools = project
            .tools_count
            .map(|n| format!(" ({} tools)", n))
            .unwrap_or_default();
        println!("{}{}", project.name, tools);
    }
    Ok(())
}

pub async fn tools(args: ToolsArgs) -> Result<()> {
    let backend = backend(&args.connection)?;
    let tools = backend.project_tools(&args.project).await?;
    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

pub async fn run(args: RunArgs) -> Result<()> {
    let settings = load_settings(&args.connection)?;
    let backend: Box<dyn ExecutionBackend> =
        match args.connection.backend.unwrap_or_else(|| settings.backend()) {
            BackendKind::Local => Box::new(local_runner(&args.connection, &settings)?),
            BackendKind::Remote => Box::new(
                remote_client(&args.connection, &settings)?
                    .with_poll_interval(args.poll_interval)
                    .with_wait_timeout(args.timeout),
            ),
        };

    let mut invocation = ToolInvocation::new(&args.project, &args.tool);
    invocation.inputs = parse_inputs(&args.inputs)?;
    invocation.output_dir = args.output_dir.clone();

    // Ctrl-C flips the cancellation flag; the backend observes it at its next
    // checkpoint.
    let cancel_flag = Arc::new(AtomicBool::new(false));
    {
        let flag = cancel_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut progress = |line: &str| eprintln!("{}", line);
    let cancelled = move || cancel_flag.load(Ordering::SeqCst);

    let result = backend
        .run_tool(&invocation, &mut progress, &cancelled)
        .await?;

    match result {
        ToolResult::Success { payload } => {
            let files = RunReport::from_value(&payload)
                .map(|report| report.files)
                .unwrap_or_default();
            let outputs =
                resolved_slots(backend.as_ref(), &args.project, &args.tool, &files, &args).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "result": payload,
                    "outputs": outputs,
                }))?
            );
        }
        ToolResult::CompletedNoPayload { exit_code, files } => {
            let outputs =
                resolved_slots(backend.as_ref(), &args.project, &args.tool, &files, &args).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "status": "completed",
                    "exit_code": exit_code,
                    "files": files,
                    "outputs": outputs,
                }))?
            );
        }
        ToolResult::Failure { reason } => bail!(reason),
        ToolResult::Cancelled => {
            eprintln!("Run cancelled.");
        }
    }
    Ok(())
}

pub async fn jobs(args: JobsArgs) -> Result<()> {
    let settings = load_settings(&args.connection)?;
    let client = remote_client(&args.connection, &settings)?;
    let jobs = client.list_jobs(args.all).await?;
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in jobs {
        match job.error {
            Some(error) => println!("{}  {}  {}", job.id, job.state, error),
            None => println!("{}  {}", job.id, job.state),
        }
    }
    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let settings = load_settings(&args.connection)?;
    let client = remote_client(&args.connection, &settings)?;
    let status = if args.wait {
        client
            .wait(&args.job_id, args.poll_interval, args.timeout, |status| {
                eprintln!("Status: {}", status.state);
            })
            .await?
    } else {
        client.status(&args.job_id).await?
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn cancel(args: CancelArgs) -> Result<()> {
    let settings = load_settings(&args.connection)?;
    let client = remote_client(&args.connection, &settings)?;
    let status = client.cancel(&args.job_id).await?;
    println!("Job {} is now {}", status.id, status.state);
    Ok(())
}

/// Parse `KEY=VALUE` pairs in the order given.
fn parse_inputs(raw: &[String]) -> Result<IndexMap<String, Option<String>>> {
    let mut inputs = IndexMap::new();
    for arg in raw {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Invalid input format: '{}'. Expected KEY=VALUE", arg);
        };
        inputs.insert(key.to_string(), Some(value.to_string()));
    }
    Ok(inputs)
}

/// Resolve produced files against the tool's declared output slots. A failed
/// declaration fetch leaves the mapping to the output directory only.
async fn resolved_slots(
    backend: &dyn ExecutionBackend,
    project: &str,
    tool: &str,
    files: &[crate::core::OutputFile],
    args: &RunArgs,
) -> IndexMap<String, String> {
    let slots = match backend.project_tools(project).await {
        Ok(tools) => tools
            .into_iter()
            .find(|t| t.name == tool)
            .map(|t| t.outputs)
            .unwrap_or_default(),
        Err(err) => {
            tracing::warn!("could not fetch tool declaration for {}: {}", tool, err);
            Vec::new()
        }
    };
    resolve_outputs(files, &slots, args.output_dir.as_deref())
}
