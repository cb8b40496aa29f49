use anyhow::{Context, Result};
use pipeline_controller::cli::commands::{CheckpointCommand, RunCommand, ValidateCommand};
use pipeline_controller::cli::output::*;
use pipeline_controller::cli::{Cli, Command};
use pipeline_controller::core::{
    ControllerConfig, Manifest, MaterializedPipeline, Pipeline, PipelineStatus, Resource, Step,
};
use pipeline_controller::store::ResourceClient;
use pipeline_controller::{Controller, EchoerClient, InMemoryResourceStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_manifest(cmd)?,
        Command::Checkpoint(cmd) => show_checkpoint(cmd, &cli).await?,
    }

    Ok(())
}

/// Load the configuration file (if any) and apply command-line overrides
fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };

    if let Some(server_name) = &cli.server_name {
        config.server_name = server_name.clone();
    }
    if let Some(echoer_addr) = &cli.echoer_addr {
        config.echoer_addr = echoer_addr.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }

    config.validate().context("Invalid controller configuration")?;
    Ok(config)
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let manifest = Manifest::from_file(&cmd.file)
        .with_context(|| format!("Failed to load manifest {}", cmd.file))?;

    println!("{} Loaded pipeline: {}", INFO, style(&manifest.name).bold());
    println!("{}", format_manifest(&manifest));

    let store = Arc::new(InMemoryResourceStore::new());
    let engine = Arc::new(EchoerClient::new(
        config.echoer_base(),
        Duration::from_secs(config.request_timeout_secs),
    ));
    let checkpoint_path = config.checkpoint_path.clone();
    let mut controller = Controller::new(config, store, engine);
    if let Some(path) = checkpoint_path {
        controller = controller.with_checkpoints(open_checkpoints(&path).await?);
    }

    let tree = manifest.materialize();
    tree.seed(controller.resources())
        .await
        .context("Failed to seed pipeline")?;
    let pipeline_uuid = tree.pipeline.uuid().to_string();
    println!(
        "\n{} Starting pipeline {} ({}) via {}",
        ROCKET,
        style(&manifest.name).bold(),
        style(&pipeline_uuid[..8]).dim(),
        style(controller.config().echoer_base()).cyan()
    );

    let resources = controller.resources().clone();
    let keep_running = cmd.keep_running;
    let finished = async move {
        if keep_running {
            std::future::pending::<Result<()>>().await
        } else {
            wait_for_pipeline(&resources, &pipeline_uuid).await
        }
    };

    tokio::select! {
        result = controller.run() => {
            let e = match result {
                Ok(()) => anyhow::anyhow!("controller stopped"),
                Err(e) => e.into(),
            };
            println!("\n{} {} {}", CROSS, style(&manifest.name).bold(), style("aborted").red());
            error!("{:#}", e);
            std::process::exit(1);
        }
        result = finished => {
            result?;
            print_steps(controller.resources(), &tree).await;
            println!(
                "\n{} {} {}",
                CHECK,
                style(&manifest.name).bold(),
                format_pipeline_status(PipelineStatus::Finished)
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            print_steps(controller.resources(), &tree).await;
            println!("\n{} {} interrupted", WARN, style(&manifest.name).bold());
        }
    }

    Ok(())
}

/// Print the stored status of every seeded step
async fn print_steps(resources: &ResourceClient, tree: &MaterializedPipeline) {
    let mut settled = 0;
    println!();
    for step in &tree.steps {
        let status = match resources.get::<Step>(step.uuid()).await {
            Ok(Some(stored)) => stored.status(),
            Ok(None) => continue,
            Err(e) => {
                warn!("step {} unreadable: {}", step.uuid(), e);
                continue;
            }
        };
        if status.is_terminal() {
            settled += 1;
        }
        let name = if step.metadata.name.is_empty() {
            step.uuid()
        } else {
            step.metadata.name.as_str()
        };
        println!("  {} {}", format_step_status(status), style(name).bold());
    }
    println!(
        "{} {}/{} steps have a result",
        INFO,
        style(settled).cyan(),
        tree.steps.len()
    );
}

/// Block until the given pipeline is observed as finished
async fn wait_for_pipeline(resources: &ResourceClient, pipeline_uuid: &str) -> Result<()> {
    let mut events = resources.watch::<Pipeline>(0).await?;
    while let Some(event) = events.recv().await {
        if event.is_heartbeat() || event.uuid != pipeline_uuid {
            continue;
        }
        match ResourceClient::decode::<Pipeline>(event.object) {
            Ok(pipeline) if pipeline.is_finished() => {
                info!("pipeline {} finished at version {}", pipeline_uuid, pipeline.version());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!("pipeline {} decode error: {}", pipeline_uuid, e),
        }
    }
    anyhow::bail!("pipeline watch closed before {} finished", pipeline_uuid)
}

fn validate_manifest(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating manifest...", INFO);

    match Manifest::from_file(&cmd.file) {
        Ok(manifest) => {
            println!("{} Manifest is valid!", CHECK);
            println!("{}", format_manifest(&manifest));

            if cmd.json {
                let json = serde_json::to_string_pretty(&manifest)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn open_checkpoints(
    path: &str,
) -> Result<Arc<dyn pipeline_controller::persistence::CheckpointStore>> {
    let store = pipeline_controller::persistence::SqliteCheckpointStore::new(path).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_checkpoints(
    path: &str,
) -> Result<Arc<dyn pipeline_controller::persistence::CheckpointStore>> {
    anyhow::bail!("checkpoint file {} needs the 'sqlite' feature", path)
}

#[cfg(feature = "sqlite")]
async fn show_checkpoint(cmd: &CheckpointCommand, cli: &Cli) -> Result<()> {
    use pipeline_controller::persistence::{CheckpointStore, SqliteCheckpointStore, STEP_WATCH};

    let path = match (&cmd.path, &cli.config) {
        (Some(path), _) => path.clone(),
        (None, Some(_)) => match load_config(cli)?.checkpoint_path {
            Some(path) => path,
            None => default_checkpoint_path()?,
        },
        (None, None) => default_checkpoint_path()?,
    };

    let store = SqliteCheckpointStore::new(&path).await?;
    let version = store.load(STEP_WATCH).await?;

    if cmd.json {
        let data = serde_json::json!({
            "path": path,
            "subscriber": STEP_WATCH,
            "version": version,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    match version {
        Some(version) => println!(
            "{} {} resumes after version {} ({})",
            INFO,
            style(STEP_WATCH).bold(),
            style(version).cyan(),
            style(&path).dim()
        ),
        None => println!("{} No checkpoint recorded in {}", INFO, style(&path).dim()),
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
fn default_checkpoint_path() -> Result<String> {
    let path = pipeline_controller::persistence::SqliteCheckpointStore::default_path()?;
    Ok(path
        .to_str()
        .context("Checkpoint path is not valid UTF-8")?
        .to_string())
}

#[cfg(not(feature = "sqlite"))]
async fn show_checkpoint(_cmd: &CheckpointCommand, _cli: &Cli) -> Result<()> {
    println!("{} Checkpoints need the 'sqlite' feature", WARN);
    Ok(())
}
