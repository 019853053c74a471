//! Functions emulator CLI entry point.
//!
//! Starts an emulator session, deploys the functions listed in the config
//! file and serves them until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emulator_common::{ConfigFile, FunctionEntry};
use emulator_controller::{Controller, ControllerConfig, TriggerSpec};

/// Run functions locally behind emulated HTTP and event triggers.
#[derive(Parser, Debug)]
#[command(name = "functions-emulator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to configuration file (TOML format)
    #[arg(short, long, env = "EMULATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Project the session is tied to (overrides `emulator.project_id`)
    #[arg(short, long)]
    project: Option<String>,

    /// Forward guest output and log invocation payloads
    #[arg(long)]
    debug: bool,

    /// Address to listen on (overrides `server.bind_addr`)
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting functions emulator");

    let mut config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(project) = args.project {
        config.emulator.project_id = project;
    }
    let debug = args.debug || config.emulator.debug;

    let executor = emulator_host::create_executor(&config.runtime)
        .context("Failed to initialize the function executor")?;
    let controller = Controller::new(Arc::new(executor), ControllerConfig::from(&config));

    controller
        .start(&config.emulator.project_id, debug, false)
        .await
        .context("Failed to start the emulator")?;

    let base = controller.url().unwrap_or_default();
    info!(url = %base, project = %config.emulator.project_id, "Emulator ready. Available endpoints:");
    info!("  GET  /health                    - Health check");
    info!("  GET  /ready                     - Readiness check");
    info!("  ANY  /:project/:region/:name    - Invoke an HTTP function");
    if config.admin.is_configured() {
        info!("  {}/functions             - Admin API", config.admin.prefix);
    } else if config.admin.enabled {
        warn!("Admin API enabled without a token; it stays disabled");
    }

    deploy_configured(&controller, &config.functions).await;

    shutdown_signal().await;

    controller.stop().await.context("Failed to stop the emulator")?;
    info!("Emulator stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,functions_emulator=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Deploy every `[[functions]]` entry. A failing entry is logged and skipped.
async fn deploy_configured(controller: &Controller, functions: &[FunctionEntry]) {
    for entry in functions {
        let spec = TriggerSpec {
            kind: Some(entry.trigger.clone()),
            event: None,
            resource: entry.resource.clone(),
        };

        match controller.deploy(&entry.path, &entry.name, &spec).await {
            Ok(descriptor) => match descriptor.endpoint() {
                Some(url) => info!(function = %entry.name, url = %url, "Deployed"),
                None => info!(
                    function = %entry.name,
                    trigger = %descriptor.trigger(),
                    "Deployed"
                ),
            },
            Err(e) => error!(function = %entry.name, path = %entry.path, error = %e, "Deployment failed"),
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
