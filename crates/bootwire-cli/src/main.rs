use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bootwire_core::{Configuration, Instance, StopResult};
use bootwire_tokio::{ServerHandle, ShutdownReport};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod hello;

use config::{BootwireConfig, ConfigSource, Overrides};
use hello::HelloWorld;

#[derive(Parser)]
#[command(name = "bootwire", about = "bootwire: start a service on whichever runtime is registered")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the hello-world application and serve until interrupted
    Serve(ServeArgs),
    /// Print the effective configuration without starting anything
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Path to bootwire.toml (default: ./bootwire.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Protocol to serve (the tokio provider accepts HTTP)
    #[arg(long)]
    protocol: Option<String>,

    /// Bind address or hostname
    #[arg(long)]
    host: Option<String>,

    /// TCP port; 0 lets the system pick
    #[arg(long)]
    port: Option<u16>,

    /// Base path the application answers under
    #[arg(long)]
    root_path: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Stop on its own after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    exit_after: Option<u64>,
}

#[derive(Args)]
struct ShowConfigArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

impl ConfigArgs {
    fn load(&self) -> Result<(Configuration, ConfigSource)> {
        let (file, source) = BootwireConfig::discover(self.config.as_deref())?;
        let overrides = Overrides {
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            port: self.port.map(i32::from),
            root_path: self.root_path.clone(),
        };
        Ok((file.to_builder(&overrides)?.build(), source))
    }
}

#[derive(Serialize)]
struct ConfigView<'a> {
    source: String,
    protocol: &'a str,
    host: &'a str,
    port: i32,
    root_path: &'a str,
    ssl_client_authentication: String,
    ssl_context: &'a str,
    properties: Vec<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the instance and stop reports
    let builder = fmt()
        .with_env_filter(EnvFilter::from_env("BOOTWIRE_LOG"))
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::ShowConfig(args) => show_config(&args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let (configuration, source) = args.config.load()?;
    tracing::info!(source = ?source, "Configuration loaded");

    bootwire_tokio::install()?;

    let instance = bootwire_core::start(Arc::new(HelloWorld), configuration)
        .context("no runtime available to start the application")?
        .await
        .context("application failed to start")?;

    // Installed before the instance is announced so an early SIGTERM is caught.
    let shutdown = shutdown_signal()?;
    println!("{}", describe_instance(&instance)?);

    match args.exit_after {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                received = shutdown => received?,
            }
        }
        None => {
            println!("Press Ctrl-C to shut down.");
            shutdown.await?;
        }
    }

    let result = instance.stop().await.context("application failed to stop")?;
    println!("{}", describe_stop(&result)?);
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = std::io::Result<()>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            received = tokio::signal::ctrl_c() => received,
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                Ok(())
            }
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = std::io::Result<()>>> {
    Ok(tokio::signal::ctrl_c())
}

fn show_config(args: &ShowConfigArgs) -> Result<()> {
    let (configuration, source) = args.config.load()?;
    let ssl_context = configuration.ssl_context();
    let view = ConfigView {
        source: source.to_string(),
        protocol: configuration.protocol(),
        host: configuration.host(),
        port: configuration.port(),
        root_path: configuration.root_path(),
        ssl_client_authentication: configuration.ssl_client_authentication().to_string(),
        ssl_context: ssl_context.name(),
        properties: configuration.names().collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        let rendered = toml::to_string(&view).context("failed to render configuration")?;
        print!("{rendered}");
    }
    Ok(())
}

fn describe_instance(instance: &Instance) -> Result<String> {
    let conf = instance.configuration();
    let native = instance
        .unwrap_native::<ServerHandle>()?
        .map(|server| server.local_addr.to_string())
        .unwrap_or_else(|| "none".into());
    Ok(format!(
        "Instance {instance} running at {}://{}:{}{} [native handle: {native}]",
        conf.protocol().to_lowercase(),
        conf.host(),
        conf.port(),
        conf.root_path(),
    ))
}

fn describe_stop(result: &StopResult) -> Result<String> {
    let native = match result.unwrap_native::<ShutdownReport>()? {
        Some(report) => format!(
            "served {} connection(s), aborted {}, up {:.1}s",
            report.connections_served,
            report.connections_aborted,
            report.uptime.as_secs_f64()
        ),
        None => "none".into(),
    };
    Ok(format!(
        "Stop result: instance {} [native stop result: {native}]",
        result.instance_id()
    ))
}
