//! Remora RPC - exports the user service over TCP.
//!
//! `serve` binds the invocation listener and prints `REMORA_PORT=<port>` on
//! stdout once it accepts calls; `call` performs a single remote call and
//! prints the JSON result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use remora_core::{ExporterDefaults, RemoteClient, ServerConfig};
use remora_rpc::{export_user_service, ExportConfig, InMemoryUserService, User};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "remora-rpc")]
#[command(about = "Remote service exporter for the user service")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the user service and serve calls until Ctrl-C
    Serve(ServeArgs),
    /// Call a method on a running exporter
    Call(CallArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = ExporterDefaults::PORT)]
    port: u16,

    /// Name callers use to address the service
    #[arg(long, default_value = ExporterDefaults::SERVICE_NAME)]
    service_name: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value_t = ExporterDefaults::CALL_TIMEOUT.as_secs())]
    call_timeout_secs: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = ExporterDefaults::MAX_CONNECTIONS)]
    max_connections: usize,

    /// Serve /health and /services over HTTP on this port
    #[arg(long)]
    admin_port: Option<u16>,

    /// Start with a few demo users
    #[arg(long)]
    seed_demo_users: bool,
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Exporter address
    #[arg(long, default_value = "127.0.0.1:1099")]
    addr: SocketAddr,

    /// Service name
    #[arg(long, default_value = ExporterDefaults::SERVICE_NAME)]
    service: String,

    /// Method name
    #[arg(long)]
    method: String,

    /// Arguments as a JSON array
    #[arg(long, default_value = "[]")]
    args: String,
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };

    // Logs go to stderr; stdout carries the port line and call results.
    if json {
        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
    }
}

fn demo_users() -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
        },
        User {
            id: 42,
            name: "Grace Hopper".to_string(),
            email: "grace@example.com".to_string(),
        },
    ]
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = ExportConfig {
        server: ServerConfig::default()
            .with_host(args.host)
            .with_port(args.port)
            .with_call_timeout(Duration::from_secs(args.call_timeout_secs))
            .with_max_connections(args.max_connections),
        service_name: args.service_name,
    };

    let service = if args.seed_demo_users {
        InMemoryUserService::with_users(demo_users())
    } else {
        InMemoryUserService::new()
    };

    let mut exporter = export_user_service(&config, Arc::new(service))
        .await
        .context("Failed to export user service")?;

    if let Some(admin_port) = args.admin_port {
        exporter
            .serve_admin(admin_port)
            .await
            .context("Failed to start admin endpoint")?;
    }

    // Intentional stdout: callers (and tests) read the bound port from here.
    println!("REMORA_PORT={}", exporter.addr().port());

    info!("Remora exporter running on {}", exporter.addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining connections");
    exporter.shutdown().await;

    Ok(())
}

async fn call(args: CallArgs) -> Result<()> {
    let call_args: Vec<Value> =
        serde_json::from_str(&args.args).context("--args must be a JSON array")?;

    let client = RemoteClient::connect(args.addr).await?;
    let result = client.call(&args.service, &args.method, call_args).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.json_logs);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Call(args) => call(args).await,
    }
}
