//! jadxd service binary.
//!
//! Runs the query service over MCP stdio (default) or HTTP, or probes a single
//! artifact from the command line. Each session's engine runs on its own worker
//! thread; the transports run on the tokio runtime.

use clap::{Args, Parser, Subcommand};
use jadxd::engine::SnapshotEngineFactory;
use jadxd::server::{self, AgentServer, RestServer};
use jadxd::session::DEFAULT_QUEUE_CAPACITY;
use jadxd::{expand_path, DiskCache, Dispatcher, Envelope, SessionRegistry};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CACHE_DIR: &str = "~/.cache/jadxd";

#[derive(Parser)]
#[command(name = "jadxd", version, about = "Query service over a Java/Dalvik decompiler")]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Run the REST server
    ServeHttp(ServeHttpArgs),
    /// Load one artifact, run one method against it and print the envelopes
    Probe(ProbeArgs),
}

#[derive(Args)]
struct ServiceArgs {
    /// Decompile cache directory
    #[arg(long, env = "JADXD_CACHE_DIR", global = true)]
    cache_dir: Option<String>,
    /// Directory for per-session alias databases (defaults to <cache-dir>/aliases)
    #[arg(long, env = "JADXD_ALIAS_DIR", global = true)]
    alias_dir: Option<String>,
    /// Pending jobs buffered per session; further callers wait for room
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, global = true)]
    queue_capacity: usize,
}

#[derive(Args)]
struct ServeHttpArgs {
    /// Bind address (e.g., 127.0.0.1:8085)
    #[arg(long, default_value = "127.0.0.1:8085")]
    bind: String,
}

#[derive(Args)]
struct ProbeArgs {
    /// Path to the artifact
    #[arg(long)]
    path: String,
    /// Enable deobfuscation for this load
    #[arg(long)]
    deobfuscation: bool,
    /// Method to run after loading
    #[arg(long, default_value = "list_types")]
    method: String,
    /// Method arguments as a JSON object
    #[arg(long, default_value = "{}")]
    args: String,
}

/// Resolved service configuration.
#[derive(Debug)]
struct ServiceConfig {
    cache_dir: PathBuf,
    alias_dir: PathBuf,
    queue_capacity: usize,
}

impl ServiceConfig {
    fn from_args(args: &ServiceArgs) -> anyhow::Result<Self> {
        if args.queue_capacity == 0 {
            anyhow::bail!("--queue-capacity must be at least 1");
        }
        let cache_dir = expand_path(args.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR));
        let alias_dir = match args.alias_dir.as_deref() {
            Some(dir) => expand_path(dir),
            None => cache_dir.join("aliases"),
        };
        Ok(Self {
            cache_dir,
            alias_dir,
            queue_capacity: args.queue_capacity,
        })
    }

    fn build_registry(&self) -> anyhow::Result<Arc<SessionRegistry>> {
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| anyhow::anyhow!("creating {}: {e}", self.cache_dir.display()))?;
        std::fs::create_dir_all(&self.alias_dir)
            .map_err(|e| anyhow::anyhow!("creating {}: {e}", self.alias_dir.display()))?;
        info!(
            cache_dir = %self.cache_dir.display(),
            alias_dir = %self.alias_dir.display(),
            queue_capacity = self.queue_capacity,
            "Service configured"
        );
        Ok(Arc::new(SessionRegistry::new(
            DiskCache::new(&self.cache_dir),
            &self.alias_dir,
            Arc::new(SnapshotEngineFactory),
            self.queue_capacity,
        )))
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jadxd=info")))
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_args(&cli.service)?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create tokio runtime: {e}"))?;

    rt.block_on(async move {
        let registry = config.build_registry()?;
        let result = match cli.command.unwrap_or(Command::Serve) {
            Command::Serve => run_server(registry.clone()).await,
            Command::ServeHttp(args) => run_server_http(registry.clone(), args).await,
            Command::Probe(args) => run_probe(registry.clone(), args).await,
        };
        registry.close_all().await;
        info!("Server stopped");
        result
    })
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

async fn run_server(registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    info!("Starting jadxd (MCP stdio)");
    let server = AgentServer::new(Dispatcher::new(registry));
    let mut service = Some(server.serve(stdio()).await?);
    info!("MCP server listening on stdio");

    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_signal = shutdown_notify.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_signal.notify_one();
        } else {
            warn!("Shutdown signal handler failed; server will continue running");
        }
    });

    loop {
        tokio::select! {
            _ = shutdown_notify.notified() => {
                if let Some(mut running) = service.take() {
                    let _ = running.close().await?;
                }
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if service.as_ref().is_some_and(|running| running.is_transport_closed()) {
                    if let Some(running) = service.take() {
                        let _ = running.waiting().await?;
                    }
                    break;
                }
            }
        }
    }
    info!("MCP server shutting down");
    Ok(())
}

async fn run_server_http(registry: Arc<SessionRegistry>, args: ServeHttpArgs) -> anyhow::Result<()> {
    info!("Starting jadxd (REST)");
    let bind_addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind failed: {e}"))?;

    let cancel = CancellationToken::new();
    let cancel_for_shutdown = cancel.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("Shutdown signal received");
            cancel_for_shutdown.cancel();
        }
    });

    RestServer::new(Dispatcher::new(registry))
        .serve(listener, cancel)
        .await
}

fn print_envelope(envelope: &Envelope) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

async fn run_probe(registry: Arc<SessionRegistry>, args: ProbeArgs) -> anyhow::Result<()> {
    let method_args: Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {e}"))?;

    let loaded = server::load_artifact(
        &registry,
        json!({"path": args.path, "settings": {"deobfuscation": args.deobfuscation}}),
    )
    .await;
    print_envelope(&loaded)?;
    let session_id = loaded
        .data
        .as_ref()
        .and_then(|data| data.get("session_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("load failed: {}", loaded.error.as_deref().unwrap_or("")))?;

    let result = Dispatcher::new(registry.clone())
        .dispatch(&session_id, &args.method, method_args)
        .await;
    print_envelope(&result)?;

    registry.close(&session_id).await;
    if !result.ok {
        anyhow::bail!("{} failed", args.method);
    }
    Ok(())
}
