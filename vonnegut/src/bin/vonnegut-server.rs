//! `vonnegut-server`: loads configuration, starts the Kafka-compatible TCP
//! listener, and dispatches accepted connections to their own thread
//! (SPEC_FULL §1.2, §4.7). The accept loop runs on the tokio runtime so
//! `Ctrl-C` can be awaited alongside it; each connection's actual request
//! handling is synchronous, matching the single-writer-per-partition
//! design (SPEC_FULL §5.1).

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use vonnegut::dispatcher::{Dispatcher, NoopClusterManager};
use vonnegut::network;
use vonnegut::registry::PartitionRegistry;
use vonnegut_common::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "vonnegut-server", about = "Partitioned append-only commit-log server")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used for anything absent.
    #[arg(long, default_value = "vonnegut.toml")]
    config: String,

    /// Override the configured bind address.
    #[arg(long)]
    bind_address: Option<String>,

    /// Number of append/fetch tasks each partition worker will queue before blocking senders.
    #[arg(long, default_value_t = 1024)]
    queue_depth: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        warn!(error = %e, "failed to install prometheus metrics exporter, continuing without it");
    }

    let args = Args::parse();
    let mut config = if std::path::Path::new(&args.config).exists() {
        EngineConfig::load(&args.config).context("loading configuration")?
    } else {
        warn!(path = %args.config, "config file not found, using defaults");
        EngineConfig::default()
    };
    if let Some(bind) = args.bind_address {
        config.server.bind_address = bind;
    }

    let registry = PartitionRegistry::new(config.log.clone(), args.queue_depth);
    let dispatcher = Arc::new(Dispatcher::new(registry, NoopClusterManager));

    let listener = TcpListener::bind(&config.server.bind_address)
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(addr = %config.server.bind_address, "vonnegut-server listening");

    let accept_handle = {
        let dispatcher = dispatcher.clone();
        tokio::task::spawn_blocking(move || accept_loop(listener, dispatcher))
    };

    tokio::select! {
        result = accept_handle => {
            result.context("accept loop panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn accept_loop(listener: TcpListener, dispatcher: Arc<Dispatcher<NoopClusterManager>>) -> Result<()> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let dispatcher = dispatcher.clone();
        std::thread::spawn(move || network::serve_connection(stream, dispatcher));
    }
    Ok(())
}
