//! queue-gateway
//!
//! HTTP front for microservices reachable only through a message broker.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  GATEWAY                      │
//!     Client Request     │  ┌────────┐   ┌──────────┐   ┌────────────┐  │      ┌──────────────┐
//!     ───────────────────┼─▶│  http  │──▶│ routing  │──▶│  delegate  │──┼─────▶│ <name>       │
//!                        │  │ server │   │  chain   │   │ (pending)  │  │      │  .requests   │
//!                        │  └────────┘   └──────────┘   └────────────┘  │      └──────┬───────┘
//!                        │       ▲                                       │             ▼
//!                        │       │        ┌──────────────────┐          │      ┌──────────────┐
//!     Client Response    │       └────────│ reply consumers  │◀─────────┼──────│ microservice │
//!     ◀──────────────────┼────────────────│ (by requestId)   │          │      │   (service)  │
//!                        │                └──────────────────┘          │      └──────────────┘
//!                        └──────────────────────────────────────────────┘
//! ```
//!
//! The binary runs against the in-process broker. `--echo-services` also
//! starts an echo microservice per configured backend.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use queue_gateway::broker::{Broker, InMemoryBroker, MicroserviceBinding};
use queue_gateway::config::{load_config, GatewayConfig};
use queue_gateway::lifecycle::signals::shutdown_on_signal;
use queue_gateway::observability::{logging, metrics};
use queue_gateway::{Gateway, GatewayResponse, Microservice, Next, Request, ResponseSink, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "queue-gateway", version, about = "HTTP gateway over a message broker")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Run an in-process echo microservice for every configured backend
    #[arg(long)]
    echo_services: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "queue-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        microservices = config.microservices.len(),
        routes = config.routes.len(),
        pending_timeout_secs = config.gateway.pending_timeout_secs,
        "Configuration loaded"
    );

    let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
    let shutdown = Shutdown::new();

    if cli.echo_services {
        for ms in &config.microservices {
            let binding = MicroserviceBinding::from_config(ms, Arc::clone(&broker));
            let service = Microservice::echo(binding);
            let name = ms.name.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(e) = service.run(rx).await {
                    tracing::error!(microservice = %name, error = %e, "Echo microservice failed");
                }
            });
        }
    }

    let mut gateway = Gateway::from_config(&config, broker, shutdown.clone());
    gateway
        .routes()
        .use_middleware(
            |req: Request, res: GatewayResponse, _next: Next<GatewayResponse>| async move {
                let body = json!({
                    "error": "no route",
                    "method": req.method.as_str(),
                    "path": req.path,
                });
                res.json(StatusCode::NOT_FOUND, body).await
            },
        )
        .on("listening", |args| {
            if let Some(addr) = args.first() {
                tracing::info!(address = %addr, "Accepting connections");
            }
        });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tokio::spawn(shutdown_on_signal(shutdown));

    gateway.listen(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
