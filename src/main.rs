//! query-gateway server binary.
//!
//! # Architecture Overview
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                QUERY GATEWAY                  │
//!                  │                                               │
//!  HTTP/WebSocket  │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!  ────────────────┼─▶│  http  │──▶│ gateway  │──▶│ transport  │  │
//!                  │  │ codec  │   │ (corr.)  │   │  (dealer)  │  │
//!                  │  └────────┘   └──────────┘   └─────┬──────┘  │
//!                  │                                     │         │
//!                  │                               ┌─────▼──────┐  │
//!                  │                               │   worker   │  │
//!                  │                               │ (dispatch) │  │
//!                  │                               └────────────┘  │
//!                  │                                               │
//!                  │  config · lifecycle · observability           │
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! Startup order: logging → config → metrics → dispatch worker → gateway.
//! Any bind failure or missing certificate aborts startup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use query_gateway::config::{self, GatewayConfig};
use query_gateway::gateway::{MethodRegistry, QueryTranslator, WebGateway};
use query_gateway::lifecycle::{signals, Shutdown};
use query_gateway::messages::CommandRequest;
use query_gateway::observability::{logging, metrics};
use query_gateway::worker::{CommandHandler, RequestWorker, SendWorker};

#[derive(Parser)]
#[command(name = "query-gateway")]
#[command(about = "JSON-RPC/WebSocket gateway over an identity-routed backend transport")]
struct Args {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_filter);
    tracing::info!("query-gateway v0.1.0 starting");
    tracing::info!(
        query_endpoint = %config.backend.query_endpoint,
        heartbeat_endpoint = %config.backend.heartbeat_endpoint,
        bind_address = %config.web.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(address) => metrics::init_metrics(address),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_handler(&shutdown);

    // Bind the backend services first so the gateway's dealer can connect.
    let mut worker = RequestWorker::start(&config.backend).await?;

    // Built-in echo command; business handlers are attached by name the
    // same way.
    let ping: CommandHandler = Arc::new(|request: CommandRequest, sender: SendWorker| {
        let reply = request.reply(request.data());
        sender.queue_send(reply);
    });
    worker.attach("ping", ping);

    let worker_task = tokio::spawn(worker.run(shutdown.subscribe()));

    let mut registry = MethodRegistry::new();
    registry.register("ping", QueryTranslator::passthrough("ping"));

    let gateway = WebGateway::start(
        config.web.clone(),
        &config.backend,
        registry,
        shutdown.subscribe(),
    )
    .await?;
    tracing::info!(address = %gateway.local_addr(), "Web gateway ready");

    shutdown.subscribe().triggered().await;
    worker_task.await.ok();

    tracing::info!("Shutdown complete");
    Ok(())
}
