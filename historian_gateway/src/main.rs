use historian_gateway::api::diagnostics::create_diagnostics_routes;
use historian_gateway::config::settings::Settings;
use historian_gateway::logging::init_logging;
use historian_gateway::runtime::{build_transport, open_store, Runtime};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Load Configuration ---
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("FATAL: Failed to load configuration from {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_logging(&settings.log_level, None);
    info!("Historian gateway starting...");
    info!(
        "Configuration loaded: plc {} ({}), {} tags",
        settings.plc.name,
        settings.plc.endpoint(),
        settings.tags.len()
    );
    if let Err(e) = settings.validate() {
        error!("FATAL: Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // --- Channel and history store ---
    let transport = build_transport(&settings.plc)?;
    let store = open_store(&settings.history)?;

    let mut runtime = Runtime::new(&settings, transport, store);
    runtime.start().await;

    // --- Diagnostics server ---
    let server = if settings.diagnostics.enabled {
        let addr: SocketAddr = settings.diagnostics.bind.parse()?;
        let app = create_diagnostics_routes().with_state(runtime.diagnostics_state());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Diagnostics server listening on {}", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Diagnostics server error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");

    if let Some(server) = server {
        server.abort();
    }
    runtime.shutdown().await;
    Ok(())
}
