use beacon::{build_analytics, create_router, init_tracing, shutdown_telemetry, AppState, Config};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    });

    init_tracing(&config);

    info!(
        service = "beacon",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    if !issues.is_empty() {
        for issue in &issues {
            warn!(issue = %issue, "Configuration warning");
        }
    }

    let (sink, publisher) = build_analytics(&config.analytics).unwrap_or_else(|e| {
        error!(error = %e, "Failed to configure analytics transport");
        std::process::exit(1);
    });

    let state = AppState::new(sink, &config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to load JWT public key");
        std::process::exit(1);
    });

    if state.tokens.is_none() {
        info!("JWT_PUBLIC_KEY not set, all requests will be anonymous");
    }

    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(http_address = %http_addr, "HTTP server ready");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    {
        error!(error = %e, "HTTP server error");
    }

    if let Some(publisher) = publisher {
        info!("Draining analytics publisher...");
        if let Err(e) = publisher
            .shutdown(config.analytics.shutdown_timeout())
            .await
        {
            warn!(error = %e, "Analytics publisher did not drain cleanly");
        }
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}
