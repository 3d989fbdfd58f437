use api::{build_app, init_database, init_oauth_services, init_tracing};
use config::ApiConfig;

#[tokio::main]
async fn main() {
    // A missing .env is fine; the environment may already be populated
    let _ = dotenvy::dotenv();

    // Load configuration first to get logging settings
    let config = ApiConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let database = init_database(&config.database).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to initialize database");
        std::process::exit(1);
    });

    let app_state = init_oauth_services(&database, &config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to initialize OAuth services");
        std::process::exit(1);
    });

    let app = build_app(app_state);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(address = %bind_address, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    tracing::info!(address = %bind_address, "Server started successfully");
    tracing::info!("Endpoints:");
    tracing::info!("  - GET/POST /oauth/{{platform}} (OAuth callback; web, desktop, mobile)");
    tracing::info!("  - GET /oauth/{{platform}}/authorize (Start OAuth login)");
    tracing::info!("  - GET /health");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
