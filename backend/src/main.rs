//! Main entry point for the Crestline mortgage-origination backend.
//!
//! Initializes logging, loads configuration, connects the two role-scoped
//! database pools, runs migrations, and starts the HTTP server via
//! `backend::run`.

use backend::run;
use log::{error, info};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // Initialize logger
    // Set default log level to info if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: This is safe because we're setting it at the very start of main,
        // before any threads are spawned or other code runs
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    info!("Starting Crestline backend application");

    // Load environment overrides from .env when present
    dotenv::dotenv().ok();

    // Load configuration
    let configuration =
        backend::configuration::get_configuration().expect("Failed to read configuration.");

    let host = configuration.application.host.clone();
    let port = configuration.application.port;
    let address = format!("{}:{}", host, port);
    let max_connections = configuration.database.max_connections.unwrap_or(5);

    info!("Configuration loaded: host={}, port={}", host, port);

    // Lending pool: owns migrations and all lifecycle writes.
    info!("Connecting to lending database...");
    let lending_pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&configuration.database.lending_connection_string())
        .await
        .map_err(|e| {
            error!("Failed to connect to lending database: {}", e);
            std::io::Error::other(e)
        })?;
    info!("Lending database connection established");

    // Compliance pool: the hmda schema role.
    info!("Connecting to compliance database...");
    let compliance_pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&configuration.database.compliance_connection_string())
        .await
        .map_err(|e| {
            error!("Failed to connect to compliance database: {}", e);
            std::io::Error::other(e)
        })?;
    info!("Compliance database connection established");

    // Run database migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&lending_pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            std::io::Error::other(e)
        })?;
    info!("Database migrations applied successfully");

    info!("Starting server on {}", address);

    // Create TCP listener
    let listener = TcpListener::bind(&address).map_err(|e| {
        error!("Failed to bind to address {}: {}", address, e);
        e
    })?;

    info!("Server bound to {}", address);

    // Run the server
    run(listener, configuration, lending_pool, compliance_pool)
        .await?
        .await
}
