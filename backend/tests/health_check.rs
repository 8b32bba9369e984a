//! Integration tests for the backend application.
//!
//! Spawns the server on an ephemeral port with lazily-connected pools,
//! so the HTTP surface is exercised without a live database. Endpoints
//! that need the database are covered by their service-level tests.

use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;

/// Spawns the application on a random port and returns its base URL.
async fn spawn_app() -> String {
    let settings =
        backend::configuration::get_configuration().expect("default configuration should load");

    // Lazy pools perform no I/O until a query runs, which keeps the
    // auth/health surface testable without Postgres.
    let lending_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&settings.database.lending_connection_string())
        .expect("lazy lending pool");
    let compliance_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&settings.database.compliance_connection_string())
        .expect("lazy compliance pool");

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("listener address").port();

    let server = backend::run(listener, settings, lending_pool, compliance_pool)
        .await
        .expect("Failed to spawn our app.");
    tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let address = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn api_requests_without_a_token_are_unauthorized() {
    let address = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/applications", address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn malformed_bearer_tokens_are_rejected() {
    let address = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/applications", address))
        .header("Authorization", "Bearer not-a-jwt")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn analytics_requires_authentication() {
    let address = spawn_app().await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/analytics/pipeline?days=30", address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}
