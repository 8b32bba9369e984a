use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{debug, error, info};
use sqlx::PgPool;
use std::net::TcpListener;

// Module declarations
pub mod auth;
pub mod clients;
pub mod configuration;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use crate::auth::JwksCache;
use crate::clients::{AgentClient, BlobStore, LlmClient};
use crate::configuration::Settings;

/// Process-wide application state: configuration, the two role-scoped
/// connection pools, and the external-service clients. Built once at
/// startup, shared read-only across requests, torn down at shutdown.
pub struct AppState {
    pub settings: Settings,
    pub lending_pool: PgPool,
    pub compliance_pool: PgPool,
    pub jwks: JwksCache,
    pub blob: BlobStore,
    pub llm: LlmClient,
    pub agent: AgentClient,
}

/// Performs a basic health check of the service.
///
/// Used by orchestrators to verify the process is up; involves no
/// dependencies.
async fn health_check() -> impl Responder {
    debug!("Health check endpoint called");
    HttpResponse::Ok()
}

/// Checks the health of the lending database connection.
async fn db_health_check(data: web::Data<AppState>) -> impl Responder {
    debug!("Database health check endpoint called");
    match sqlx::query("SELECT 1").fetch_one(&data.lending_pool).await {
        Ok(_) => {
            debug!("Database health check: OK");
            HttpResponse::Ok().json(serde_json::json!({
                "status": "ok",
                "database": "connected"
            }))
        }
        Err(e) => {
            error!("Database health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "error",
                "database": "disconnected",
                "error": e.to_string()
            }))
        }
    }
}

/// Configures and starts the HTTP server.
///
/// Wraps the shared state in `web::Data` and registers the full route
/// table. The caller controls the listener, which keeps the bind address
/// (and an ephemeral test port) in the caller's hands.
pub async fn run(
    listener: TcpListener,
    settings: Settings,
    lending_pool: PgPool,
    compliance_pool: PgPool,
) -> Result<Server, std::io::Error> {
    info!("Listening on: {:?}", &listener);

    let state = web::Data::new(AppState {
        jwks: JwksCache::new(settings.auth.jwks_url.clone()),
        blob: BlobStore::new(&settings.blob),
        llm: LlmClient::new(&settings.llm),
        agent: AgentClient::new(&settings.agent),
        settings,
        lending_pool,
        compliance_pool,
    });

    info!("Configuring HTTP server routes");
    let server = HttpServer::new(move || {
        debug!("Creating new App instance");
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/health/db", web::get().to(db_health_check))
            // Applications
            .route("/api/applications/start", web::post().to(handlers::applications::start_application))
            .route("/api/applications", web::post().to(handlers::applications::create_application))
            .route("/api/applications", web::get().to(handlers::applications::list_applications))
            .route("/api/applications/{id}", web::get().to(handlers::applications::get_application))
            .route("/api/applications/{id}", web::patch().to(handlers::applications::patch_application))
            .route("/api/applications/{id}/transition", web::post().to(handlers::applications::transition_application))
            .route("/api/applications/{id}/status", web::get().to(handlers::applications::get_status))
            .route("/api/applications/{id}/borrowers", web::post().to(handlers::applications::add_borrower))
            .route("/api/applications/{id}/borrowers/{borrower_id}", web::delete().to(handlers::applications::remove_borrower))
            .route("/api/applications/{id}/rate-locks", web::get().to(handlers::applications::list_rate_locks))
            .route("/api/applications/{id}/rate-locks", web::post().to(handlers::applications::create_rate_lock))
            .route("/api/applications/{id}/risk", web::get().to(handlers::applications::get_risk))
            // Documents
            .route("/api/applications/{id}/documents", web::post().to(handlers::documents::upload_document))
            .route("/api/applications/{id}/documents", web::get().to(handlers::documents::list_documents))
            .route("/api/applications/{id}/completeness", web::get().to(handlers::documents::get_completeness))
            .route("/api/applications/{id}/documents/{doc_id}", web::get().to(handlers::documents::get_document))
            .route("/api/applications/{id}/documents/{doc_id}/content", web::get().to(handlers::documents::get_document_content))
            .route("/api/applications/{id}/documents/{doc_id}/extractions", web::get().to(handlers::documents::list_extractions))
            .route("/api/applications/{id}/documents/{doc_id}/review", web::post().to(handlers::documents::review_document))
            // Conditions
            .route("/api/applications/{id}/conditions", web::get().to(handlers::conditions::list_conditions))
            .route("/api/applications/{id}/conditions", web::post().to(handlers::conditions::create_condition))
            .route("/api/applications/{id}/conditions/{condition_id}/respond", web::post().to(handlers::conditions::respond_condition))
            .route("/api/applications/{id}/conditions/{condition_id}/action", web::post().to(handlers::conditions::condition_action))
            // Decisions
            .route("/api/applications/{id}/decisions/propose", web::post().to(handlers::decisions::propose_decision))
            .route("/api/applications/{id}/decisions", web::post().to(handlers::decisions::render_decision))
            .route("/api/applications/{id}/decisions", web::get().to(handlers::decisions::list_decisions))
            .route("/api/applications/{id}/decisions/{decision_id}", web::get().to(handlers::decisions::get_decision))
            // Compliance
            .route("/api/applications/{id}/compliance-check", web::post().to(handlers::compliance::run_compliance_check))
            .route("/api/applications/{id}/compliance-check", web::get().to(handlers::compliance::get_compliance_check))
            .route("/api/applications/{id}/audit", web::get().to(handlers::audit::events_for_application))
            // HMDA (compliance schema)
            .route("/api/hmda/collect", web::post().to(handlers::hmda::collect_demographics))
            .route("/api/hmda/demographics/{id}", web::get().to(handlers::hmda::get_demographics))
            .route("/api/hmda/loan-data/{id}", web::get().to(handlers::hmda::get_loan_data))
            // Audit
            .route("/api/audit/verify", web::get().to(handlers::audit::verify))
            .route("/api/audit/events", web::get().to(handlers::audit::list_events))
            .route("/api/audit/export", web::get().to(handlers::audit::export))
            .route("/api/audit/decisions/{decision_id}/trace", web::get().to(handlers::audit::decision_trace))
            // Analytics
            .route("/api/analytics/pipeline", web::get().to(handlers::analytics::pipeline))
            .route("/api/analytics/denial-trends", web::get().to(handlers::analytics::denial_trends))
            // Admin
            .route("/api/admin/audit", web::get().to(handlers::admin::audit_by_session))
            .route("/api/admin/audit-violations", web::get().to(handlers::admin::audit_violations))
            .route("/api/admin/seed-demo", web::post().to(handlers::admin::seed_demo))
            // Knowledge base
            .route("/api/kb/search", web::get().to(handlers::kb::search))
            // Chat (role-scoped WebSocket; registered last)
            .route("/api/{role}/chat", web::get().to(handlers::chat::chat))
    })
    .listen(listener)?
    .run();

    info!("HTTP server started successfully");
    Ok(server)
}
