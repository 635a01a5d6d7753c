pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use db::{DbOperations, DocumentStore, InMemoryStore};
pub use websocket::ConnectionRegistry;

/// Health check endpoint handler
/// Returns server status, timestamp and the number of live relay connections
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.registry.connection_count(),
    }))
}

/// Registers every route of the server.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    use api::handlers;

    cfg.route("/health", web::get().to(health_check))
        .route("/ws", web::get().to(websocket::websocket_route))
        .route("/campaigns", web::get().to(handlers::list_campaigns))
        .route("/campaigns", web::post().to(handlers::create_campaign))
        .route("/pots", web::get().to(handlers::list_pots))
        .route("/pots", web::post().to(handlers::create_pot))
        .route("/pots/{id}", web::get().to(handlers::get_pot))
        .route("/pots/{id}", web::put().to(handlers::update_pot))
        .route("/pots/{id}/donations", web::get().to(handlers::list_donations))
        .route("/pots/{id}/donations", web::post().to(handlers::add_donation));
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub db: DbOperations,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        Self::from_parts(
            config,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(InMemoryStore::new()),
        )
    }

    pub fn from_parts(
        config: Settings,
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            db: DbOperations::new(store),
        }
    }
}
