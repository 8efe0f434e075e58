pub mod config;
pub mod mailer;
pub mod page;
pub mod routes;
pub mod session;
pub mod voice;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use serde_json::json;
use shoplist_core::{RecipientPolicy, VoiceIntents};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use config::PageConfig;
use mailer::MailTransport;
use session::SessionStore;
use voice::VoiceBackend;

pub use routes::review_router;
pub use session::{ClientSession, SessionId};

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Voice loop settings plus the engines it talks to.
pub struct VoiceSettings {
    pub intents: VoiceIntents,
    pub backend: Arc<dyn VoiceBackend>,
}

pub struct AppState {
    pub sessions: SessionStore,
    pub page: PageConfig,
    pub recipients: Option<RecipientPolicy>,
    /// `None` when email is not configured.
    pub mailer: Option<Arc<dyn MailTransport>>,
    /// `None` when voice review is disabled.
    pub voice: Option<VoiceSettings>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "shoplist",
        "version": get_version(),
    }))
}

/// The full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(review_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
