//! HTTP and WebSocket transport for [`apollo_gateway`].
//!
//! [`router`] serves GraphQL requests, [`admin_router`] the persisted query
//! administration API. The two are meant for separate listeners.

pub mod accounts;
mod admin;
mod context;
mod graphql;

pub use self::context::ContextExtractor;
pub use self::context::RawHeaders;
use apollo_gateway::Gateway;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub extractor: Arc<dyn ContextExtractor>,
}

impl AppState {
    /// State with the [`RawHeaders`] extractor
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            extractor: Arc::new(RawHeaders),
        }
    }

    pub fn with_extractor(mut self, extractor: impl ContextExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }
}

/// `POST /graphql` and `GET /graphql/ws`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/graphql", post(graphql::post_graphql))
        .route("/graphql/ws", get(graphql::upgrade_websocket))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Persisted query administration
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/queries",
            get(admin::list_queries).post(admin::register_query),
        )
        .route("/queries/:id", delete(admin::remove_query))
        .route("/queries/:id/allowed", put(admin::set_allowed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
