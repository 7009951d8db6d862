//! Read-only diagnostics API.
//!
//! # Endpoints
//! - `GET /admin/status`: apply count, sizes, prober and permit usage
//! - `GET /admin/clusters`: destinations with health and in-flight counts
//! - `GET /admin/routes`: every route, including unresolved ones
//! - `GET /admin/errors`: errors reported by the most recent apply
//!
//! All endpoints require `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::reconcile::ConfigReconciler;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub reconciler: Arc<ConfigReconciler>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(reconciler: Arc<ConfigReconciler>, api_key: &str) -> Self {
        Self {
            reconciler,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/clusters", get(get_clusters))
        .route("/admin/routes", get(get_routes))
        .route("/admin/errors", get(get_errors))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
