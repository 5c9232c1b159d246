//! Admin HTTP API.
//!
//! Every route requires `Authorization: Bearer <api_key>`.
//!
//! | Method | Path                    | Purpose                          |
//! |--------|-------------------------|----------------------------------|
//! | GET    | `/admin/status`         | version and backend counts       |
//! | GET    | `/admin/stats`          | full balancer statistics         |
//! | GET    | `/admin/select`         | run one selection                |
//! | POST   | `/admin/backends`       | register a backend               |
//! | DELETE | `/admin/backends/{id}`  | unregister a backend             |

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::health::HttpProbe;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::LoadBalancer;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<LoadBalancer>,
    /// Registered backends with a `health_url` become probe targets here.
    pub probe: Option<Arc<HttpProbe>>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(balancer: Arc<LoadBalancer>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            balancer,
            probe: None,
            api_key: api_key.into(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<HttpProbe>) -> Self {
        self.probe = Some(probe);
        self
    }
}

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/select", get(select_backend))
        .route("/admin/backends", post(register_backend))
        .route("/admin/backends/{id}", delete(unregister_backend))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
            tracing::info!("Admin API shutting down");
        })
        .await
}
