//! HTTP surface.
//!
//! Assembles the axum router from the command registry and serves it. The
//! unauthenticated discovery/liveness pair sits outside the access-control
//! chain; everything else passes read-only filter → PIN check → audit
//! trail, in that order.

pub mod access;
pub mod handlers;

use crate::context::AppContext;
use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::{any, get};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the full router. Layers apply bottom-up, so the read-only filter
/// (added last) runs first on every protected request.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let protected = Router::new()
        .route("/api/server-info", get(handlers::server_info))
        .route("/api/termux/{*rest}", any(handlers::dispatch))
        .route("/api/root/{*rest}", any(handlers::dispatch))
        .route("/api/modules/{*rest}", any(handlers::dispatch))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            access::audit_trail,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            access::require_pin,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            access::readonly_filter,
        ));

    Router::new()
        .route("/api/discover", get(handlers::discover))
        .route("/api/test", get(handlers::liveness))
        .merge(protected)
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind and serve until interrupted. Flushes the audit trail on the way
/// out.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = ctx.config.listen_addr()?;
    let app = build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    ctx.audit.info("--- tuxd server is live! ---");
    ctx.audit
        .info(&format!("Device name: {}", ctx.config.device_name));
    ctx.audit.info(&format!("Listening on http://{addr}"));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    ctx.audit.info("Server shut down.");
    ctx.audit.flush();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
