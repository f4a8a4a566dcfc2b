//! Access control chain.
//!
//! Three middleware run in front of every protected route, in this order:
//!
//! 1. [`readonly_filter`] — blanket policy, evaluated before identity: in
//!    read-only mode, state-changing methods and the privileged route
//!    prefix are rejected outright.
//! 2. [`require_pin`] — shared-secret check against the `X-Device-PIN`
//!    header. A no-op when no PIN is configured (explicit insecure mode,
//!    announced loudly at startup).
//! 3. [`audit_trail`] — records the final status code once the handler has
//!    produced its response, so the trail reflects true outcomes.
//!
//! The server never caches authentication: every request re-presents the
//! PIN, and there is no session state to steal or expire.

use crate::context::AppContext;
use crate::error::GatewayError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;

/// Header carrying the shared-secret PIN.
pub const PIN_HEADER: &str = "x-device-pin";

/// Route prefix whose commands require elevated privileges.
const PRIVILEGED_PREFIX: &str = "/api/root";

/// Reject state-changing and privileged requests while in read-only mode.
/// Runs before authentication: read-only is a blanket policy, independent
/// of identity.
pub async fn readonly_filter(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    if !ctx.config.readonly {
        return next.run(req).await;
    }

    let state_changing = matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    let path = req.uri().path();
    let privileged = path == PRIVILEGED_PREFIX
        || path.starts_with(&format!("{PRIVILEGED_PREFIX}/"));

    if state_changing || privileged {
        ctx.audit.warn(&format!(
            "[POLICY] Blocked {} {} for {} (read-only mode).",
            req.method(),
            path,
            client_addr(&req)
        ));
        return GatewayError::ReadOnly.into_response();
    }
    next.run(req).await
}

/// Enforce the PIN when one is configured. Denials are audit-logged with
/// the requester address, method, and path; the attempted PIN never is.
pub async fn require_pin(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(pin) = &ctx.config.pin else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(PIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if constant_time_eq(provided.as_bytes(), pin.as_bytes()) {
        return next.run(req).await;
    }

    ctx.audit.warn(&format!(
        "[AUTH] Denied access for {} to {} {}. Reason: incorrect or missing PIN.",
        client_addr(&req),
        req.method(),
        req.uri().path()
    ));
    GatewayError::Unauthorized.into_response()
}

/// Record the final status of every authenticated request once the
/// response is ready.
pub async fn audit_trail(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let addr = client_addr(&req);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    ctx.audit.info(&format!(
        "[API] {addr} - \"{method} {path}\" {}",
        response.status().as_u16()
    ));
    response
}

fn client_addr(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
