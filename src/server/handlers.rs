//! Request handlers.
//!
//! The dispatch handler is the gateway façade: it resolves the request
//! against the command registry, runs the command, and translates the
//! normalized outcome into the JSON response envelope. The small handlers
//! around it serve discovery, liveness, and introspection.

use crate::context::AppContext;
use crate::error::GatewayError;
use crate::exec::RunOptions;
use crate::registry::{CommandDescriptor, CommandHandler, CommandReply, Resolution};
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Success half of the wire contract.
#[derive(Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
}

impl From<CommandReply> for SuccessEnvelope {
    fn from(reply: CommandReply) -> Self {
        Self {
            success: true,
            output: reply.output,
            warnings: reply.warnings,
        }
    }
}

/// Unauthenticated discovery endpoint. Lets clients find devices on the
/// local network before any PIN is known, so it must stay outside the
/// access-control chain and answer fast.
pub async fn discover(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "deviceName": ctx.config.device_name,
        "message": "tuxd device available.",
    }))
}

/// Unauthenticated liveness endpoint.
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "tuxd server is running!",
    }))
}

/// Authenticated introspection: the full mounted-module listing, from
/// which clients build their UI without hardcoding any route.
pub async fn server_info(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let modules: Vec<Value> = ctx
        .registry
        .describe()
        .iter()
        .map(|module| {
            let routes: Vec<Value> = module
                .commands
                .iter()
                .map(|command| {
                    json!({
                        "path": module.route_path(command),
                        "method": command.method.as_str(),
                        "description": command.description,
                    })
                })
                .collect();
            json!({
                "name": module.display_name,
                "description": module.description,
                "basePath": module.base_path,
                "routes": routes,
            })
        })
        .collect();

    Json(json!({
        "message": "Welcome to tuxd!",
        "deviceName": ctx.config.device_name,
        "modules": modules,
    }))
}

/// Resolve and execute a registry command.
pub async fn dispatch(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HashMap<String, String>>,
    req: Request,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let descriptor = match ctx.registry.resolve(&path, &method) {
        Resolution::Command(descriptor) => descriptor,
        Resolution::MethodNotAllowed => return GatewayError::MethodNotAllowed.into_response(),
        Resolution::NotFound => {
            return GatewayError::NotFound(format!("Unknown API route: {path}")).into_response()
        }
    };

    // The prefix/method filter runs before authentication; privileged
    // commands mounted elsewhere (a drop-in module, infrared scan) are
    // caught here.
    if ctx.config.readonly && descriptor.privileged {
        ctx.audit.warn(&format!(
            "[POLICY] Blocked privileged command {method} {path} (read-only mode)."
        ));
        return GatewayError::ReadOnly.into_response();
    }

    match execute(&ctx, &descriptor, &params).await {
        Ok(reply) => (StatusCode::OK, Json(SuccessEnvelope::from(reply))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn execute(
    ctx: &AppContext,
    descriptor: &CommandDescriptor,
    params: &HashMap<String, String>,
) -> Result<CommandReply, GatewayError> {
    match &descriptor.handler {
        CommandHandler::Shell { template } => {
            let outcome = ctx
                .runner
                .run(
                    template,
                    RunOptions {
                        timeout: Some(descriptor.timeout),
                        stdin: None,
                    },
                )
                .await?;
            CommandReply::from_outcome(outcome, descriptor.timeout)
        }
        CommandHandler::Callback(callback) => {
            callback.invoke(&ctx.command_context(), params).await
        }
    }
}

/// Fallback for paths outside the mounted API surface.
pub async fn not_found(req: Request) -> Response {
    GatewayError::NotFound(format!("Unknown API route: {}", req.uri().path())).into_response()
}
