//! Command registry.
//!
//! The registry is the single source of truth for what the gateway can
//! execute. It is built once at startup, before the listener accepts
//! connections, from three sources:
//!
//! 1. built-in route tables (Termux capability routes, privileged root
//!    routes) in [`builtin`],
//! 2. compiled-in plug-ins registered through the [`Plugin`] trait,
//! 3. drop-in TOML manifests discovered in the configured `tux` directory
//!    ([`manifest`]).
//!
//! Route mounting and the introspection listing are both derived from the
//! same descriptor set, so what is advertised is exactly what is callable.
//! Discovery is deterministic (manifests are loaded in lexical filename
//! order) and idempotent: scanning an unchanged directory twice yields an
//! identical registry.

pub mod builtin;
pub mod manifest;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::GatewayError;
use crate::exec::{CommandRunner, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Base path under which drop-in and compiled-in modules are mounted.
pub const MODULES_BASE: &str = "/api/modules";

/// What dispatch hands a callback handler.
pub struct CommandContext {
    pub runner: Arc<CommandRunner>,
}

/// Successful result of a callback handler, merged into the response
/// envelope by the gateway façade.
#[derive(Debug)]
pub struct CommandReply {
    pub output: serde_json::Value,
    pub warnings: Option<String>,
}

impl CommandReply {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: serde_json::Value::String(output.into()),
            warnings: None,
        }
    }

    pub fn json(output: serde_json::Value) -> Self {
        Self {
            output,
            warnings: None,
        }
    }

    /// Normalize a process outcome into the response contract: timeout and
    /// non-zero exit become errors, stderr on success becomes a warning.
    pub fn from_outcome(
        outcome: crate::exec::ExecutionOutcome,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        if outcome.timed_out {
            return Err(GatewayError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if !outcome.success {
            let message = match outcome.exit_code {
                Some(code) => format!("Command exited with code {code}."),
                None => "Command was terminated by a signal.".to_string(),
            };
            return Err(GatewayError::Execution {
                message,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            });
        }
        Ok(Self {
            output: serde_json::Value::String(outcome.stdout),
            warnings: (!outcome.stderr.is_empty()).then_some(outcome.stderr),
        })
    }
}

impl From<crate::exec::ExecError> for GatewayError {
    fn from(e: crate::exec::ExecError) -> Self {
        GatewayError::Execution {
            message: e.to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// A command implemented in code rather than as a shell template.
#[async_trait]
pub trait CommandCallback: Send + Sync {
    async fn invoke(
        &self,
        ctx: &CommandContext,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError>;
}

/// How a command is executed.
pub enum CommandHandler {
    /// Fixed shell template run through the process runner. Templates never
    /// contain request input; dynamic values travel via stdin or are
    /// sanitized long before they reach a callback's own template.
    Shell { template: String },

    /// Compiled-in handler.
    Callback(Arc<dyn CommandCallback>),
}

/// One routable command. Immutable once loaded.
pub struct CommandDescriptor {
    /// Route key below the module base path; may contain `/`.
    pub key: String,

    /// The single HTTP method this command answers to. Side-effecting
    /// commands use POST.
    pub method: Method,

    pub handler: CommandHandler,

    /// True when the underlying command needs elevated privileges (`su`).
    /// Privileged commands are unreachable in read-only mode.
    pub privileged: bool,

    /// Execution budget for the process runner.
    pub timeout: Duration,

    pub description: String,
}

impl CommandDescriptor {
    /// Shell-template command with the default timeout.
    pub fn shell(
        key: impl Into<String>,
        method: Method,
        template: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            method,
            handler: CommandHandler::Shell {
                template: template.into(),
            },
            privileged: false,
            timeout: DEFAULT_TIMEOUT,
            description: description.into(),
        }
    }

    /// Callback command with the default timeout.
    pub fn callback(
        key: impl Into<String>,
        method: Method,
        callback: Arc<dyn CommandCallback>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            method,
            handler: CommandHandler::Callback(callback),
            privileged: false,
            timeout: DEFAULT_TIMEOUT,
            description: description.into(),
        }
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A mounted module: a name, a base path, and an ordered command list.
/// Created once at startup, never mutated, re-scanned only on restart.
pub struct ModuleDescriptor {
    /// Path-safe unique name; becomes the URL segment for drop-in modules.
    pub name: String,

    pub display_name: String,
    pub description: String,

    /// Mount prefix, e.g. `/api/termux` or `/api/modules/example`.
    pub base_path: String,

    pub commands: Vec<Arc<CommandDescriptor>>,
}

impl ModuleDescriptor {
    /// Full route path of one of this module's commands.
    pub fn route_path(&self, command: &CommandDescriptor) -> String {
        format!("{}/{}", self.base_path, command.key)
    }
}

/// Compiled-in plug-in modules implement this and are handed to
/// [`CommandRegistry::build`]. The registration counterpart of the manifest
/// scan: both produce the same [`ModuleDescriptor`] shape.
pub trait Plugin: Send + Sync {
    /// Path-safe module name; mounted at `/api/modules/<name>`.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    fn commands(&self) -> Vec<CommandDescriptor>;
}

/// Result of a route lookup.
pub enum Resolution {
    Command(Arc<CommandDescriptor>),
    MethodNotAllowed,
    NotFound,
}

/// The registry: modules in mount order plus a path/method lookup table.
pub struct CommandRegistry {
    modules: Vec<ModuleDescriptor>,
    routes: HashMap<String, HashMap<Method, Arc<CommandDescriptor>>>,
}

impl CommandRegistry {
    /// Build the registry: built-in tables, registered plug-ins, then the
    /// manifest scan. A malformed drop-in module is logged and skipped; it
    /// never aborts startup or affects other modules.
    pub fn build(config: &Config, plugins: &[Box<dyn Plugin>], audit: &AuditLog) -> Self {
        let mut modules = vec![builtin::termux_module(), builtin::root_module()];
        let mut taken: Vec<String> = modules.iter().map(|m| m.name.clone()).collect();

        for plugin in plugins {
            let name = plugin.name().to_string();
            if !crate::exec::sanitize::is_path_safe(&name) || taken.contains(&name) {
                // A compiled-in plug-in with a bad or duplicate name is a
                // programming error; skip it like any other bad module.
                audit.warn(&format!(
                    "Skipping invalid built-in module '{name}' (bad or duplicate name)"
                ));
                continue;
            }
            modules.push(ModuleDescriptor {
                base_path: format!("{MODULES_BASE}/{name}"),
                name: name.clone(),
                display_name: plugin.display_name().to_string(),
                description: plugin.description().to_string(),
                commands: plugin.commands().into_iter().map(Arc::new).collect(),
            });
            audit.info(&format!(
                "Loaded module '{}' at {MODULES_BASE}/{name}",
                plugin.display_name()
            ));
            taken.push(name);
        }

        modules.extend(manifest::scan_dir(&config.tux_dir, &taken, audit));

        let mut routes: HashMap<String, HashMap<Method, Arc<CommandDescriptor>>> = HashMap::new();
        for module in &modules {
            for command in &module.commands {
                let path = module.route_path(command);
                let by_method = routes.entry(path.clone()).or_default();
                if by_method
                    .insert(command.method.clone(), command.clone())
                    .is_some()
                {
                    audit.warn(&format!(
                        "Duplicate route {} {} in module '{}', later definition wins",
                        command.method, path, module.name
                    ));
                }
            }
        }

        Self { modules, routes }
    }

    /// Look up the command bound to `path` + `method`.
    pub fn resolve(&self, path: &str, method: &Method) -> Resolution {
        match self.routes.get(path) {
            Some(by_method) => match by_method.get(method) {
                Some(command) => Resolution::Command(command.clone()),
                None => Resolution::MethodNotAllowed,
            },
            None => Resolution::NotFound,
        }
    }

    /// The mounted modules, in mount order. Feeds the introspection
    /// endpoint; the same descriptors back [`Self::resolve`], so the
    /// advertised and callable route sets cannot drift apart.
    pub fn describe(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Total number of routable commands.
    pub fn len(&self) -> usize {
        self.routes.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
