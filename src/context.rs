// Process-wide application context.
//
// Constructed once at startup, before the listener accepts connections, and
// shared by handle with every component that needs it. There is no other
// global state.

use crate::audit::AuditLog;
use crate::config::Config;
use crate::exec::CommandRunner;
use crate::infrared::{InfraredPlugin, SignalStore};
use crate::registry::{CommandContext, CommandRegistry, Plugin};
use anyhow::Result;
use std::sync::Arc;

/// Everything a request handler needs: configuration, the audit trail, the
/// command registry, and the process runner.
pub struct AppContext {
    pub config: Config,
    pub audit: AuditLog,
    pub registry: CommandRegistry,
    pub runner: Arc<CommandRunner>,
    pub signals: Arc<SignalStore>,
}

impl AppContext {
    /// Open the audit trail, mount built-in and discovered modules, and
    /// assemble the shared context. Module discovery happens here,
    /// synchronously, so the registry is complete before the HTTP listener
    /// starts.
    pub fn bootstrap(config: Config) -> Result<Arc<Self>> {
        let audit = AuditLog::open(&config.audit_log)?;
        audit.info(&format!(
            "Server starting for device '{}' on port {}...",
            config.device_name, config.port
        ));

        if config.pin.is_none() {
            audit.warn(
                "--- SECURITY WARNING --- No DEVICE_PIN configured. The API is UNPROTECTED. \
                 Run the installation script to set a PIN.",
            );
        }
        if config.readonly {
            audit.info("Read-only mode active: state-changing and privileged routes are disabled.");
        }

        let runner = Arc::new(CommandRunner::new(config.max_concurrent_commands));
        let signals = Arc::new(SignalStore::new(&config.database_dir));
        let plugins: Vec<Box<dyn Plugin>> =
            vec![Box::new(InfraredPlugin::new(signals.clone()))];
        let registry = CommandRegistry::build(&config, &plugins, &audit);
        audit.info(&format!(
            "API routes mounted with authentication and logging ({} commands).",
            registry.len()
        ));

        Ok(Arc::new(Self {
            config,
            audit,
            registry,
            runner,
            signals,
        }))
    }

    /// The narrow view handed to callback command handlers.
    pub fn command_context(&self) -> CommandContext {
        CommandContext {
            runner: self.runner.clone(),
        }
    }
}
