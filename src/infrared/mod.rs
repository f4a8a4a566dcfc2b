//! Infrared remote module.
//!
//! A compiled-in plug-in mounted at `/api/modules/infrared`: clone, save,
//! and transmit raw IR codes using a rooted device's IR hardware. Captured
//! codes are persisted in the signal-code store.
//!
//! The hardware paths (`/dev/lirc0`, `/sys/class/remote/transmit`) are
//! device-dependent and may need adjusting for other phones.
//!
//! Saved names and codes pass the allow-list filters before they are
//! stored, and transmission feeds the stored payload to the transmit
//! command over stdin, so no stored value is ever spliced into a shell
//! template.

mod store;

pub use store::{SignalStore, StoreError};

use crate::error::GatewayError;
use crate::exec::{sanitize, RunOptions};
use crate::registry::{
    CommandCallback, CommandContext, CommandDescriptor, CommandReply, Plugin,
};
use async_trait::async_trait;
use axum::http::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Capture pipeline: wait up to 10 seconds for a signal on the IR receiver
/// and print the first raw code seen.
const SCAN_TEMPLATE: &str = r#"echo "Scanning: point the remote at the IR port and press a button.";
RAW_CODE=$(su -c 'timeout 10 cat /dev/lirc0 | od -An -t u4 | head -n 1');
if [ -z "$RAW_CODE" ]; then
    echo "No signal detected within 10 seconds.";
else
    echo "Signal captured. Raw code (use this with the 'save' command):";
    echo "$RAW_CODE";
fi"#;

/// Transmit command; the raw code arrives on stdin.
const SEND_TEMPLATE: &str = "su -c 'cat > /sys/class/remote/transmit'";

/// The infrared plug-in. Holds the store shared by its command callbacks.
pub struct InfraredPlugin {
    store: Arc<SignalStore>,
}

impl InfraredPlugin {
    pub fn new(store: Arc<SignalStore>) -> Self {
        Self { store }
    }
}

impl Plugin for InfraredPlugin {
    fn name(&self) -> &str {
        "infrared"
    }

    fn display_name(&self) -> &str {
        "Infrared Remote"
    }

    fn description(&self) -> &str {
        "A universal IR remote. Clone, save, and send signals."
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::callback(
                "list",
                Method::GET,
                Arc::new(ListSignals {
                    store: self.store.clone(),
                }),
                "List all saved remote buttons.",
            ),
            CommandDescriptor::shell(
                "scan",
                Method::GET,
                SCAN_TEMPLATE,
                "Capture a raw IR code from a remote (10 second window).",
            )
            .privileged()
            .with_timeout(Duration::from_secs(12)),
            CommandDescriptor::callback(
                "save",
                Method::POST,
                Arc::new(SaveSignal {
                    store: self.store.clone(),
                }),
                "Save a captured code. Params: ?name=my_button&code=RAW_CODE",
            ),
            CommandDescriptor::callback(
                "send",
                Method::POST,
                Arc::new(SendSignal {
                    store: self.store.clone(),
                }),
                "Transmit a saved code. Param: ?name=my_button",
            )
            .privileged(),
            CommandDescriptor::callback(
                "delete",
                Method::POST,
                Arc::new(DeleteSignal {
                    store: self.store.clone(),
                }),
                "Delete a saved code. Param: ?name=my_button",
            ),
            CommandDescriptor::callback(
                "rename",
                Method::POST,
                Arc::new(RenameSignal {
                    store: self.store.clone(),
                }),
                "Rename a saved code. Params: ?old_name=a&new_name=b",
            ),
        ]
    }
}

/// Fetch a required, non-empty query parameter.
fn require<'a>(
    params: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, GatewayError> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Validation(format!("Missing '{key}' query parameter.")))
}

struct ListSignals {
    store: Arc<SignalStore>,
}

#[async_trait]
impl CommandCallback for ListSignals {
    async fn invoke(
        &self,
        _ctx: &CommandContext,
        _params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let names = self.store.names()?;
        Ok(CommandReply::json(json!({ "buttons": names })))
    }
}

struct SaveSignal {
    store: Arc<SignalStore>,
}

#[async_trait]
impl CommandCallback for SaveSignal {
    async fn invoke(
        &self,
        _ctx: &CommandContext,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let name = sanitize::signal_name(require(params, "name")?);
        let code = sanitize::signal_code(require(params, "code")?);
        if name.is_empty() || code.is_empty() {
            return Err(GatewayError::Validation(
                "Invalid 'name' or 'code'.".to_string(),
            ));
        }
        self.store.insert(&name, &code)?;
        Ok(CommandReply::text(format!("Saved button '{name}'.")))
    }
}

struct SendSignal {
    store: Arc<SignalStore>,
}

#[async_trait]
impl CommandCallback for SendSignal {
    async fn invoke(
        &self,
        ctx: &CommandContext,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let name = require(params, "name")?;
        let code = self
            .store
            .get(name)?
            .ok_or_else(|| GatewayError::NotFound(format!("Button '{name}' not found.")))?;

        let outcome = ctx
            .runner
            .run(
                SEND_TEMPLATE,
                RunOptions {
                    timeout: None,
                    stdin: Some(code),
                },
            )
            .await?;
        CommandReply::from_outcome(outcome, crate::exec::DEFAULT_TIMEOUT)
            .map(|mut reply| {
                reply.output = json!(format!("Transmitted '{name}'."));
                reply
            })
    }
}

struct DeleteSignal {
    store: Arc<SignalStore>,
}

#[async_trait]
impl CommandCallback for DeleteSignal {
    async fn invoke(
        &self,
        _ctx: &CommandContext,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let name = require(params, "name")?;
        if !self.store.remove(name)? {
            return Err(GatewayError::NotFound(format!("Button '{name}' not found.")));
        }
        Ok(CommandReply::text(format!("Deleted button '{name}'.")))
    }
}

struct RenameSignal {
    store: Arc<SignalStore>,
}

#[async_trait]
impl CommandCallback for RenameSignal {
    async fn invoke(
        &self,
        _ctx: &CommandContext,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let old_name = require(params, "old_name")?;
        let new_name = sanitize::signal_name(require(params, "new_name")?);
        if new_name.is_empty() {
            return Err(GatewayError::Validation("Invalid 'new_name'.".to_string()));
        }
        if !self.store.rename(old_name, &new_name)? {
            return Err(GatewayError::NotFound(format!(
                "Button '{old_name}' not found."
            )));
        }
        Ok(CommandReply::text(format!(
            "Renamed '{old_name}' to '{new_name}'."
        )))
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandRunner;

    fn test_ctx() -> CommandContext {
        CommandContext {
            runner: Arc::new(CommandRunner::new(0)),
        }
    }

    fn test_plugin(dir: &std::path::Path) -> (InfraredPlugin, Arc<SignalStore>) {
        let store = Arc::new(SignalStore::new(dir));
        (InfraredPlugin::new(store.clone()), store)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn invoke(
        plugin: &InfraredPlugin,
        key: &str,
        params: &HashMap<String, String>,
    ) -> Result<CommandReply, GatewayError> {
        let commands = plugin.commands();
        let command = commands.iter().find(|c| c.key == key).unwrap();
        match &command.handler {
            crate::registry::CommandHandler::Callback(cb) => {
                cb.invoke(&test_ctx(), params).await
            }
            crate::registry::CommandHandler::Shell { .. } => panic!("expected callback"),
        }
    }

    #[tokio::test]
    async fn test_save_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());

        invoke(
            &plugin,
            "save",
            &params(&[("name", "tv_power"), ("code", "9000 4500 560")]),
        )
        .await
        .unwrap();

        let reply = invoke(&plugin, "list", &params(&[])).await.unwrap();
        assert_eq!(reply.output, json!({ "buttons": ["tv_power"] }));
    }

    #[tokio::test]
    async fn test_save_sanitizes_hostile_input() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, store) = test_plugin(dir.path());

        invoke(
            &plugin,
            "save",
            &params(&[("name", "tv; reboot"), ("code", "123 $(evil) 456")]),
        )
        .await
        .unwrap();

        let codes = store.load().unwrap();
        assert_eq!(codes.get("tvreboot").map(String::as_str), Some("123  456"));
    }

    #[tokio::test]
    async fn test_save_missing_params_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());

        let err = invoke(&plugin, "save", &params(&[("name", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        // Nothing but metacharacters collapses to empty after filtering.
        let err = invoke(
            &plugin,
            "save",
            &params(&[("name", ";;;"), ("code", "123")]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());

        let err = invoke(&plugin, "delete", &params(&[("name", "ghost")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, store) = test_plugin(dir.path());

        invoke(
            &plugin,
            "save",
            &params(&[("name", "power"), ("code", "1 2 3")]),
        )
        .await
        .unwrap();
        invoke(
            &plugin,
            "rename",
            &params(&[("old_name", "power"), ("new_name", "tv_power")]),
        )
        .await
        .unwrap();

        let codes = store.load().unwrap();
        assert_eq!(codes.get("tv_power").map(String::as_str), Some("1 2 3"));
        assert!(!codes.contains_key("power"));
    }

    #[tokio::test]
    async fn test_send_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());

        let err = invoke(&plugin, "send", &params(&[("name", "ghost")]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_side_effecting_commands_use_post() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());
        for command in plugin.commands() {
            let expected = match command.key.as_str() {
                "list" | "scan" => Method::GET,
                _ => Method::POST,
            };
            assert_eq!(command.method, expected, "{}", command.key);
        }
    }

    #[test]
    fn test_only_hardware_commands_are_privileged() {
        let dir = tempfile::tempdir().unwrap();
        let (plugin, _store) = test_plugin(dir.path());
        for command in plugin.commands() {
            let expected = matches!(command.key.as_str(), "scan" | "send");
            assert_eq!(command.privileged, expected, "{}", command.key);
        }
    }
}
