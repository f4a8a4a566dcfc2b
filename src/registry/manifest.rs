//! Drop-in module manifests.
//!
//! A drop-in module is a TOML file in the configured `tux` directory. The
//! file stem becomes the module name and URL segment; the manifest declares
//! a display name and a list of shell-template commands:
//!
//! ```toml
//! display_name = "Example Module"
//! description = "What this module adds."
//!
//! [[commands]]
//! key = "echo"
//! shell = 'echo "Hello!"'
//! method = "GET"        # optional, default GET
//! privileged = false    # optional
//! timeout_ms = 10000    # optional, clamped to 20000
//! ```
//!
//! Manifests are validated against this schema and rejected on any
//! mismatch; a rejected file is skipped with a warning and never affects
//! other modules or startup.

use super::{CommandDescriptor, ModuleDescriptor, MODULES_BASE};
use crate::audit::AuditLog;
use crate::exec::sanitize;
use axum::http::Method;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-command timeout ceiling for drop-in modules, in milliseconds.
const MAX_TIMEOUT_MS: u64 = 20_000;

/// Why a drop-in module failed to load.
#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    #[error("unreadable manifest {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("module name {0:?} is not path-safe (lowercase alphanumerics, '_', '-')")]
    InvalidModuleName(String),

    #[error("module name {0:?} is already taken")]
    DuplicateModuleName(String),

    #[error("module {module:?} declares no commands")]
    NoCommands { module: String },

    #[error("module {module:?} command key {key:?} is not path-safe")]
    InvalidCommandKey { module: String, key: String },

    #[error("module {module:?} command {key:?} has unsupported method {method:?}")]
    InvalidMethod {
        module: String,
        key: String,
        method: String,
    },
}

/// On-disk manifest schema. Unknown fields are rejected rather than
/// silently ignored.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub commands: Vec<ManifestCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestCommand {
    pub key: String,

    #[serde(default)]
    pub description: String,

    pub shell: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub privileged: bool,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Scan `dir` for `*.toml` manifests, lexically ordered, and return the
/// modules that loaded cleanly. `taken` holds module names that are
/// already mounted; colliding manifests are rejected, not overwritten.
pub fn scan_dir(dir: &Path, taken: &[String], audit: &AuditLog) -> Vec<ModuleDescriptor> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            audit.info(&format!(
                "No module directory at {dir:?}, skipping drop-in module loading"
            ));
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
        .collect();
    paths.sort();

    audit.info(&format!(
        "Found {} drop-in module manifest(s) in {dir:?}",
        paths.len()
    ));

    let mut loaded: Vec<ModuleDescriptor> = Vec::new();
    for path in paths {
        let result = {
            let mut seen: Vec<&str> = taken.iter().map(|s| s.as_str()).collect();
            seen.extend(loaded.iter().map(|m| m.name.as_str()));
            load_module(&path, &seen)
        };

        match result {
            Ok(module) => {
                audit.info(&format!(
                    "Loaded module '{}' at {}",
                    module.display_name, module.base_path
                ));
                loaded.push(module);
            }
            Err(e) => {
                audit.warn(&format!("Skipping invalid module file {path:?}: {e}"));
            }
        }
    }
    loaded
}

/// Load and validate one manifest file.
pub fn load_module(path: &Path, taken: &[&str]) -> Result<ModuleDescriptor, PluginLoadError> {
    let name = module_name(path)?;
    if taken.contains(&name.as_str()) {
        return Err(PluginLoadError::DuplicateModuleName(name));
    }

    let raw = std::fs::read_to_string(path).map_err(|source| PluginLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: PluginManifest =
        toml::from_str(&raw).map_err(|source| PluginLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if manifest.commands.is_empty() {
        return Err(PluginLoadError::NoCommands { module: name });
    }

    let mut commands = Vec::with_capacity(manifest.commands.len());
    for command in &manifest.commands {
        commands.push(Arc::new(descriptor_from(&name, command)?));
    }

    Ok(ModuleDescriptor {
        base_path: format!("{MODULES_BASE}/{name}"),
        name,
        display_name: manifest.display_name,
        description: manifest.description,
        commands,
    })
}

/// Derive the module name from the manifest file stem and check it is
/// usable as a URL segment.
fn module_name(path: &Path) -> Result<String, PluginLoadError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if !sanitize::is_path_safe(&stem) {
        return Err(PluginLoadError::InvalidModuleName(stem));
    }
    Ok(stem)
}

fn descriptor_from(
    module: &str,
    command: &ManifestCommand,
) -> Result<CommandDescriptor, PluginLoadError> {
    let valid_key = !command.key.is_empty()
        && command.key.split('/').all(sanitize::is_path_safe);
    if !valid_key {
        return Err(PluginLoadError::InvalidCommandKey {
            module: module.to_string(),
            key: command.key.clone(),
        });
    }

    let method = match command.method.to_ascii_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => {
            return Err(PluginLoadError::InvalidMethod {
                module: module.to_string(),
                key: command.key.clone(),
                method: other.to_string(),
            })
        }
    };

    let mut descriptor = CommandDescriptor::shell(
        command.key.clone(),
        method,
        command.shell.clone(),
        if command.description.is_empty() {
            format!("Executes the '{}' command.", command.key)
        } else {
            command.description.clone()
        },
    );
    if command.privileged {
        descriptor = descriptor.privileged();
    }
    if let Some(ms) = command.timeout_ms {
        descriptor = descriptor.with_timeout(Duration::from_millis(ms.min(MAX_TIMEOUT_MS)));
    }
    Ok(descriptor)
}
