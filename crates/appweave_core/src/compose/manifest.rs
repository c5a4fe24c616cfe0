//! External app manifest loading and validation.
//!
//! # Responsibility
//! - Parse `appweave.toml` at an external package root into a [`Manifest`].
//! - Report every missing or malformed field in one pass, not just the first.
//!
//! # Invariants
//! - Internal descriptors never gain a manifest.
//! - `route_prefix` is stored normalized: empty string means root mount, any
//!   other value starts with `/` and has no trailing `/`.

use super::resolver::AppDescriptor;
use super::{ComposeError, ComposeResult, Stage, ValidationResult, Warning};
use log::{info, warn};

/// Manifest file expected beside an external package root.
pub const MANIFEST_FILE: &str = "appweave.toml";

const REQUIRED_KEYS: [&str; 4] = ["name", "version", "entrypoint", "migrations"];
const KNOWN_KEYS: [&str; 6] = [
    "name",
    "version",
    "entrypoint",
    "migrations",
    "models_module",
    "route_prefix",
];

/// Declared metadata of one external app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    /// `module:symbol` registration reference.
    pub entrypoint: String,
    /// Migration script directory, relative to the package root.
    pub migrations: String,
    pub models_module: Option<String>,
    /// Normalized mount prefix override; `None` means `/<app name>`.
    pub route_prefix: Option<String>,
}

/// Loads and validates the manifest of an external descriptor, filling in
/// its manifest, migrations path, route prefix, and entrypoint reference.
///
/// Returns the non-blocking findings. Internal descriptors pass through
/// untouched.
pub fn load_manifest(descriptor: &mut AppDescriptor) -> ComposeResult<Vec<Warning>> {
    if descriptor.is_internal() {
        return Ok(Vec::new());
    }

    let path = descriptor.location.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&path).map_err(|err| ComposeError::Manifest {
        app: descriptor.name.clone(),
        problems: vec![format!("failed to read {}: {err}", path.display())],
    })?;
    let table: toml::Table = toml::from_str(&text).map_err(|err| ComposeError::Manifest {
        app: descriptor.name.clone(),
        problems: vec![format!("not valid TOML: {err}")],
    })?;

    let (manifest, findings) = manifest_from_table(&table);
    let manifest = match manifest {
        Some(manifest) => manifest,
        None => {
            return Err(ComposeError::Manifest {
                app: descriptor.name.clone(),
                problems: findings.errors,
            })
        }
    };

    let warnings = findings
        .warnings
        .into_iter()
        .map(|message| {
            warn!(
                "event=manifest_warning module=compose status=warn app={} detail={message}",
                descriptor.name
            );
            Warning::Manifest {
                app: descriptor.name.clone(),
                message,
            }
        })
        .collect();

    descriptor.migrations_path = Some(descriptor.location.join(&manifest.migrations));
    descriptor.route_prefix = manifest
        .route_prefix
        .clone()
        .unwrap_or_else(|| format!("/{}", descriptor.name));
    descriptor.entrypoint_ref = manifest.entrypoint.clone();
    info!(
        "event=manifest_load module=compose status=ok app={} version={} prefix={}",
        descriptor.name, manifest.version, descriptor.route_prefix
    );
    descriptor.manifest = Some(manifest);
    descriptor.stage = Stage::ManifestLoaded;

    Ok(warnings)
}

/// Validates a parsed manifest table, collecting every problem.
fn manifest_from_table(table: &toml::Table) -> (Option<Manifest>, ValidationResult) {
    let mut result = ValidationResult::new();

    // Walks REQUIRED_KEYS in order, so error order is stable.
    let name = required_string(table, REQUIRED_KEYS[0], &mut result);
    let version = required_string(table, REQUIRED_KEYS[1], &mut result);
    let entrypoint = required_string(table, REQUIRED_KEYS[2], &mut result);
    let migrations = required_string(table, REQUIRED_KEYS[3], &mut result);

    let models_module = match table.get("models_module") {
        Some(toml::Value::String(value)) => Some(value.clone()),
        Some(other) => {
            result.add_error(format!(
                "field `models_module` must be a string, got {}",
                other.type_str()
            ));
            None
        }
        None => {
            result.add_warning(
                "no models_module declared; this app's models cannot be discovered".to_string(),
            );
            None
        }
    };

    let route_prefix = match table.get("route_prefix") {
        Some(toml::Value::String(value)) => match normalize_prefix(value) {
            Ok(prefix) => Some(prefix),
            Err(reason) => {
                result.add_error(reason);
                None
            }
        },
        Some(other) => {
            result.add_error(format!(
                "field `route_prefix` must be a string, got {}",
                other.type_str()
            ));
            None
        }
        None => None,
    };

    for key in table.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            result.add_warning(format!("unknown manifest key `{key}`"));
        }
    }

    if !result.is_valid() {
        return (None, result);
    }

    let manifest = match (name, version, entrypoint, migrations) {
        (Some(name), Some(version), Some(entrypoint), Some(migrations)) => Manifest {
            name,
            version,
            entrypoint,
            migrations,
            models_module,
            route_prefix,
        },
        _ => return (None, result),
    };

    (Some(manifest), result)
}

fn required_string(
    table: &toml::Table,
    key: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    match table.get(key) {
        Some(toml::Value::String(value)) => Some(value.clone()),
        Some(other) => {
            result.add_error(format!(
                "field `{key}` must be a string, got {}",
                other.type_str()
            ));
            None
        }
        None => {
            result.add_error(format!("missing required field `{key}`"));
            None
        }
    }
}

/// An explicit empty string mounts at root; anything else must start with
/// `/`. Trailing slashes are dropped, so `"/"` also means root.
fn normalize_prefix(value: &str) -> Result<String, String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    if !value.starts_with('/') {
        return Err(format!(
            "route_prefix must be empty or begin with `/`, got `{value}`"
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
