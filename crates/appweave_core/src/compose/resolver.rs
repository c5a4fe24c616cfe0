//! Declaration resolution.
//!
//! # Responsibility
//! - Turn ordered configuration entries into ordered `AppDescriptor`s.
//! - Distinguish internal apps (project `apps/` tree) from external packages
//!   (package index entries with a root directory).
//!
//! # Invariants
//! - Output order equals declaration order.
//! - Duplicate final names are flagged as warnings, never errors.

use super::entrypoint::PackageIndex;
use super::manifest::{Manifest, MANIFEST_FILE};
use super::{ComposeError, ComposeResult, Warning};
use crate::config::ProjectConfig;
use crate::router::Router;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Declaration prefix marking internal apps.
pub const INTERNAL_PREFIX: &str = "apps.";

/// File that marks an internal app directory as a package root.
pub const PACKAGE_MARKER: &str = "mod.rs";

/// Where a descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Internal,
    External,
}

impl AppKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

/// Last pipeline stage a descriptor has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Resolved,
    ManifestLoaded,
    Validated,
    EntrypointResolved,
    Registered,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::ManifestLoaded => "manifest_loaded",
            Self::Validated => "validated",
            Self::EntrypointResolved => "entrypoint_resolved",
            Self::Registered => "registered",
        }
    }
}

/// One resolved app, mutated in place as the pipeline advances.
///
/// Created only by the [`Resolver`]; lives for one composition pass.
#[derive(Debug)]
pub struct AppDescriptor {
    pub name: String,
    pub kind: AppKind,
    /// The configuration string this descriptor came from.
    pub declaration: String,
    /// Dotted module path identifying the app's code.
    pub module_path: String,
    /// Internal: the app directory. External: the package root.
    pub location: PathBuf,
    /// Present on external descriptors after the manifest stage, never on
    /// internal ones.
    pub manifest: Option<Manifest>,
    pub migrations_path: Option<PathBuf>,
    pub route_prefix: String,
    /// Raw `module:symbol` reference; parsed at the entrypoint stage.
    pub entrypoint_ref: String,
    pub entrypoint: Option<super::Entrypoint>,
    /// Router returned by the entrypoint, if any.
    pub router: Option<Router>,
    pub stage: Stage,
}

impl AppDescriptor {
    pub fn is_internal(&self) -> bool {
        self.kind == AppKind::Internal
    }

    pub fn is_external(&self) -> bool {
        self.kind == AppKind::External
    }
}

/// Resolves declarations against the project tree and the package index.
pub struct Resolver<'a> {
    config: &'a ProjectConfig,
    index: &'a PackageIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a ProjectConfig, index: &'a PackageIndex) -> Self {
        Self { config, index }
    }

    /// Resolves every declaration, preserving order, and flags duplicate
    /// final names.
    pub fn resolve_all(&self) -> ComposeResult<(Vec<AppDescriptor>, Vec<Warning>)> {
        let mut descriptors = Vec::with_capacity(self.config.apps.len());
        let mut warnings = Vec::new();
        let mut seen: BTreeMap<String, String> = BTreeMap::new();

        for declaration in &self.config.apps {
            let descriptor = self.resolve(declaration)?;
            match seen.get(&descriptor.name) {
                Some(first) => {
                    warn!(
                        "event=app_resolve module=compose status=warn name={} first={first} second={declaration}",
                        descriptor.name
                    );
                    warnings.push(Warning::DuplicateName {
                        name: descriptor.name.clone(),
                        first_declaration: first.clone(),
                        second_declaration: declaration.clone(),
                    });
                }
                None => {
                    seen.insert(descriptor.name.clone(), declaration.clone());
                }
            }
            descriptors.push(descriptor);
        }

        Ok((descriptors, warnings))
    }

    /// Resolves a single declaration.
    pub fn resolve(&self, declaration: &str) -> ComposeResult<AppDescriptor> {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            return Err(ComposeError::Resolution {
                app: String::new(),
                reason: "declaration is empty".to_string(),
            });
        }

        let descriptor = if let Some(name) = declaration.strip_prefix(INTERNAL_PREFIX) {
            self.resolve_internal(declaration, name)?
        } else {
            self.resolve_external(declaration)?
        };

        info!(
            "event=app_resolve module=compose status=ok app={} kind={} declaration={}",
            descriptor.name,
            descriptor.kind.as_str(),
            declaration
        );
        Ok(descriptor)
    }

    fn resolve_internal(&self, declaration: &str, name: &str) -> ComposeResult<AppDescriptor> {
        if name.is_empty() {
            return Err(ComposeError::Resolution {
                app: declaration.to_string(),
                reason: "internal declaration names no app".to_string(),
            });
        }

        let dir = self.config.apps_dir().join(name);
        if !dir.is_dir() {
            return Err(ComposeError::Resolution {
                app: declaration.to_string(),
                reason: format!("internal app directory not found: {}", dir.display()),
            });
        }
        if !dir.join(PACKAGE_MARKER).is_file() {
            return Err(ComposeError::Resolution {
                app: declaration.to_string(),
                reason: format!(
                    "directory is not a package root (missing {PACKAGE_MARKER}): {}",
                    dir.display()
                ),
            });
        }

        let migrations = dir.join("migrations");
        Ok(AppDescriptor {
            name: name.to_string(),
            kind: AppKind::Internal,
            declaration: declaration.to_string(),
            module_path: declaration.to_string(),
            location: dir,
            manifest: None,
            // Recorded even when absent so new revisions have a target.
            migrations_path: Some(migrations),
            route_prefix: format!("/{name}"),
            entrypoint_ref: format!("{declaration}:register"),
            entrypoint: None,
            router: None,
            stage: Stage::Resolved,
        })
    }

    fn resolve_external(&self, declaration: &str) -> ComposeResult<AppDescriptor> {
        if !self.index.contains_module(declaration) {
            return Err(ComposeError::Resolution {
                app: declaration.to_string(),
                reason: format!(
                    "`{declaration}` is not registered in the package index; \
                     link the package and register it at composition time"
                ),
            });
        }
        let root = self
            .index
            .package_root(declaration)
            .ok_or_else(|| ComposeError::Resolution {
                app: declaration.to_string(),
                reason: format!("`{declaration}` is registered without a package root directory"),
            })?
            .to_path_buf();

        if !root.join(MANIFEST_FILE).is_file() {
            return Err(ComposeError::Resolution {
                app: declaration.to_string(),
                reason: format!(
                    "no {MANIFEST_FILE} found beside the package root: {}",
                    root.display()
                ),
            });
        }

        let name = declaration
            .rsplit('.')
            .next()
            .unwrap_or(declaration)
            .to_string();
        Ok(AppDescriptor {
            route_prefix: format!("/{name}"),
            entrypoint_ref: format!("{declaration}:register"),
            name,
            kind: AppKind::External,
            declaration: declaration.to_string(),
            module_path: declaration.to_string(),
            location: root,
            manifest: None,
            migrations_path: None,
            entrypoint: None,
            router: None,
            stage: Stage::Resolved,
        })
    }
}
