//! Migration domain discovery and ordering.
//!
//! # Responsibility
//! - Gather the shared domain (core schema plus every internal app) and one
//!   domain per external app, in the order they must migrate.
//!
//! # Invariants
//! - The shared domain always comes first; external domains follow in
//!   registration order.
//! - The `core` contribution leads the shared domain even when a
//!   `migration_order` override lists it elsewhere.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use log::debug;

use super::version::marker_table;
use super::{MigrateError, MigrateResult};
use crate::compose::{AppDescriptor, AppRegistry};
use crate::config::ProjectConfig;

pub const SHARED_DOMAIN: &str = "shared";
const CORE_SENTINEL: &str = "core";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Shared,
    External,
}

/// One migration stream: where its scripts come from and which marker table
/// records its head.
#[derive(Debug, Clone)]
pub struct MigrationDomain {
    pub name: String,
    pub kind: DomainKind,
    /// Script directories in contribution order.
    pub sources: Vec<PathBuf>,
    pub marker_table: String,
}

impl MigrationDomain {
    pub fn is_shared(&self) -> bool {
        self.kind == DomainKind::Shared
    }
}

/// Builds the migration domains for a composed project.
///
/// Internal apps without a migrations directory simply contribute nothing;
/// an external app without one is an error, its manifest promised it.
pub fn domains(
    config: &ProjectConfig,
    registry: &AppRegistry,
) -> MigrateResult<Vec<MigrationDomain>> {
    let mut result = Vec::new();

    let mut shared_sources = Vec::new();
    let core_dir = config.core_migrations_dir();
    if core_dir.is_dir() {
        shared_sources.push(core_dir);
    } else {
        debug!(
            "event=domain_discover module=migrate status=skip domain={SHARED_DOMAIN} missing={}",
            core_dir.display()
        );
    }
    shared_sources.extend(ordered_internal_dirs(config, registry)?);
    result.push(MigrationDomain {
        name: SHARED_DOMAIN.to_string(),
        kind: DomainKind::Shared,
        sources: shared_sources,
        marker_table: marker_table(None),
    });

    for descriptor in registry.iter().filter(|d| d.is_external()) {
        let dir = match &descriptor.migrations_path {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(dir) => {
                return Err(MigrateError::ScriptDirMissing {
                    domain: descriptor.name.clone(),
                    path: dir.clone(),
                })
            }
            None => {
                return Err(MigrateError::ScriptDirMissing {
                    domain: descriptor.name.clone(),
                    path: descriptor.location.join("migrations"),
                })
            }
        };
        result.push(MigrationDomain {
            name: descriptor.name.clone(),
            kind: DomainKind::External,
            sources: vec![dir],
            marker_table: marker_table(Some(&descriptor.name)),
        });
    }

    Ok(result)
}

/// Internal contribution order for the shared domain: apps listed in
/// `migration_order` first, in that order, then the rest in registration
/// order. The `core` sentinel is accepted anywhere but never moves.
fn ordered_internal_dirs(
    config: &ProjectConfig,
    registry: &AppRegistry,
) -> MigrateResult<Vec<PathBuf>> {
    let internals: Vec<&AppDescriptor> = registry.iter().filter(|d| d.is_internal()).collect();

    let order = match &config.migration_order {
        Some(order) => order,
        None => {
            return Ok(internals
                .iter()
                .filter_map(|d| existing_migrations(d))
                .collect())
        }
    };

    let by_name: BTreeMap<&str, &AppDescriptor> =
        internals.iter().map(|d| (d.name.as_str(), *d)).collect();
    let mut ordered: Vec<&AppDescriptor> = Vec::new();
    let mut listed: BTreeSet<&str> = BTreeSet::new();
    for entry in order {
        if entry == CORE_SENTINEL {
            continue;
        }
        match by_name.get(entry.as_str()) {
            Some(descriptor) => {
                if listed.insert(entry.as_str()) {
                    ordered.push(descriptor);
                }
            }
            None => {
                return Err(MigrateError::OrderOverride {
                    name: entry.clone(),
                })
            }
        }
    }
    for descriptor in internals {
        if !listed.contains(descriptor.name.as_str()) {
            ordered.push(descriptor);
        }
    }

    Ok(ordered
        .iter()
        .filter_map(|d| existing_migrations(d))
        .collect())
}

fn existing_migrations(descriptor: &AppDescriptor) -> Option<PathBuf> {
    match &descriptor.migrations_path {
        Some(dir) if dir.is_dir() => Some(dir.clone()),
        _ => {
            debug!(
                "event=domain_discover module=migrate status=skip app={} detail=no_migrations",
                descriptor.name
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{domains, DomainKind, SHARED_DOMAIN};
    use crate::compose::{AppDescriptor, AppKind, AppRegistry, Stage};
    use crate::config::ProjectConfig;
    use crate::migrate::MigrateError;

    #[test]
    fn shared_domain_leads_and_externals_follow_registration_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let core = migrations_dir(dir.path(), "app_core/db/migrations");
        let auth = migrations_dir(dir.path(), "apps/auth/migrations");
        let payments = migrations_dir(dir.path(), "vendor/payments/migrations");

        let config = ProjectConfig::new(dir.path(), Vec::new());
        let registry = AppRegistry::from_descriptors(vec![
            internal("auth", &auth),
            external("payments", &payments),
        ]);

        let domains = domains(&config, &registry).expect("domains should build");
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].name, SHARED_DOMAIN);
        assert_eq!(domains[0].kind, DomainKind::Shared);
        assert_eq!(domains[0].sources, vec![core, auth]);
        assert_eq!(domains[0].marker_table, "appweave_version");
        assert_eq!(domains[1].name, "payments");
        assert_eq!(domains[1].marker_table, "appweave_version_payments");
    }

    #[test]
    fn internal_apps_without_scripts_contribute_nothing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let auth = migrations_dir(dir.path(), "apps/auth/migrations");
        let ghost = dir.path().join("apps/ghost/migrations");

        let config = ProjectConfig::new(dir.path(), Vec::new());
        let registry = AppRegistry::from_descriptors(vec![
            internal("ghost", &ghost),
            internal("auth", &auth),
        ]);

        let domains = domains(&config, &registry).expect("domains should build");
        assert_eq!(domains[0].sources, vec![auth]);
    }

    #[test]
    fn migration_order_reorders_internals_but_core_stays_first() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let core = migrations_dir(dir.path(), "app_core/db/migrations");
        let auth = migrations_dir(dir.path(), "apps/auth/migrations");
        let blog = migrations_dir(dir.path(), "apps/blog/migrations");
        let crm = migrations_dir(dir.path(), "apps/crm/migrations");

        let mut config = ProjectConfig::new(dir.path(), Vec::new());
        config.migration_order = Some(vec![
            "blog".to_string(),
            "core".to_string(),
            "auth".to_string(),
        ]);
        let registry = AppRegistry::from_descriptors(vec![
            internal("auth", &auth),
            internal("blog", &blog),
            internal("crm", &crm),
        ]);

        let domains = domains(&config, &registry).expect("domains should build");
        assert_eq!(domains[0].sources, vec![core, blog, auth, crm]);
    }

    #[test]
    fn unknown_names_in_migration_order_are_fatal() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let auth = migrations_dir(dir.path(), "apps/auth/migrations");

        let mut config = ProjectConfig::new(dir.path(), Vec::new());
        config.migration_order = Some(vec!["ghost".to_string()]);
        let registry = AppRegistry::from_descriptors(vec![internal("auth", &auth)]);

        let err = domains(&config, &registry).expect_err("unknown name should fail");
        assert!(matches!(err, MigrateError::OrderOverride { name } if name == "ghost"));
    }

    #[test]
    fn external_without_script_directory_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let missing = dir.path().join("vendor/payments/migrations");

        let config = ProjectConfig::new(dir.path(), Vec::new());
        let registry = AppRegistry::from_descriptors(vec![external("payments", &missing)]);

        let err = domains(&config, &registry).expect_err("missing dir should fail");
        assert!(
            matches!(err, MigrateError::ScriptDirMissing { domain, .. } if domain == "payments")
        );
    }

    fn migrations_dir(root: &Path, relative: &str) -> PathBuf {
        let dir = root.join(relative);
        std::fs::create_dir_all(&dir).expect("migrations dir should be created");
        dir
    }

    fn internal(name: &str, migrations: &Path) -> AppDescriptor {
        descriptor(name, AppKind::Internal, migrations)
    }

    fn external(name: &str, migrations: &Path) -> AppDescriptor {
        descriptor(name, AppKind::External, migrations)
    }

    fn descriptor(name: &str, kind: AppKind, migrations: &Path) -> AppDescriptor {
        let location = migrations.parent().map(PathBuf::from).unwrap_or_default();
        AppDescriptor {
            name: name.to_string(),
            kind,
            declaration: name.to_string(),
            module_path: name.to_string(),
            location,
            manifest: None,
            migrations_path: Some(PathBuf::from(migrations)),
            route_prefix: format!("/{name}"),
            entrypoint_ref: format!("{name}:register"),
            entrypoint: None,
            router: None,
            stage: Stage::Resolved,
        }
    }
}
