//! Full composition pipeline over one project.
//!
//! # Responsibility
//! - Run the sweeps in order: resolve, manifests, isolation, entrypoints,
//!   registry build, registration, route assembly.
//! - Stop at the first fatal error; carry warnings from every sweep into
//!   the final [`Composition`].
//!
//! # Invariants
//! - Each sweep finishes for all apps before the next one starts, so a
//!   broken manifest surfaces before any registration hook runs.
//! - Registration hooks execute in registry order, one at a time.

use std::collections::BTreeSet;

use log::{error, info};

use super::entrypoint::{EntrypointLoader, PackageIndex};
use super::isolation::IsolationValidator;
use super::manifest::load_manifest;
use super::registry::AppRegistry;
use super::resolver::{Resolver, Stage};
use super::{AppHandle, ComposeError, ComposeResult, Warning};
use crate::config::ProjectConfig;
use crate::router::{Mount, RouteTable};

/// Outcome of a successful composition pass.
#[derive(Debug)]
pub struct Composition {
    pub registry: AppRegistry,
    pub routes: RouteTable,
    pub warnings: Vec<Warning>,
}

/// Drives composition for one project against one package index.
pub struct Composer<'a> {
    config: &'a ProjectConfig,
    index: &'a PackageIndex,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a ProjectConfig, index: &'a PackageIndex) -> Self {
        Self { config, index }
    }

    /// Runs every sweep to completion or returns the first fatal error.
    pub fn compose(&self) -> ComposeResult<Composition> {
        let resolver = Resolver::new(self.config, self.index);
        let (mut descriptors, mut warnings) = resolver.resolve_all()?;
        info!(
            "event=compose_sweep module=compose status=ok sweep=resolve apps={}",
            descriptors.len()
        );

        for descriptor in descriptors.iter_mut() {
            warnings.extend(load_manifest(descriptor)?);
        }

        let externals: BTreeSet<String> = descriptors
            .iter()
            .filter(|d| d.is_external())
            .map(|d| d.name.clone())
            .collect();
        let validator = IsolationValidator::new(&externals);
        for descriptor in descriptors.iter_mut() {
            let outcome = validator.validate(descriptor);
            for message in outcome.warnings {
                warnings.push(Warning::Isolation {
                    app: descriptor.name.clone(),
                    message,
                });
            }
            if !outcome.errors.is_empty() {
                error!(
                    "event=isolation_check module=compose status=error app={} violations={}",
                    descriptor.name,
                    outcome.errors.len()
                );
                return Err(ComposeError::Isolation {
                    app: descriptor.name.clone(),
                    errors: outcome.errors,
                });
            }
            descriptor.stage = Stage::Validated;
        }

        let loader = EntrypointLoader::new(self.index);
        for descriptor in descriptors.iter_mut() {
            loader.load(descriptor)?;
        }

        let mut registry = AppRegistry::from_descriptors(descriptors);

        let mut mounts: Vec<Mount> = Vec::new();
        for descriptor in registry.iter_mut() {
            let entrypoint = match descriptor.entrypoint.clone() {
                Some(entrypoint) => entrypoint,
                None => {
                    return Err(ComposeError::Entrypoint {
                        app: descriptor.name.clone(),
                        reason: "descriptor reached registration without a resolved entrypoint"
                            .to_string(),
                    })
                }
            };
            let mut handle = AppHandle::new(descriptor.name.clone());
            match entrypoint.invoke(&mut handle) {
                Ok(router) => {
                    info!(
                        "event=app_register module=compose status=ok app={} returned_router={}",
                        descriptor.name,
                        router.is_some()
                    );
                    descriptor.router = router;
                }
                Err(failure) => {
                    error!(
                        "event=app_register module=compose status=error app={} detail={failure}",
                        descriptor.name
                    );
                    return Err(ComposeError::Registration {
                        app: descriptor.name.clone(),
                        source: failure,
                    });
                }
            }
            mounts.extend(handle.take_mounts());
            descriptor.stage = Stage::Registered;
        }

        // Self-mounts land first, then each app's returned router at its
        // route prefix, in registry order.
        for descriptor in registry.iter() {
            if let Some(router) = &descriptor.router {
                mounts.push(Mount {
                    app: descriptor.name.clone(),
                    prefix: descriptor.route_prefix.clone(),
                    router: router.clone(),
                });
            }
        }
        let (routes, collisions) = RouteTable::assemble(&mounts);
        warnings.extend(collisions.into_iter().map(Warning::RouteCollision));

        info!(
            "event=compose module=compose status=ok apps={} routes={} warnings={}",
            registry.len(),
            routes.len(),
            warnings.len()
        );
        Ok(Composition {
            registry,
            routes,
            warnings,
        })
    }
}
