//! Route table assembly and collision detection.
//!
//! # Responsibility
//! - Mount app routers at their resolved prefixes, preserving mount order.
//! - Report `(method, path)` pairs claimed by more than one app.
//!
//! # Invariants
//! - Mount order equals the order of the input slice; nothing is reordered.
//! - Collisions are warnings carried as data; they never abort assembly.

use super::{Method, Router};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// One router scheduled for mounting, tagged with its owning app.
#[derive(Debug, Clone)]
pub struct Mount {
    pub app: String,
    pub prefix: String,
    pub router: Router,
}

/// One fully resolved route in the assembled table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedRoute {
    pub method: Method,
    pub path: String,
    pub app: String,
}

/// A `(method, path)` pair claimed by more than one app.
///
/// Owners are listed in first-mounted order. The underlying framework will
/// serve whichever route it matched first; the report exists so the project
/// author can pick distinct prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCollision {
    pub method: Method,
    pub path: String,
    pub apps: Vec<String>,
}

impl Display for RouteCollision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "route collision on {} {} between apps: {}",
            self.method.as_str(),
            self.path,
            self.apps.join(", ")
        )
    }
}

/// The composed application's full route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<MountedRoute>,
}

impl RouteTable {
    /// Mounts every router in order and scans the result for collisions.
    pub fn assemble(mounts: &[Mount]) -> (Self, Vec<RouteCollision>) {
        let mut entries = Vec::new();
        for mount in mounts {
            for route in mount.router.routes() {
                entries.push(MountedRoute {
                    method: route.method,
                    path: join_prefix(&mount.prefix, &route.path),
                    app: mount.app.clone(),
                });
            }
        }

        let collisions = detect_collisions(&entries);
        info!(
            "event=routes_assemble module=router status=ok mounts={} routes={} collisions={}",
            mounts.len(),
            entries.len(),
            collisions.len()
        );
        for collision in &collisions {
            warn!(
                "event=route_collision module=router status=warn method={} path={} apps={}",
                collision.method.as_str(),
                collision.path,
                collision.apps.join(",")
            );
        }

        (Self { entries }, collisions)
    }

    pub fn entries(&self) -> &[MountedRoute] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Joins a mount prefix and a route path. An empty prefix mounts at root.
fn join_prefix(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}{path}")
    }
}

fn detect_collisions(entries: &[MountedRoute]) -> Vec<RouteCollision> {
    let mut owners: BTreeMap<(String, Method), Vec<String>> = BTreeMap::new();
    for entry in entries {
        let key = (entry.path.clone(), entry.method);
        let apps = owners.entry(key).or_default();
        // An app claiming the same pair twice is not a cross-app collision.
        if !apps.contains(&entry.app) {
            apps.push(entry.app.clone());
        }
    }

    owners
        .into_iter()
        .filter(|(_, apps)| apps.len() > 1)
        .map(|((path, method), apps)| RouteCollision { method, path, apps })
        .collect()
}
