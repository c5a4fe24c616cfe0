//! Route declarations exchanged between apps and the assembler.
//!
//! # Responsibility
//! - Represent the routes an app wants served, independent of any HTTP
//!   dispatch machinery.
//!
//! # Invariants
//! - Route order inside a `Router` is the order `route()` was called.
//! - Paths always carry a leading `/`.

mod assembler;

pub use assembler::{Mount, MountedRoute, RouteCollision, RouteTable};

/// HTTP method of one declared route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    /// Stable uppercase name used in logs and collision reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

/// One declared route, relative to its router's mount prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
}

/// Ordered collection of routes one app exposes.
///
/// Apps either return a `Router` from their entrypoint (the assembler mounts
/// it at the resolved prefix) or mount one themselves through the app handle.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares one route. Paths without a leading `/` get one.
    pub fn route(&mut self, method: Method, path: &str) -> &mut Self {
        self.routes.push(Route {
            method,
            path: normalize_path(path),
        });
        self
    }

    pub fn get(&mut self, path: &str) -> &mut Self {
        self.route(Method::Get, path)
    }

    pub fn post(&mut self, path: &str) -> &mut Self {
        self.route(Method::Post, path)
    }

    pub fn put(&mut self, path: &str) -> &mut Self {
        self.route(Method::Put, path)
    }

    pub fn delete(&mut self, path: &str) -> &mut Self {
        self.route(Method::Delete, path)
    }

    pub fn patch(&mut self, path: &str) -> &mut Self {
        self.route(Method::Patch, path)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
