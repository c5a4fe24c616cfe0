//! Per-app facade handed to registration hooks.
//!
//! # Responsibility
//! - Give a running hook a place to mount routers under its own name.
//! - Hand the collected mounts back to the composer once the hook returns.
//!
//! # Invariants
//! - Every mount is attributed to the app the handle was issued for.
//! - Mount order is the order of `include_router` calls.

use log::debug;

use crate::router::{Mount, Router};

/// Mutable surface a registration hook sees while it runs.
pub struct AppHandle {
    app: String,
    mounts: Vec<Mount>,
}

impl AppHandle {
    pub(crate) fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            mounts: Vec::new(),
        }
    }

    /// Name of the app this handle was issued to.
    pub fn app_name(&self) -> &str {
        &self.app
    }

    /// Mounts `router` under `prefix` on behalf of the current app.
    ///
    /// The prefix is normalized like a manifest `route_prefix`: a leading
    /// `/` is ensured and trailing `/` are dropped, so `""` and `"/"` both
    /// mount at the root.
    pub fn include_router(&mut self, prefix: &str, router: Router) {
        let prefix = normalize_mount_prefix(prefix);
        debug!(
            "event=router_mount module=compose app={} prefix={} routes={}",
            self.app,
            if prefix.is_empty() { "/" } else { &prefix },
            router.routes().len()
        );
        self.mounts.push(Mount {
            app: self.app.clone(),
            prefix,
            router,
        });
    }

    pub(crate) fn take_mounts(&mut self) -> Vec<Mount> {
        std::mem::take(&mut self.mounts)
    }
}

fn normalize_mount_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_mount_prefix, AppHandle};
    use crate::router::Router;

    #[test]
    fn mounts_are_attributed_and_kept_in_call_order() {
        let mut handle = AppHandle::new("auth");
        let mut first = Router::new();
        first.get("/login");
        let mut second = Router::new();
        second.post("/logout");

        handle.include_router("/session", first);
        handle.include_router("admin/", second);

        let mounts = handle.take_mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].app, "auth");
        assert_eq!(mounts[0].prefix, "/session");
        assert_eq!(mounts[1].prefix, "/admin");
        assert!(handle.take_mounts().is_empty());
    }

    #[test]
    fn prefix_normalization_treats_empty_and_slash_as_root() {
        assert_eq!(normalize_mount_prefix(""), "");
        assert_eq!(normalize_mount_prefix("/"), "");
        assert_eq!(normalize_mount_prefix("/api/"), "/api");
        assert_eq!(normalize_mount_prefix("api"), "/api");
    }
}
