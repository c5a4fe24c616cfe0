//! Core composition and migration engine for appweave.
//! This crate is the single source of truth for app assembly invariants.

pub mod compose;
pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod router;

pub use compose::{
    AppHandle, AppRegistry, ComposeError, ComposeResult, Composer, Composition,
    EntrypointFailure, PackageIndex, RegisterFn, RegisterResult, Registrar, Warning,
};
pub use config::{ProjectConfig, CONFIG_FILE};
pub use logging::{default_log_level, init_logging, logging_status};
pub use migrate::{
    DomainOutcome, MigrateError, MigrateResult, MigrationRunner, PendingPlan, UpgradeTarget,
};
pub use router::{RouteTable, Router};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
