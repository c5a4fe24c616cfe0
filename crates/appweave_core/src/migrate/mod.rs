//! Migration orchestration across the shared schema and external apps.
//!
//! # Responsibility
//! - Parse revision scripts, chain them into per-domain graphs, and apply
//!   or roll back revisions against the project database.
//! - Track applied state in one version marker table per domain.
//!
//! # Invariants
//! - Each revision runs inside its own transaction together with the marker
//!   update; a failed script leaves earlier revisions committed.
//! - Domains migrate strictly in order: the shared domain first, then each
//!   external app in registration order.

mod domain;
mod graph;
mod runner;
mod script;
mod version;

pub use domain::{domains, DomainKind, MigrationDomain, SHARED_DOMAIN};
pub use graph::RevisionGraph;
pub use runner::{DomainOutcome, MigrationRunner, PendingPlan, PlannedStep, UpgradeTarget};
pub use script::{load_dir, write_revision_stub, RevisionScript};
pub use version::{marker_table, read_marker, SHARED_VERSION_TABLE};

use std::fmt;
use std::path::PathBuf;

use crate::db::DbError;

pub type MigrateResult<T> = Result<T, MigrateError>;

/// Everything that can go wrong while planning or running migrations.
#[derive(Debug)]
pub enum MigrateError {
    /// A revision script failed to parse.
    Script { path: PathBuf, reason: String },
    DuplicateRevision { domain: String, id: String },
    /// A script names a parent that no script in the domain declares.
    MissingDownRevision {
        domain: String,
        id: String,
        parent: String,
    },
    AmbiguousHead {
        domain: String,
        candidates: Vec<String>,
    },
    /// No head exists although the domain has scripts.
    RevisionCycle { domain: String },
    RevisionNotFound { domain: String, revision: String },
    /// The revision exists but is not on the path the operation must walk.
    TargetNotReachable { domain: String, revision: String },
    /// An external app contributed a migration directory with no scripts.
    EmptyDomain { domain: String },
    ScriptDirMissing { domain: String, path: PathBuf },
    /// `migration_order` in the project config names an unknown app.
    OrderOverride { name: String },
    Db(DbError),
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::Script { path, reason } => {
                write!(f, "bad revision script {}: {reason}", path.display())
            }
            MigrateError::DuplicateRevision { domain, id } => {
                write!(f, "domain `{domain}` declares revision `{id}` more than once")
            }
            MigrateError::MissingDownRevision { domain, id, parent } => {
                write!(
                    f,
                    "revision `{id}` in domain `{domain}` names unknown parent `{parent}`"
                )
            }
            MigrateError::AmbiguousHead { domain, candidates } => {
                write!(
                    f,
                    "domain `{domain}` has multiple heads: {}",
                    candidates.join(", ")
                )
            }
            MigrateError::RevisionCycle { domain } => {
                write!(f, "domain `{domain}` has no head; its revisions form a cycle")
            }
            MigrateError::RevisionNotFound { domain, revision } => {
                write!(f, "domain `{domain}` has no revision `{revision}`")
            }
            MigrateError::TargetNotReachable { domain, revision } => {
                write!(
                    f,
                    "revision `{revision}` is not reachable from the current state of domain `{domain}`"
                )
            }
            MigrateError::EmptyDomain { domain } => {
                write!(f, "external domain `{domain}` has no revision scripts")
            }
            MigrateError::ScriptDirMissing { domain, path } => {
                write!(
                    f,
                    "domain `{domain}` is missing its migration directory {}",
                    path.display()
                )
            }
            MigrateError::OrderOverride { name } => {
                write!(f, "migration_order names unknown app `{name}`")
            }
            MigrateError::Db(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrateError::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for MigrateError {
    fn from(err: DbError) -> Self {
        MigrateError::Db(err)
    }
}

impl From<rusqlite::Error> for MigrateError {
    fn from(err: rusqlite::Error) -> Self {
        MigrateError::Db(DbError::from(err))
    }
}
