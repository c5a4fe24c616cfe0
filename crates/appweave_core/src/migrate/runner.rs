//! Applies and reverts revisions against the project database.
//!
//! # Responsibility
//! - Turn a domain's scripts into a graph, diff it against the marker
//!   table, and run the pending steps.
//! - Drive whole-project upgrades: shared domain first, then every
//!   external app in registration order.
//!
//! # Invariants
//! - One transaction per revision, marker update included. A failing
//!   script rolls back only itself; earlier revisions stay committed.
//! - An empty shared domain is skipped; an empty external domain aborts
//!   the run.

use std::time::Instant;

use log::{error, info};
use rusqlite::Connection;

use super::domain::{domains, MigrationDomain};
use super::graph::RevisionGraph;
use super::script::{load_dir, RevisionScript};
use super::version::{read_marker, write_marker};
use super::{MigrateError, MigrateResult};
use crate::compose::AppRegistry;
use crate::config::ProjectConfig;

/// Where an upgrade should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeTarget {
    Head,
    Revision(String),
}

/// One planned step of a pending upgrade.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub id: String,
    pub message: Option<String>,
    pub sql: String,
}

/// What an upgrade would run, without running it.
#[derive(Debug, Clone)]
pub struct PendingPlan {
    pub domain: String,
    pub current: Option<String>,
    /// Resolved target revision; `None` when the domain has no scripts.
    pub target: Option<String>,
    pub steps: Vec<PlannedStep>,
}

impl PendingPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Renders the plan as annotated SQL, one block per step.
    pub fn sql(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str("-- revision: ");
            out.push_str(&step.id);
            if let Some(message) = &step.message {
                out.push_str(" (");
                out.push_str(message);
                out.push(')');
            }
            out.push('\n');
            if !step.sql.is_empty() {
                out.push_str(&step.sql);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// Result of migrating one domain during [`MigrationRunner::upgrade_all`].
#[derive(Debug, Clone)]
pub struct DomainOutcome {
    pub domain: String,
    /// Revision ids applied, oldest first. Empty means already at head.
    pub applied: Vec<String>,
}

/// Runs migrations for one project over one open connection.
pub struct MigrationRunner<'c> {
    conn: &'c mut Connection,
}

impl<'c> MigrationRunner<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    /// Applied head of a domain, straight from its marker table.
    pub fn current(&self, domain: &MigrationDomain) -> MigrateResult<Option<String>> {
        read_marker(&*self.conn, &domain.marker_table)
    }

    /// Plans the pending steps of an upgrade without touching the database.
    pub fn preview(
        &self,
        domain: &MigrationDomain,
        target: &UpgradeTarget,
    ) -> MigrateResult<PendingPlan> {
        let graph = self.graph(domain)?;
        let current = self.current(domain)?;
        let resolved = resolve_target(&graph, target);
        let steps = match &resolved {
            None => Vec::new(),
            Some(target_id) => graph
                .upgrade_path(current.as_deref(), target_id)?
                .into_iter()
                .map(|script| PlannedStep {
                    id: script.id.clone(),
                    message: script.message.clone(),
                    sql: script.up_sql.clone(),
                })
                .collect(),
        };
        Ok(PendingPlan {
            domain: domain.name.clone(),
            current,
            target: resolved,
            steps,
        })
    }

    /// Applies pending revisions up to `target` and returns the ids that
    /// ran, oldest first.
    pub fn upgrade(
        &mut self,
        domain: &MigrationDomain,
        target: &UpgradeTarget,
    ) -> MigrateResult<Vec<String>> {
        let graph = self.graph(domain)?;
        self.upgrade_with(domain, &graph, target)
    }

    /// Reverts revisions down to `target`, which stays applied. Returns the
    /// reverted ids, newest first.
    pub fn downgrade(
        &mut self,
        domain: &MigrationDomain,
        target: &str,
    ) -> MigrateResult<Vec<String>> {
        let graph = self.graph(domain)?;
        let current = self.current(domain)?;
        let path = graph.downgrade_path(current.as_deref(), target)?;

        let mut reverted = Vec::with_capacity(path.len());
        for script in path {
            let parent = match &script.parent {
                Some(parent) => parent.clone(),
                // Unreachable on a validated chain: every step above the
                // target has a parent.
                None => {
                    return Err(MigrateError::TargetNotReachable {
                        domain: domain.name.clone(),
                        revision: target.to_string(),
                    })
                }
            };
            self.revert(domain, script, &parent)?;
            reverted.push(script.id.clone());
        }
        info!(
            "event=migrate_downgrade module=migrate status=ok domain={} target={target} reverted={}",
            domain.name,
            reverted.len()
        );
        Ok(reverted)
    }

    /// Migrates every domain of a composed project to head.
    ///
    /// Stops at the first failing domain; domains migrated before it stay
    /// migrated.
    pub fn upgrade_all(
        &mut self,
        config: &ProjectConfig,
        registry: &AppRegistry,
    ) -> MigrateResult<Vec<DomainOutcome>> {
        let all = domains(config, registry)?;
        let mut outcomes = Vec::with_capacity(all.len());
        for domain in &all {
            let graph = self.graph(domain)?;
            if graph.is_empty() {
                if domain.is_shared() {
                    info!(
                        "event=migrate_upgrade module=migrate status=skip domain={} detail=no_scripts",
                        domain.name
                    );
                    outcomes.push(DomainOutcome {
                        domain: domain.name.clone(),
                        applied: Vec::new(),
                    });
                    continue;
                }
                return Err(MigrateError::EmptyDomain {
                    domain: domain.name.clone(),
                });
            }
            let applied = self.upgrade_with(domain, &graph, &UpgradeTarget::Head)?;
            outcomes.push(DomainOutcome {
                domain: domain.name.clone(),
                applied,
            });
        }
        Ok(outcomes)
    }

    fn upgrade_with(
        &mut self,
        domain: &MigrationDomain,
        graph: &RevisionGraph,
        target: &UpgradeTarget,
    ) -> MigrateResult<Vec<String>> {
        let current = self.current(domain)?;
        let target_id = match resolve_target(graph, target) {
            Some(target_id) => target_id,
            None => return Ok(Vec::new()),
        };
        let path = graph.upgrade_path(current.as_deref(), &target_id)?;

        let mut applied = Vec::with_capacity(path.len());
        for script in path {
            self.apply(domain, script)?;
            applied.push(script.id.clone());
        }
        info!(
            "event=migrate_upgrade module=migrate status=ok domain={} target={target_id} applied={}",
            domain.name,
            applied.len()
        );
        Ok(applied)
    }

    fn apply(&mut self, domain: &MigrationDomain, script: &RevisionScript) -> MigrateResult<()> {
        let started = Instant::now();
        let tx = self.conn.transaction()?;
        if let Err(err) = tx.execute_batch(&script.up_sql) {
            error!(
                "event=revision_apply module=migrate status=error domain={} revision={} detail={err}",
                domain.name, script.id
            );
            return Err(MigrateError::from(err));
        }
        write_marker(&tx, &domain.marker_table, &script.id)?;
        tx.commit()?;
        info!(
            "event=revision_apply module=migrate status=ok domain={} revision={} duration_ms={}",
            domain.name,
            script.id,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    fn revert(
        &mut self,
        domain: &MigrationDomain,
        script: &RevisionScript,
        parent: &str,
    ) -> MigrateResult<()> {
        let started = Instant::now();
        let tx = self.conn.transaction()?;
        if let Err(err) = tx.execute_batch(&script.down_sql) {
            error!(
                "event=revision_revert module=migrate status=error domain={} revision={} detail={err}",
                domain.name, script.id
            );
            return Err(MigrateError::from(err));
        }
        write_marker(&tx, &domain.marker_table, parent)?;
        tx.commit()?;
        info!(
            "event=revision_revert module=migrate status=ok domain={} revision={} duration_ms={}",
            domain.name,
            script.id,
            started.elapsed().as_millis()
        );
        Ok(())
    }

    fn graph(&self, domain: &MigrationDomain) -> MigrateResult<RevisionGraph> {
        let mut scripts = Vec::new();
        for source in &domain.sources {
            scripts.extend(load_dir(source)?);
        }
        RevisionGraph::from_scripts(&domain.name, scripts)
    }
}

fn resolve_target(graph: &RevisionGraph, target: &UpgradeTarget) -> Option<String> {
    match target {
        UpgradeTarget::Head => graph.head().map(String::from),
        UpgradeTarget::Revision(id) => Some(id.clone()),
    }
}
