//! Revision chains per domain.
//!
//! # Responsibility
//! - Validate a set of parsed scripts into one linear, root-first chain.
//! - Answer path queries for upgrades and downgrades.
//!
//! # Invariants
//! - Ids are unique, every parent exists, exactly one head, every script is
//!   reachable from the head. Violations are errors, never silent repair.
//! - Path results are in execution order: up scripts oldest first, down
//!   scripts newest first.

use std::collections::{BTreeMap, BTreeSet};

use super::{MigrateError, MigrateResult, RevisionScript};

#[derive(Debug)]
pub struct RevisionGraph {
    domain: String,
    /// Root-first.
    chain: Vec<RevisionScript>,
}

impl RevisionGraph {
    /// Chains `scripts` into a validated graph. An empty script set is a
    /// valid, empty graph; the caller decides whether that is acceptable.
    pub fn from_scripts(domain: &str, scripts: Vec<RevisionScript>) -> MigrateResult<Self> {
        if scripts.is_empty() {
            return Ok(Self {
                domain: domain.to_string(),
                chain: Vec::new(),
            });
        }

        let mut by_id: BTreeMap<String, RevisionScript> = BTreeMap::new();
        for script in scripts {
            if by_id.contains_key(&script.id) {
                return Err(MigrateError::DuplicateRevision {
                    domain: domain.to_string(),
                    id: script.id,
                });
            }
            by_id.insert(script.id.clone(), script);
        }

        for script in by_id.values() {
            if let Some(parent) = &script.parent {
                if !by_id.contains_key(parent) {
                    return Err(MigrateError::MissingDownRevision {
                        domain: domain.to_string(),
                        id: script.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let referenced: BTreeSet<&String> =
            by_id.values().filter_map(|s| s.parent.as_ref()).collect();
        let heads: Vec<String> = by_id
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect();
        if heads.is_empty() {
            return Err(MigrateError::RevisionCycle {
                domain: domain.to_string(),
            });
        }
        if heads.len() > 1 {
            return Err(MigrateError::AmbiguousHead {
                domain: domain.to_string(),
                candidates: heads,
            });
        }

        // Walk head -> root. Taking scripts out of the map makes a revisit,
        // and any unreachable leftover, detectable.
        let mut chain = Vec::with_capacity(by_id.len());
        let mut cursor = heads.into_iter().next();
        while let Some(id) = cursor {
            let script = match by_id.remove(&id) {
                Some(script) => script,
                None => {
                    return Err(MigrateError::RevisionCycle {
                        domain: domain.to_string(),
                    })
                }
            };
            cursor = script.parent.clone();
            chain.push(script);
        }
        if !by_id.is_empty() {
            return Err(MigrateError::RevisionCycle {
                domain: domain.to_string(),
            });
        }
        chain.reverse();

        Ok(Self {
            domain: domain.to_string(),
            chain,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Newest revision, `None` for an empty graph.
    pub fn head(&self) -> Option<&str> {
        self.chain.last().map(|s| s.id.as_str())
    }

    /// Root-first chain.
    pub fn chain(&self) -> &[RevisionScript] {
        &self.chain
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.chain.iter().position(|s| s.id == id)
    }

    fn position_or_not_found(&self, id: &str) -> MigrateResult<usize> {
        self.position(id)
            .ok_or_else(|| MigrateError::RevisionNotFound {
                domain: self.domain.clone(),
                revision: id.to_string(),
            })
    }

    /// Revisions to apply, oldest first, to move from `current` up to
    /// `target`. Empty when `current` already is the target.
    pub fn upgrade_path(
        &self,
        current: Option<&str>,
        target: &str,
    ) -> MigrateResult<Vec<&RevisionScript>> {
        let target_pos = self.position_or_not_found(target)?;
        let start = match current {
            None => 0,
            Some(current) => {
                let current_pos = self.position_or_not_found(current)?;
                if target_pos == current_pos {
                    return Ok(Vec::new());
                }
                if target_pos < current_pos {
                    return Err(MigrateError::TargetNotReachable {
                        domain: self.domain.clone(),
                        revision: target.to_string(),
                    });
                }
                current_pos + 1
            }
        };
        Ok(self.chain[start..=target_pos].iter().collect())
    }

    /// Revisions to revert, newest first, to move from `current` down to
    /// `target`. The target itself stays applied.
    pub fn downgrade_path(
        &self,
        current: Option<&str>,
        target: &str,
    ) -> MigrateResult<Vec<&RevisionScript>> {
        let target_pos = self.position_or_not_found(target)?;
        let current = match current {
            Some(current) => current,
            None => {
                return Err(MigrateError::TargetNotReachable {
                    domain: self.domain.clone(),
                    revision: target.to_string(),
                })
            }
        };
        let current_pos = self.position_or_not_found(current)?;
        if target_pos == current_pos {
            return Ok(Vec::new());
        }
        if target_pos > current_pos {
            return Err(MigrateError::TargetNotReachable {
                domain: self.domain.clone(),
                revision: target.to_string(),
            });
        }
        Ok(self.chain[target_pos + 1..=current_pos].iter().rev().collect())
    }
}
