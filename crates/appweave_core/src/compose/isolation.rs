//! Boundary checks between internal apps, external packages, and the host.
//!
//! # Responsibility
//! - Scan an app's sources for `use` / `extern crate` roots and flag the
//!   ones that cross an isolation boundary.
//! - Scan external migration scripts for writes to the shared version table.
//!
//! # Invariants
//! - Validation never mutates a descriptor and never aborts on its own; it
//!   reports errors and warnings and leaves policy to the caller.
//! - `migrations` directories are excluded from the source scan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::resolver::{AppDescriptor, AppKind};
use super::ValidationResult;
use crate::migrate::SHARED_VERSION_TABLE;

/// Namespace roots that belong to the host project. External packages must
/// not reach into them.
const HOST_ROOTS: [&str; 2] = ["apps", "app_core"];

static USE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+(?:::)?([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid use statement regex")
});

static EXTERN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?extern\s+crate\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid extern crate regex")
});

static VERSION_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b{SHARED_VERSION_TABLE}\b")).expect("valid version table regex")
});

/// Checks one descriptor at a time against the isolation rules.
///
/// `externals` holds the import roots of every external package in the
/// project, so internal sources can be checked against them.
pub struct IsolationValidator<'a> {
    externals: &'a BTreeSet<String>,
}

impl<'a> IsolationValidator<'a> {
    pub fn new(externals: &'a BTreeSet<String>) -> Self {
        Self { externals }
    }

    pub fn validate(&self, descriptor: &AppDescriptor) -> ValidationResult {
        let mut result = ValidationResult::new();

        let sources = collect_sources(&descriptor.location, &mut result);
        if sources.is_empty() {
            result.add_warning(format!(
                "no source files under {}",
                descriptor.location.display()
            ));
        }

        for path in &sources {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    result.add_warning(format!("could not read {}: {err}", path.display()));
                    continue;
                }
            };
            for root in referenced_roots(&text) {
                match descriptor.kind {
                    AppKind::Internal => {
                        if self.externals.contains(&root) {
                            result.add_error(format!(
                                "{} imports external package `{root}`",
                                file_label(path, &descriptor.location)
                            ));
                        }
                    }
                    AppKind::External => {
                        if HOST_ROOTS.contains(&root.as_str()) {
                            result.add_error(format!(
                                "{} reaches into the host namespace `{root}`",
                                file_label(path, &descriptor.location)
                            ));
                        }
                    }
                }
            }
        }

        if descriptor.is_external() {
            self.check_migration_scripts(descriptor, &mut result);
        }

        result
    }

    /// External packages own their per-app marker table; the shared one is
    /// off limits even from raw SQL.
    fn check_migration_scripts(&self, descriptor: &AppDescriptor, result: &mut ValidationResult) {
        let dir = match &descriptor.migrations_path {
            Some(dir) if dir.is_dir() => dir.clone(),
            _ => return,
        };
        for path in sql_files(&dir, result) {
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    if VERSION_TABLE_RE.is_match(&text) {
                        result.add_error(format!(
                            "migration script {} references the shared version table `{SHARED_VERSION_TABLE}`",
                            file_label(&path, &dir)
                        ));
                    }
                }
                Err(err) => {
                    result.add_warning(format!("could not read {}: {err}", path.display()));
                }
            }
        }
    }
}

/// Roots named by `use` and `extern crate` statements. `crate`, `self`, and
/// `super` come back too; they never collide with a package root, so the
/// rule checks stay simple.
fn referenced_roots(text: &str) -> BTreeSet<String> {
    let mut roots = BTreeSet::new();
    for caps in USE_RE.captures_iter(text) {
        roots.insert(caps[1].to_string());
    }
    for caps in EXTERN_RE.captures_iter(text) {
        roots.insert(caps[1].to_string());
    }
    roots
}

fn collect_sources(dir: &Path, result: &mut ValidationResult) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(dir, &mut found, result);
    found.sort();
    found
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>, result: &mut ValidationResult) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            result.add_warning(format!("could not scan {}: {err}", dir.display()));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some("migrations") {
                continue;
            }
            walk(&path, found, result);
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("rs") {
            found.push(path);
        }
    }
}

fn sql_files(dir: &Path, result: &mut ValidationResult) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            result.add_warning(format!("could not scan {}: {err}", dir.display()));
            return Vec::new();
        }
    };
    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    found.sort();
    found
}

/// Shortens a scanned path to its app-relative form for messages.
fn file_label(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
