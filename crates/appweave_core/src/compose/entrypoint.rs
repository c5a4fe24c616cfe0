//! Entrypoint references, the package index, and hook resolution.
//!
//! # Responsibility
//! - Parse `module:symbol` entrypoint references.
//! - Hold the compiled-in index of packages and the hooks they export.
//! - Resolve each descriptor's reference to a callable [`Entrypoint`].
//!
//! # Invariants
//! - Resolution only consults the index. Nothing is discovered by scanning.
//! - A registrar constructor runs exactly once, at resolution time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use super::handle::AppHandle;
use super::resolver::AppDescriptor;
use super::{ComposeError, ComposeResult, Stage};
use crate::router::Router;

const DEFAULT_SYMBOL: &str = "register";

/// Error a registration hook reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointFailure {
    message: String,
}

impl EntrypointFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EntrypointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EntrypointFailure {}

/// What a registration hook hands back: optionally a router to mount at the
/// app's route prefix.
pub type RegisterResult = Result<Option<Router>, EntrypointFailure>;

/// Plain-function registration hook.
pub type RegisterFn = fn(&mut AppHandle) -> RegisterResult;

/// Constructor for a registrar exported as a type rather than a function.
pub type RegistrarCtor = fn() -> Arc<dyn Registrar>;

/// Stateful registration hook. Implementations carry whatever setup their
/// constructor produced and register against the handle like a plain
/// function would.
pub trait Registrar: Send + Sync {
    fn register(&self, app: &mut AppHandle) -> RegisterResult;
}

/// One exported hook as it sits in the index, before resolution.
#[derive(Clone)]
pub enum EntrypointExport {
    Function(RegisterFn),
    Registrar(RegistrarCtor),
}

/// A resolved, callable registration hook.
#[derive(Clone)]
pub enum Entrypoint {
    Function(RegisterFn),
    Instance(Arc<dyn Registrar>),
}

impl Entrypoint {
    pub fn invoke(&self, app: &mut AppHandle) -> RegisterResult {
        match self {
            Entrypoint::Function(hook) => hook(app),
            Entrypoint::Instance(registrar) => registrar.register(app),
        }
    }
}

// Manual impl: `dyn Registrar` carries no `Debug` bound, so derive can't apply.
impl fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entrypoint::Function(_) => f.write_str("Function"),
            Entrypoint::Instance(_) => f.write_str("Instance"),
        }
    }
}

/// Parsed `module:symbol` reference. A bare module means the conventional
/// `register` symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointRef {
    pub module: String,
    pub symbol: String,
}

impl EntrypointRef {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("entrypoint reference is empty".to_string());
        }
        match raw.split_once(':') {
            None => Ok(Self {
                module: raw.to_string(),
                symbol: DEFAULT_SYMBOL.to_string(),
            }),
            Some((module, symbol)) => {
                if module.is_empty() {
                    return Err(format!("entrypoint reference `{raw}` has an empty module"));
                }
                if symbol.is_empty() {
                    return Err(format!("entrypoint reference `{raw}` has an empty symbol"));
                }
                if symbol.contains(':') {
                    return Err(format!(
                        "entrypoint reference `{raw}` has more than one `:`"
                    ));
                }
                Ok(Self {
                    module: module.to_string(),
                    symbol: symbol.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for EntrypointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.symbol)
    }
}

#[derive(Default)]
struct ModuleEntry {
    root: Option<PathBuf>,
    exports: BTreeMap<String, EntrypointExport>,
}

/// Compiled-in registry of module paths, their package roots, and the hooks
/// they export. The host application fills this at startup; composition
/// never looks anywhere else.
#[derive(Default)]
pub struct PackageIndex {
    modules: BTreeMap<String, ModuleEntry>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module_path` as an external package rooted at `root`.
    /// The resolver looks for the manifest beside that root.
    pub fn register_package(&mut self, module_path: &str, root: impl Into<PathBuf>) {
        self.entry_mut(module_path).root = Some(root.into());
    }

    /// Exports a plain-function hook under `module_path` / `symbol`.
    pub fn export_fn(&mut self, module_path: &str, symbol: &str, hook: RegisterFn) {
        self.entry_mut(module_path)
            .exports
            .insert(symbol.to_string(), EntrypointExport::Function(hook));
    }

    /// Exports a registrar constructor under `module_path` / `symbol`.
    pub fn export_registrar(&mut self, module_path: &str, symbol: &str, ctor: RegistrarCtor) {
        self.entry_mut(module_path)
            .exports
            .insert(symbol.to_string(), EntrypointExport::Registrar(ctor));
    }

    pub fn contains_module(&self, module_path: &str) -> bool {
        self.modules.contains_key(module_path)
    }

    pub fn package_root(&self, module_path: &str) -> Option<&Path> {
        self.modules
            .get(module_path)
            .and_then(|entry| entry.root.as_deref())
    }

    fn export(&self, module_path: &str, symbol: &str) -> Option<&EntrypointExport> {
        self.modules
            .get(module_path)
            .and_then(|entry| entry.exports.get(symbol))
    }

    fn entry_mut(&mut self, module_path: &str) -> &mut ModuleEntry {
        self.modules
            .entry(module_path.to_string())
            .or_insert_with(ModuleEntry::default)
    }
}

/// Resolves descriptors' entrypoint references against a [`PackageIndex`].
pub struct EntrypointLoader<'a> {
    index: &'a PackageIndex,
}

impl<'a> EntrypointLoader<'a> {
    pub fn new(index: &'a PackageIndex) -> Self {
        Self { index }
    }

    /// Resolves the descriptor's reference to a callable hook and advances
    /// its stage. Registrar constructors run here, once.
    pub fn load(&self, descriptor: &mut AppDescriptor) -> ComposeResult<()> {
        let reference = EntrypointRef::parse(&descriptor.entrypoint_ref).map_err(|reason| {
            ComposeError::Entrypoint {
                app: descriptor.name.clone(),
                reason,
            }
        })?;

        let export = match self.index.export(&reference.module, &reference.symbol) {
            Some(export) => export,
            None => {
                let reason = if self.index.contains_module(&reference.module) {
                    format!(
                        "module `{}` does not export `{}`",
                        reference.module, reference.symbol
                    )
                } else {
                    format!(
                        "module `{}` is not registered in the package index",
                        reference.module
                    )
                };
                return Err(ComposeError::Entrypoint {
                    app: descriptor.name.clone(),
                    reason,
                });
            }
        };

        let entrypoint = match export {
            EntrypointExport::Function(hook) => Entrypoint::Function(*hook),
            EntrypointExport::Registrar(ctor) => Entrypoint::Instance(ctor()),
        };
        info!(
            "event=entrypoint_resolve module=compose status=ok app={} reference={reference}",
            descriptor.name
        );
        descriptor.entrypoint = Some(entrypoint);
        descriptor.stage = Stage::EntrypointResolved;
        Ok(())
    }
}
