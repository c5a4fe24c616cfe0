//! The composition pass: declarations in, a registered application out.
//!
//! # Responsibility
//! - Run the staged pipeline resolve -> manifest -> isolation -> entrypoint
//!   -> registration -> route assembly.
//! - Separate fatal stage failures (`ComposeError`) from non-blocking
//!   findings (`Warning`).
//!
//! # Invariants
//! - Descriptor order equals declaration order at every stage.
//! - The first fatal error aborts the whole pass; there is no partial mode.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod composer;
mod entrypoint;
mod handle;
mod isolation;
mod manifest;
mod registry;
mod resolver;

pub use composer::{Composer, Composition};
pub use entrypoint::{
    Entrypoint, EntrypointFailure, EntrypointLoader, EntrypointRef, PackageIndex, RegisterFn,
    RegisterResult, Registrar, RegistrarCtor,
};
pub use handle::AppHandle;
pub use isolation::IsolationValidator;
pub use manifest::{load_manifest, Manifest, MANIFEST_FILE};
pub use registry::AppRegistry;
pub use resolver::{AppDescriptor, AppKind, Resolver, Stage, INTERNAL_PREFIX, PACKAGE_MARKER};

use crate::router::RouteCollision;

pub type ComposeResult<T> = Result<T, ComposeError>;

/// Fatal failure of one composition stage, tagged with the app it hit.
#[derive(Debug)]
pub enum ComposeError {
    Resolution { app: String, reason: String },
    Manifest { app: String, problems: Vec<String> },
    Entrypoint { app: String, reason: String },
    Registration {
        app: String,
        source: EntrypointFailure,
    },
    Isolation { app: String, errors: Vec<String> },
}

impl ComposeError {
    /// Pipeline stage the failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolve",
            Self::Manifest { .. } => "manifest",
            Self::Isolation { .. } => "validate",
            Self::Entrypoint { .. } => "entrypoint",
            Self::Registration { .. } => "register",
        }
    }

    /// Name of the app (or declaration) the failure is attached to.
    pub fn app(&self) -> &str {
        match self {
            Self::Resolution { app, .. }
            | Self::Manifest { app, .. }
            | Self::Entrypoint { app, .. }
            | Self::Registration { app, .. }
            | Self::Isolation { app, .. } => app,
        }
    }
}

impl Display for ComposeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution { app, reason } => {
                write!(f, "failed to resolve app `{app}`: {reason}")
            }
            Self::Manifest { app, problems } => {
                write!(f, "invalid manifest for app `{app}`: {}", problems.join("; "))
            }
            Self::Entrypoint { app, reason } => {
                write!(f, "failed to load entrypoint for app `{app}`: {reason}")
            }
            Self::Registration { app, source } => {
                write!(f, "registration of app `{app}` failed: {source}")
            }
            Self::Isolation { app, errors } => {
                write!(
                    f,
                    "isolation violations in app `{app}`: {}",
                    errors.join("; ")
                )
            }
        }
    }
}

impl Error for ComposeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registration { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Non-blocking finding surfaced by the composition pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Two declarations resolved to the same final name; the later one
    /// shadows the earlier app's routes and migrations.
    DuplicateName {
        name: String,
        first_declaration: String,
        second_declaration: String,
    },
    Manifest { app: String, message: String },
    Isolation { app: String, message: String },
    RouteCollision(RouteCollision),
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName {
                name,
                first_declaration,
                second_declaration,
            } => write!(
                f,
                "duplicate app name `{name}`: declaration `{second_declaration}` shadows `{first_declaration}`"
            ),
            Self::Manifest { app, message } => write!(f, "manifest for app `{app}`: {message}"),
            Self::Isolation { app, message } => {
                write!(f, "isolation scan of app `{app}`: {message}")
            }
            Self::RouteCollision(collision) => collision.fmt(f),
        }
    }
}

/// Structured findings from one validator run.
///
/// Errors make the composer abort; warnings are carried through to the
/// composition output.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
