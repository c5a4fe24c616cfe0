//! Project configuration.
//!
//! # Responsibility
//! - Carry the ordered app declaration list and database location as an
//!   explicit value threaded through the engine constructors.
//! - Load that value from `appweave.toml` at a project root.
//!
//! # Invariants
//! - Declaration order in `apps` is preserved verbatim.
//! - No global or process-wide configuration state exists.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Project config file name, expected at the project root.
pub const CONFIG_FILE: &str = "appweave.toml";

/// Default database file, relative to the project root.
const DEFAULT_DATABASE: &str = "app.db";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    NotFound { path: PathBuf },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse { path: PathBuf, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "configuration file not found: {}", path.display())
            }
            Self::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, reason } => {
                write!(f, "failed to parse {}: {reason}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Raw TOML shape of the project config file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    apps: Vec<String>,
    database: Option<PathBuf>,
    migration_order: Option<Vec<String>>,
}

/// Explicit engine configuration for one managed project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Managed project root; internal apps live under `<root>/apps/`.
    pub root: PathBuf,
    /// Ordered app declarations; order is the composition contract.
    pub apps: Vec<String>,
    /// SQLite database path all migration domains share.
    pub database: PathBuf,
    /// Optional override for the shared domain's internal source order.
    /// `"core"` is reserved and always gathered first.
    pub migration_order: Option<Vec<String>>,
}

impl ProjectConfig {
    /// Builds a config directly, with the default database location.
    pub fn new(root: impl Into<PathBuf>, apps: Vec<String>) -> Self {
        let root = root.into();
        let database = root.join(DEFAULT_DATABASE);
        Self {
            root,
            apps,
            database,
            migration_order: None,
        }
    }

    /// Loads `appweave.toml` from the given project root.
    pub fn load(root: impl Into<PathBuf>) -> ConfigResult<Self> {
        let root = root.into();
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        Self::from_file(root, &path)
    }

    fn from_file(root: PathBuf, path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let database = match raw.database {
            Some(db) if db.is_absolute() => db,
            Some(db) => root.join(db),
            None => root.join(DEFAULT_DATABASE),
        };

        Ok(Self {
            root,
            apps: raw.apps,
            database,
            migration_order: raw.migration_order,
        })
    }

    /// Path of the platform core's migration scripts.
    pub fn core_migrations_dir(&self) -> PathBuf {
        self.root.join("app_core").join("db").join("migrations")
    }

    /// Directory holding internal app packages.
    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ProjectConfig, CONFIG_FILE};

    #[test]
    fn load_parses_apps_in_declared_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
apps = ["apps.auth", "apps.blog", "payments"]
database = "state/app.db"
migration_order = ["blog", "auth"]
"#,
        )
        .expect("config file should be written");

        let config = ProjectConfig::load(dir.path()).expect("config should load");
        assert_eq!(config.apps, vec!["apps.auth", "apps.blog", "payments"]);
        assert_eq!(config.database, dir.path().join("state/app.db"));
        assert_eq!(
            config.migration_order.as_deref(),
            Some(&["blog".to_string(), "auth".to_string()][..])
        );
    }

    #[test]
    fn load_defaults_database_and_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join(CONFIG_FILE), "apps = []\n")
            .expect("config file should be written");

        let config = ProjectConfig::load(dir.path()).expect("config should load");
        assert!(config.apps.is_empty());
        assert_eq!(config.database, dir.path().join("app.db"));
        assert!(config.migration_order.is_none());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let err = ProjectConfig::load(dir.path()).expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn load_reports_malformed_toml() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(dir.path().join(CONFIG_FILE), "apps = \"oops\"\n")
            .expect("config file should be written");

        let err = ProjectConfig::load(dir.path()).expect_err("bad shape should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn helper_paths_hang_off_the_root() {
        let config = ProjectConfig::new("/srv/demo", vec![]);
        assert_eq!(
            config.core_migrations_dir(),
            std::path::Path::new("/srv/demo/app_core/db/migrations")
        );
        assert_eq!(config.apps_dir(), std::path::Path::new("/srv/demo/apps"));
    }
}
