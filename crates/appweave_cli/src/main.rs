//! CLI smoke entry point.
//!
//! # Responsibility
//! - Scaffold a demo project, compose it, and migrate it end to end with
//!   deterministic output for quick local sanity checks.

use std::error::Error;
use std::path::Path;

use appweave_core::compose::{AppHandle, PackageIndex, RegisterResult};
use appweave_core::db::open_db;
use appweave_core::{Composer, MigrationRunner, ProjectConfig, Router};

const DEMO_CONFIG: &str = "apps = [\"apps.auth\", \"apps.blog\", \"payments\"]\n";

const DEMO_MANIFEST: &str = "\
name = \"payments\"
version = \"0.1.0\"
entrypoint = \"payments:register\"
migrations = \"migrations\"
models_module = \"payments.models\"
route_prefix = \"/pay\"
";

const CORE_SCRIPT: &str = "\
-- revision: core01
-- message: core settings

-- up
CREATE TABLE core_settings (key TEXT PRIMARY KEY, value TEXT NOT NULL);

-- down
DROP TABLE core_settings;
";

const AUTH_SCRIPT: &str = "\
-- revision: auth01
-- parent: core01
-- message: auth users

-- up
CREATE TABLE auth_users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);

-- down
DROP TABLE auth_users;
";

const PAYMENTS_SCRIPT: &str = "\
-- revision: pay01
-- message: payments ledger

-- up
CREATE TABLE payments_ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL);

-- down
DROP TABLE payments_ledger;
";

fn main() {
    if let Err(err) = run() {
        eprintln!("appweave demo failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("appweave_core version={}", appweave_core::core_version());

    let dir = tempfile::tempdir()?;
    scaffold_demo(dir.path())?;

    let log_dir = dir.path().join("logs");
    appweave_core::init_logging(
        appweave_core::default_log_level(),
        &log_dir.to_string_lossy(),
    )?;

    let config = ProjectConfig::load(dir.path())?;
    let index = demo_index(dir.path());
    let composition = Composer::new(&config, &index).compose()?;

    println!(
        "composed apps={} routes={} warnings={}",
        composition.registry.len(),
        composition.routes.len(),
        composition.warnings.len()
    );
    for route in composition.routes.entries() {
        println!(
            "route {} {} app={}",
            route.method.as_str(),
            route.path,
            route.app
        );
    }
    for warning in &composition.warnings {
        println!("warning {warning}");
    }

    let mut conn = open_db(&config.database)?;
    let outcomes = MigrationRunner::new(&mut conn).upgrade_all(&config, &composition.registry)?;
    for outcome in outcomes {
        println!(
            "migrated domain={} applied={}",
            outcome.domain,
            outcome.applied.len()
        );
    }

    Ok(())
}

fn demo_index(root: &Path) -> PackageIndex {
    let mut index = PackageIndex::new();
    index.export_fn("apps.auth", "register", register_auth);
    index.export_fn("apps.blog", "register", register_blog);
    index.register_package("payments", root.join("vendor").join("payments"));
    index.export_fn("payments", "register", register_payments);
    index
}

fn register_auth(app: &mut AppHandle) -> RegisterResult {
    let mut sessions = Router::new();
    sessions.get("/whoami");
    app.include_router("/session", sessions);

    let mut router = Router::new();
    router.post("/login").post("/logout");
    Ok(Some(router))
}

fn register_blog(_app: &mut AppHandle) -> RegisterResult {
    let mut router = Router::new();
    router.get("/posts").get("/posts/recent");
    Ok(Some(router))
}

fn register_payments(_app: &mut AppHandle) -> RegisterResult {
    let mut router = Router::new();
    router.get("/ledger").post("/charge");
    Ok(Some(router))
}

fn scaffold_demo(root: &Path) -> std::io::Result<()> {
    write_file(&root.join("appweave.toml"), DEMO_CONFIG)?;

    write_file(&root.join("apps/auth/mod.rs"), "pub fn noop() {}\n")?;
    write_file(&root.join("apps/auth/migrations/0002_auth.sql"), AUTH_SCRIPT)?;
    write_file(&root.join("apps/blog/mod.rs"), "pub fn noop() {}\n")?;
    write_file(&root.join("app_core/db/migrations/0001_core.sql"), CORE_SCRIPT)?;

    write_file(&root.join("vendor/payments/appweave.toml"), DEMO_MANIFEST)?;
    write_file(
        &root.join("vendor/payments/lib.rs"),
        "use appweave_core::compose::AppHandle;\n\npub fn noop() {}\n",
    )?;
    write_file(
        &root.join("vendor/payments/migrations/0001_ledger.sql"),
        PAYMENTS_SCRIPT,
    )?;
    Ok(())
}

fn write_file(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}
