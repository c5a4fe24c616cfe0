use std::path::{Path, PathBuf};

use appweave_core::compose::{AppHandle, PackageIndex, RegisterResult};
use appweave_core::db::open_db;
use appweave_core::migrate::{domains, marker_table, read_marker, SHARED_VERSION_TABLE};
use appweave_core::{
    Composer, Composition, MigrateError, MigrationRunner, ProjectConfig, UpgradeTarget,
};
use rusqlite::{Connection, OptionalExtension};

#[test]
fn upgrade_all_runs_the_shared_domain_then_externals_in_order() {
    let dir = tempfile::tempdir().unwrap();
    core_script(dir.path(), "0001_settings.sql", "core01", None, "core_settings");
    internal_app(dir.path(), "auth");
    app_script(dir.path(), "auth", "0001_users.sql", "auth01", Some("core01"), "auth_users");
    let payments_root = external_app(dir.path(), "payments");
    write_script(
        &payments_root.join("migrations"),
        "0001_ledger.sql",
        "pay01",
        None,
        "payments_ledger",
    );

    let config = project(dir.path(), &["apps.auth", "payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let outcomes = MigrationRunner::new(&mut conn)
        .upgrade_all(&config, &composition.registry)
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].domain, "shared");
    assert_eq!(outcomes[0].applied, vec!["core01", "auth01"]);
    assert_eq!(outcomes[1].domain, "payments");
    assert_eq!(outcomes[1].applied, vec!["pay01"]);

    assert_eq!(
        read_marker(&conn, SHARED_VERSION_TABLE).unwrap().as_deref(),
        Some("auth01")
    );
    assert_eq!(
        read_marker(&conn, &marker_table(Some("payments"))).unwrap().as_deref(),
        Some("pay01")
    );
    for table in ["core_settings", "auth_users", "payments_ledger"] {
        assert!(table_exists(&conn, table), "missing table {table}");
    }
}

#[test]
fn a_second_upgrade_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    core_script(dir.path(), "0001_settings.sql", "core01", None, "core_settings");
    let payments_root = external_app(dir.path(), "payments");
    write_script(
        &payments_root.join("migrations"),
        "0001_ledger.sql",
        "pay01",
        None,
        "payments_ledger",
    );

    let config = project(dir.path(), &["payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let mut runner = MigrationRunner::new(&mut conn);
    runner.upgrade_all(&config, &composition.registry).unwrap();
    let again = runner.upgrade_all(&config, &composition.registry).unwrap();

    for outcome in &again {
        assert!(outcome.applied.is_empty(), "domain {} re-applied", outcome.domain);
    }

    let all = domains(&config, &composition.registry).unwrap();
    for domain in &all {
        let plan = runner.preview(domain, &UpgradeTarget::Head).unwrap();
        assert!(plan.is_empty(), "domain {} still pending", domain.name);
    }
}

#[test]
fn an_empty_external_domain_aborts_after_the_shared_domain_committed() {
    let dir = tempfile::tempdir().unwrap();
    core_script(dir.path(), "0001_settings.sql", "core01", None, "core_settings");
    let payments_root = external_app(dir.path(), "payments");
    // migrations/ exists but holds no scripts.

    let config = project(dir.path(), &["payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let err = MigrationRunner::new(&mut conn)
        .upgrade_all(&config, &composition.registry)
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::EmptyDomain { ref domain } if domain == "payments"
    ));
    assert_eq!(
        read_marker(&conn, SHARED_VERSION_TABLE).unwrap().as_deref(),
        Some("core01")
    );
    assert!(table_exists(&conn, "core_settings"));
}

#[test]
fn a_failing_script_rolls_back_its_own_revision_only() {
    let dir = tempfile::tempdir().unwrap();
    core_script(dir.path(), "0001_settings.sql", "core01", None, "core_settings");
    let payments_root = external_app(dir.path(), "payments");
    let scripts = payments_root.join("migrations");
    write_script(&scripts, "0001_ledger.sql", "pay01", None, "payments_ledger");
    std::fs::write(
        scripts.join("0002_broken.sql"),
        "-- revision: pay02\n-- parent: pay01\n\n-- up\n\
         CREATE TABLE payments_audit (id INTEGER PRIMARY KEY);\nCREATE TLABE broken;\n\n\
         -- down\nDROP TABLE payments_audit;\n",
    )
    .unwrap();

    let config = project(dir.path(), &["payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let err = MigrationRunner::new(&mut conn)
        .upgrade_all(&config, &composition.registry)
        .unwrap_err();
    assert!(matches!(err, MigrateError::Db(_)));

    assert_eq!(
        read_marker(&conn, SHARED_VERSION_TABLE).unwrap().as_deref(),
        Some("core01")
    );
    assert_eq!(
        read_marker(&conn, &marker_table(Some("payments"))).unwrap().as_deref(),
        Some("pay01")
    );
    assert!(table_exists(&conn, "payments_ledger"));
    // The failed revision's first statement must not survive the rollback.
    assert!(!table_exists(&conn, "payments_audit"));
}

#[test]
fn downgrade_reverts_to_the_target_and_keeps_it_applied() {
    let dir = tempfile::tempdir().unwrap();
    let payments_root = external_app(dir.path(), "payments");
    let scripts = payments_root.join("migrations");
    write_script(&scripts, "0001_ledger.sql", "pay01", None, "payments_ledger");
    write_script(&scripts, "0002_refunds.sql", "pay02", Some("pay01"), "payments_refunds");
    write_script(&scripts, "0003_audit.sql", "pay03", Some("pay02"), "payments_audit");

    let config = project(dir.path(), &["payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let mut runner = MigrationRunner::new(&mut conn);
    runner.upgrade_all(&config, &composition.registry).unwrap();

    let all = domains(&config, &composition.registry).unwrap();
    let payments = all.iter().find(|domain| domain.name == "payments").unwrap();
    let reverted = runner.downgrade(payments, "pay01").unwrap();
    assert_eq!(reverted, vec!["pay03", "pay02"]);

    assert_eq!(
        read_marker(&conn, &marker_table(Some("payments"))).unwrap().as_deref(),
        Some("pay01")
    );
    assert!(table_exists(&conn, "payments_ledger"));
    assert!(!table_exists(&conn, "payments_refunds"));
    assert!(!table_exists(&conn, "payments_audit"));
}

#[test]
fn a_partial_upgrade_previews_only_the_remainder() {
    let dir = tempfile::tempdir().unwrap();
    let payments_root = external_app(dir.path(), "payments");
    let scripts = payments_root.join("migrations");
    write_script(&scripts, "0001_ledger.sql", "pay01", None, "payments_ledger");
    write_script(&scripts, "0002_refunds.sql", "pay02", Some("pay01"), "payments_refunds");

    let config = project(dir.path(), &["payments"]);
    let composition = compose(&config, &payments_root);

    let mut conn = open_db(&config.database).unwrap();
    let mut runner = MigrationRunner::new(&mut conn);

    let all = domains(&config, &composition.registry).unwrap();
    let payments = all.iter().find(|domain| domain.name == "payments").unwrap();

    let applied = runner
        .upgrade(payments, &UpgradeTarget::Revision("pay01".to_string()))
        .unwrap();
    assert_eq!(applied, vec!["pay01"]);

    let plan = runner.preview(payments, &UpgradeTarget::Head).unwrap();
    assert_eq!(plan.current.as_deref(), Some("pay01"));
    assert_eq!(plan.target.as_deref(), Some("pay02"));
    let pending: Vec<&str> = plan.steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(pending, vec!["pay02"]);

    let rest = runner.upgrade(payments, &UpgradeTarget::Head).unwrap();
    assert_eq!(rest, vec!["pay02"]);
}

#[test]
fn an_unknown_name_in_the_migration_order_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    core_script(dir.path(), "0001_settings.sql", "core01", None, "core_settings");
    internal_app(dir.path(), "auth");

    let mut config = project(dir.path(), &["apps.auth"]);
    config.migration_order = Some(vec!["core".to_string(), "ghost".to_string()]);

    let mut index = PackageIndex::new();
    index.export_fn("apps.auth", "register", noop_hook);
    let composition = Composer::new(&config, &index).compose().unwrap();

    let mut conn = open_db(&config.database).unwrap();
    let err = MigrationRunner::new(&mut conn)
        .upgrade_all(&config, &composition.registry)
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::OrderOverride { ref name } if name == "ghost"
    ));
    assert_eq!(read_marker(&conn, SHARED_VERSION_TABLE).unwrap(), None);
}

fn noop_hook(_app: &mut AppHandle) -> RegisterResult {
    Ok(None)
}

fn project(root: &Path, apps: &[&str]) -> ProjectConfig {
    ProjectConfig::new(root, apps.iter().map(|app| app.to_string()).collect())
}

/// Composes the project, exporting a no-op hook for every declared app.
fn compose(config: &ProjectConfig, payments_root: &Path) -> Composition {
    let mut index = PackageIndex::new();
    for declaration in &config.apps {
        if declaration == "payments" {
            index.register_package("payments", payments_root);
        }
        index.export_fn(declaration, "register", noop_hook);
    }
    Composer::new(config, &index).compose().unwrap()
}

fn internal_app(root: &Path, name: &str) {
    let dir = root.join("apps").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("mod.rs"), "pub fn noop() {}\n").unwrap();
}

fn external_app(root: &Path, name: &str) -> PathBuf {
    let dir = root.join("vendor").join(name);
    std::fs::create_dir_all(dir.join("migrations")).unwrap();
    std::fs::write(dir.join("lib.rs"), "pub fn noop() {}\n").unwrap();
    std::fs::write(
        dir.join("appweave.toml"),
        format!(
            "name = \"{name}\"\nversion = \"0.1.0\"\nentrypoint = \"{name}:register\"\n\
             migrations = \"migrations\"\nmodels_module = \"{name}.models\"\n"
        ),
    )
    .unwrap();
    dir
}

fn core_script(root: &Path, file: &str, id: &str, parent: Option<&str>, table: &str) {
    let dir = root.join("app_core").join("db").join("migrations");
    write_script(&dir, file, id, parent, table);
}

fn app_script(root: &Path, app: &str, file: &str, id: &str, parent: Option<&str>, table: &str) {
    let dir = root.join("apps").join(app).join("migrations");
    write_script(&dir, file, id, parent, table);
}

fn write_script(dir: &Path, file: &str, id: &str, parent: Option<&str>, table: &str) {
    std::fs::create_dir_all(dir).unwrap();
    let parent_line = match parent {
        Some(parent) => format!("-- parent: {parent}\n"),
        None => String::new(),
    };
    std::fs::write(
        dir.join(file),
        format!(
            "-- revision: {id}\n{parent_line}\n\
             -- up\nCREATE TABLE {table} (id INTEGER PRIMARY KEY);\n\n\
             -- down\nDROP TABLE {table};\n"
        ),
    )
    .unwrap();
}

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .unwrap()
    .is_some()
}
