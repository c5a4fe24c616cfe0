//! Version marker tables.
//!
//! Each domain records its applied head in a single-row table: the shared
//! domain in [`SHARED_VERSION_TABLE`], every external app in its own
//! `appweave_version_<app>` table. Tables are created lazily on first write,
//! inside the same transaction as the revision they mark.

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::MigrateResult;

/// Marker table for the shared domain.
pub const SHARED_VERSION_TABLE: &str = "appweave_version";

/// Marker table name for a domain. `None` is the shared domain.
pub fn marker_table(app: Option<&str>) -> String {
    match app {
        None => SHARED_VERSION_TABLE.to_string(),
        Some(app) => format!("{SHARED_VERSION_TABLE}_{}", sanitize(app)),
    }
}

/// App names come from declarations and manifests; squeeze them into a safe
/// identifier before they touch SQL.
fn sanitize(app: &str) -> String {
    app.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Reads the applied head of a domain. `None` means the domain was never
/// migrated: the marker table is missing or empty.
pub fn read_marker(conn: &Connection, table: &str) -> MigrateResult<Option<String>> {
    let exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let version = conn
        .query_row(&format!("SELECT version FROM {table}"), [], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(version)
}

/// Points the marker at `revision`, creating the table on first use. The
/// caller runs this inside the transaction of the revision being applied.
pub fn write_marker(conn: &Connection, table: &str, revision: &str) -> MigrateResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (version TEXT NOT NULL)"
    ))?;
    conn.execute(&format!("DELETE FROM {table}"), [])?;
    conn.execute(
        &format!("INSERT INTO {table} (version) VALUES (?1)"),
        params![revision],
    )?;
    debug!("event=marker_write module=migrate table={table} revision={revision}");
    Ok(())
}
