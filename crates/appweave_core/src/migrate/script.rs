//! Revision script parsing and stub generation.
//!
//! A revision script is a plain `.sql` file with a comment header and two
//! section markers:
//!
//! ```sql
//! -- revision: 3f9c2a1b4d5e
//! -- parent: 9e8d7c6b5a40
//! -- message: create users table
//!
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- down
//! DROP TABLE users;
//! ```
//!
//! # Invariants
//! - `-- revision`, `-- up`, and `-- down` are mandatory; `-- parent` is
//!   absent exactly on a domain's root revision.
//! - Section bodies may be empty; markers may not repeat or reorder.

use std::path::{Path, PathBuf};

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{MigrateError, MigrateResult};

const REVISION_HEADER: &str = "-- revision:";
const PARENT_HEADER: &str = "-- parent:";
const MESSAGE_HEADER: &str = "-- message:";
const UP_MARKER: &str = "-- up";
const DOWN_MARKER: &str = "-- down";

static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid revision id regex"));

/// One parsed revision script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionScript {
    pub id: String,
    /// `None` marks the root of a domain's revision chain.
    pub parent: Option<String>,
    pub message: Option<String>,
    pub up_sql: String,
    pub down_sql: String,
    pub source: PathBuf,
}

impl RevisionScript {
    pub fn parse(source: impl Into<PathBuf>, text: &str) -> MigrateResult<Self> {
        let source = source.into();
        let fail = |reason: String| MigrateError::Script {
            path: source.clone(),
            reason,
        };

        let mut id: Option<String> = None;
        let mut parent: Option<String> = None;
        let mut message: Option<String> = None;
        let mut up_lines: Option<Vec<&str>> = None;
        let mut down_lines: Option<Vec<&str>> = None;

        for line in text.lines() {
            let trimmed = line.trim();

            if let Some(lines) = down_lines.as_mut() {
                lines.push(line);
                continue;
            }
            if let Some(lines) = up_lines.as_mut() {
                if trimmed == DOWN_MARKER {
                    down_lines = Some(Vec::new());
                } else {
                    lines.push(line);
                }
                continue;
            }

            // Header section, before `-- up`.
            if trimmed == UP_MARKER {
                up_lines = Some(Vec::new());
            } else if trimmed == DOWN_MARKER {
                return Err(fail("found `-- down` before `-- up`".to_string()));
            } else if let Some(rest) = trimmed.strip_prefix(REVISION_HEADER) {
                if id.is_some() {
                    return Err(fail("duplicate `-- revision` header".to_string()));
                }
                let token = rest.trim();
                if !ID_RE.is_match(token) {
                    return Err(fail(format!("revision id `{token}` is not alphanumeric")));
                }
                id = Some(token.to_string());
            } else if let Some(rest) = trimmed.strip_prefix(PARENT_HEADER) {
                if parent.is_some() {
                    return Err(fail("duplicate `-- parent` header".to_string()));
                }
                let token = rest.trim();
                if !ID_RE.is_match(token) {
                    return Err(fail(format!("parent id `{token}` is not alphanumeric")));
                }
                parent = Some(token.to_string());
            } else if let Some(rest) = trimmed.strip_prefix(MESSAGE_HEADER) {
                let text = rest.trim();
                if !text.is_empty() {
                    message = Some(text.to_string());
                }
            } else if trimmed.is_empty() || trimmed.starts_with("--") {
                // Blank lines and plain comments are fine in the header.
            } else {
                return Err(fail("SQL before the `-- up` marker".to_string()));
            }
        }

        let id = id.ok_or_else(|| fail("missing `-- revision` header".to_string()))?;
        let up_lines = up_lines.ok_or_else(|| fail("missing `-- up` marker".to_string()))?;
        let down_lines = down_lines.ok_or_else(|| fail("missing `-- down` marker".to_string()))?;

        Ok(Self {
            id,
            parent,
            message,
            up_sql: up_lines.join("\n").trim().to_string(),
            down_sql: down_lines.join("\n").trim().to_string(),
            source,
        })
    }
}

/// Loads every `.sql` script in `dir`, in file name order.
pub fn load_dir(dir: &Path) -> MigrateResult<Vec<RevisionScript>> {
    let entries = std::fs::read_dir(dir).map_err(|err| MigrateError::Script {
        path: dir.to_path_buf(),
        reason: format!("could not read directory: {err}"),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    paths.sort();

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path).map_err(|err| MigrateError::Script {
            path: path.clone(),
            reason: format!("could not read file: {err}"),
        })?;
        scripts.push(RevisionScript::parse(path, &text)?);
    }
    Ok(scripts)
}

/// Writes an empty revision script into `dir` and returns its path.
///
/// The id is a fresh 12-hex-digit token; chain position comes from `parent`,
/// not from the file name.
pub fn write_revision_stub(
    dir: &Path,
    message: &str,
    parent: Option<&str>,
) -> MigrateResult<PathBuf> {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    let id = &hex[..12];

    let mut text = format!("{REVISION_HEADER} {id}\n");
    if let Some(parent) = parent {
        text.push_str(&format!("{PARENT_HEADER} {parent}\n"));
    }
    if !message.trim().is_empty() {
        text.push_str(&format!("{MESSAGE_HEADER} {}\n", message.trim()));
    }
    text.push_str(&format!("\n{UP_MARKER}\n\n\n{DOWN_MARKER}\n\n"));

    std::fs::create_dir_all(dir).map_err(|err| MigrateError::Script {
        path: dir.to_path_buf(),
        reason: format!("could not create directory: {err}"),
    })?;
    let path = dir.join(format!("{id}_{}.sql", slugify(message)));
    std::fs::write(&path, text).map_err(|err| MigrateError::Script {
        path: path.clone(),
        reason: format!("could not write file: {err}"),
    })?;
    info!(
        "event=revision_new module=migrate status=ok id={id} path={}",
        path.display()
    );
    Ok(path)
}

fn slugify(message: &str) -> String {
    let mut slug = String::new();
    for c in message.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
        if slug.len() >= 40 {
            break;
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "revision".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{load_dir, slugify, write_revision_stub, RevisionScript};
    use crate::migrate::MigrateError;

    #[test]
    fn parses_a_full_script() {
        let text = r#"-- revision: b2
-- parent: a1
-- message: add sessions

-- up
CREATE TABLE sessions (id INTEGER PRIMARY KEY);

-- down
DROP TABLE sessions;
"#;
        let script = RevisionScript::parse("/m/b2_add_sessions.sql", text)
            .expect("script should parse");
        assert_eq!(script.id, "b2");
        assert_eq!(script.parent.as_deref(), Some("a1"));
        assert_eq!(script.message.as_deref(), Some("add sessions"));
        assert_eq!(
            script.up_sql,
            "CREATE TABLE sessions (id INTEGER PRIMARY KEY);"
        );
        assert_eq!(script.down_sql, "DROP TABLE sessions;");
    }

    #[test]
    fn root_script_has_no_parent_and_may_be_empty() {
        let text = "-- revision: a1\n-- up\n-- down\n";
        let script = RevisionScript::parse("/m/a1.sql", text).expect("script should parse");
        assert_eq!(script.parent, None);
        assert_eq!(script.message, None);
        assert!(script.up_sql.is_empty());
        assert!(script.down_sql.is_empty());
    }

    #[test]
    fn missing_pieces_are_reported_by_name() {
        let cases = [
            ("-- up\n-- down\n", "missing `-- revision`"),
            ("-- revision: a1\n-- down\n", "found `-- down` before"),
            ("-- revision: a1\n-- up\n", "missing `-- down`"),
            ("-- revision: a1\n", "missing `-- up`"),
            ("-- revision: a1\n-- revision: b2\n-- up\n-- down\n", "duplicate `-- revision`"),
            ("-- revision: a1\nSELECT 1;\n-- up\n-- down\n", "SQL before"),
            ("-- revision: not ok\n-- up\n-- down\n", "not alphanumeric"),
        ];
        for (text, needle) in cases {
            let err = RevisionScript::parse("/m/x.sql", text).expect_err("parse should fail");
            match err {
                MigrateError::Script { reason, .. } => {
                    assert!(reason.contains(needle), "`{reason}` missing `{needle}`")
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn markers_inside_bodies_stay_sql() {
        let text = "-- revision: a1\n-- up\nINSERT INTO t VALUES ('-- down is not here');\n-- down\n-- up\nSELECT 1;\n";
        let script = RevisionScript::parse("/m/a1.sql", text).expect("script should parse");
        assert!(script.up_sql.contains("-- down is not here"));
        assert_eq!(script.down_sql, "-- up\nSELECT 1;");
    }

    #[test]
    fn load_dir_returns_scripts_in_file_name_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            dir.path().join("0002_b.sql"),
            "-- revision: b2\n-- parent: a1\n-- up\n-- down\n",
        )
        .expect("script written");
        std::fs::write(
            dir.path().join("0001_a.sql"),
            "-- revision: a1\n-- up\n-- down\n",
        )
        .expect("script written");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("note written");

        let scripts = load_dir(dir.path()).expect("directory should load");
        let ids: Vec<&str> = scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn stub_round_trips_through_the_parser() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = write_revision_stub(dir.path(), "Create users table!", Some("a1"))
            .expect("stub should be written");

        let text = std::fs::read_to_string(&path).expect("stub should be readable");
        let script = RevisionScript::parse(&path, &text).expect("stub should parse");
        assert_eq!(script.id.len(), 12);
        assert_eq!(script.parent.as_deref(), Some("a1"));
        assert_eq!(script.message.as_deref(), Some("Create users table!"));
        assert!(script.up_sql.is_empty());
        assert!(script.down_sql.is_empty());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name should be utf-8");
        assert!(name.ends_with("_create_users_table.sql"));
    }

    #[test]
    fn slugs_are_lowercase_and_bounded() {
        assert_eq!(slugify("Add Sessions"), "add_sessions");
        assert_eq!(slugify("  !!  "), "revision");
        assert_eq!(slugify(""), "revision");
        assert!(slugify(&"x y ".repeat(40)).len() <= 40);
    }
}
