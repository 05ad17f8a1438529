//! Schema migration runner.
//!
//! Migrations are an ordered list applied exactly once per tenant store,
//! tracked in `_migrations`. Published entries are immutable; schema
//! changes are appended as new entries, never edited in place.

use rusqlite::{params, Connection};

use super::keys;

struct Migration {
    version: i64,
    apply: fn(&Connection) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 0,
        apply: create_base_tables,
    },
    Migration {
        version: 1,
        apply: add_listing_columns,
    },
];

/// Apply all pending migrations. Runs at store construction, before any
/// request is served; safe to call on every startup.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    run(conn, MIGRATIONS)
}

fn run(conn: &mut Connection, migrations: &[Migration]) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL
         )",
        [],
    )?;

    let max_applied: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), -1) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in migrations {
        if migration.version <= max_applied {
            continue;
        }
        tracing::info!("applying store migration {}", migration.version);
        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?, ?)",
            params![
                migration.version,
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Migration 0: the chunked object table, multipart session tables, and the
/// listing index over chunk-0 rows.
fn create_base_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE objects (
             bucket        TEXT NOT NULL,
             key           TEXT NOT NULL,
             chunk_index   INTEGER NOT NULL,
             size          INTEGER NOT NULL DEFAULT 0,
             etag          TEXT NOT NULL DEFAULT '',
             last_modified TEXT NOT NULL DEFAULT '',
             content_type  TEXT NOT NULL DEFAULT '',
             data          BLOB NOT NULL,
             PRIMARY KEY (bucket, key, chunk_index)
         );

         CREATE TABLE multipart_uploads (
             upload_id    TEXT PRIMARY KEY,
             bucket       TEXT NOT NULL,
             key          TEXT NOT NULL,
             created_at   TEXT NOT NULL,
             content_type TEXT NOT NULL DEFAULT ''
         );

         CREATE TABLE multipart_parts (
             upload_id   TEXT NOT NULL,
             part_number INTEGER NOT NULL,
             chunk_index INTEGER NOT NULL,
             size        INTEGER NOT NULL DEFAULT 0,
             etag        TEXT NOT NULL DEFAULT '',
             data        BLOB NOT NULL,
             PRIMARY KEY (upload_id, part_number, chunk_index)
         );

         CREATE INDEX idx_objects_listing
             ON objects (bucket, key) WHERE chunk_index = 0;",
    )
}

/// Migration 1: denormalised `depth`/`parent` columns for the
/// slash-delimiter fast path, plus the parent index and a backfill of
/// chunk-0 rows written before the columns existed.
fn add_listing_columns(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "ALTER TABLE objects ADD COLUMN depth INTEGER;
         ALTER TABLE objects ADD COLUMN parent TEXT;

         CREATE INDEX idx_objects_parent
             ON objects (bucket, parent) WHERE chunk_index = 0;",
    )?;

    let existing: Vec<(String, String)> = {
        let mut stmt = conn.prepare("SELECT bucket, key FROM objects WHERE chunk_index = 0")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };

    for (bucket, key) in existing {
        conn.execute(
            "UPDATE objects SET depth = ?, parent = ?
             WHERE bucket = ? AND key = ? AND chunk_index = 0",
            params![keys::depth(&key), keys::parent(&key), bucket, key],
        )?;
    }

    Ok(())
}
