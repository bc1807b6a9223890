//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.
//! A hot backup is taken before any pending migration is applied.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Back up the database before applying migrations.
///
/// Uses SQLite's online backup API to create a hot copy at
/// `<db_path>.pre-migration.bak`. Only called when there are pending
/// migrations; in-memory databases are skipped.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("SELECT file FROM pragma_database_list WHERE name = 'main'", [], |row| {
            row.get(0)
        })
        .unwrap_or_default();

    if db_path.is_empty() {
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut dst = Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup target: {}", e))?;
    let backup = rusqlite::backup::Backup::new(conn, &mut dst)
        .map_err(|e| format!("Failed to start backup: {}", e))?;
    backup
        .run_to_completion(64, std::time::Duration::from_millis(5), None)
        .map_err(|e| format!("Backup failed: {}", e))?;

    log::info!("Pre-migration backup written to {}", backup_path);
    Ok(())
}

/// Apply all pending migrations in version order.
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    ensure_schema_version_table(conn)?;

    let applied = current_version(conn)?;
    let pending: Vec<&Migration> =
        MIGRATIONS.iter().filter(|m| m.version > applied).collect();

    if pending.is_empty() {
        return Ok(());
    }

    if applied > 0 {
        backup_before_migration(conn)?;
    }

    for migration in pending {
        log::info!("Applying migration {:03}", migration.version);

        conn.execute_batch("BEGIN")
            .map_err(|e| format!("Migration {}: begin failed: {}", migration.version, e))?;

        let result = conn.execute_batch(migration.sql).and_then(|_| {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [migration.version],
            )
            .map(|_| ())
        });

        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")
                    .map_err(|e| format!("Migration {}: commit failed: {}", migration.version, e))?;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(format!("Migration {} failed: {}", migration.version, e));
            }
        }
    }

    Ok(())
}
