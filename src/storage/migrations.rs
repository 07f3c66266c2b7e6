//! Schema migrations.
//!
//! The schema version lives in the database header (`PRAGMA user_version`),
//! so it travels with every exported image. Pure-SQL steps are embedded from
//! `/migrations/` at the repo root with `include_str!`; conditional steps
//! inspect the live schema first and skip work that is already present, so
//! a step can be re-run against an image that was partially migrated or
//! produced elsewhere without failing.

use crate::error::{Error, Result};
use crate::storage::schema::{
    has_column, set_user_version, table_columns, table_exists, user_version,
};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Highest schema version this build knows how to produce.
pub const LATEST_SCHEMA_VERSION: u32 = 10;

/// How a migration step is applied.
enum Action {
    /// Execute a fixed script verbatim. The script sets `user_version` itself.
    Sql(&'static str),
    /// Inspect the schema, then apply whatever part of the change is missing.
    Conditional(fn(&Connection) -> rusqlite::Result<()>),
}

/// A single migration with the version it establishes.
struct Migration {
    version: u32,
    name: &'static str,
    action: Action,
}

/// All migrations in ascending version order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        action: Action::Sql(include_str!("../../migrations/001_initial.sql")),
    },
    Migration {
        version: 2,
        name: "split_kanji_notes",
        action: Action::Conditional(split_kanji_notes),
    },
    Migration {
        version: 3,
        name: "component_overhaul",
        action: Action::Conditional(component_overhaul),
    },
    Migration {
        version: 4,
        name: "kanji_kentei_level",
        action: Action::Conditional(add_kentei_level),
    },
    Migration {
        version: 5,
        name: "short_meaning",
        action: Action::Conditional(add_short_meaning),
    },
    Migration {
        version: 6,
        name: "component_search_keywords",
        action: Action::Conditional(component_search_keywords),
    },
    Migration {
        version: 7,
        name: "kanji_search_keywords",
        action: Action::Conditional(kanji_search_keywords),
    },
    Migration {
        version: 8,
        name: "nullable_kanji_stroke_count",
        action: Action::Sql(include_str!(
            "../../migrations/008_nullable_kanji_stroke_count.sql"
        )),
    },
    Migration {
        version: 9,
        name: "nullable_component_stroke_count",
        action: Action::Sql(include_str!(
            "../../migrations/009_nullable_component_stroke_count.sql"
        )),
    },
    Migration {
        version: 10,
        name: "non_jlpt_joyo",
        action: Action::Sql(include_str!("../../migrations/010_non_jlpt_joyo.sql")),
    },
];

const COMPONENT_OVERHAUL_SQL: &str = include_str!("../../migrations/003_component_overhaul.sql");
const KANJI_SEARCH_KEYWORDS_SQL: &str =
    include_str!("../../migrations/007_kanji_search_keywords.sql");

/// Outcome of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Version found in the database before the run.
    pub from: u32,
    /// Version recorded after the run.
    pub to: u32,
    /// Number of steps applied.
    pub applied: usize,
}

/// Versions and names of the steps a database at `version` still needs.
#[must_use]
pub fn pending_for(version: u32) -> Vec<(u32, &'static str)> {
    MIGRATIONS
        .iter()
        .filter(|m| m.version > version)
        .map(|m| (m.version, m.name))
        .collect()
}

/// Run all pending migrations on the database.
///
/// Steps whose version is above the recorded version are applied in order,
/// each in its own transaction, and the new version is recorded after each
/// one. Safe to call on every open: an up-to-date database is left alone.
///
/// Foreign-key enforcement is switched off while steps run, since table
/// rebuilds drop and recreate referenced tables, and restored afterwards.
///
/// # Errors
///
/// Returns [`Error::Migration`] naming the step that failed. Earlier steps
/// stay committed; the failed step is rolled back.
pub fn run_migrations(conn: &Connection) -> Result<MigrationReport> {
    run_migrations_to(conn, LATEST_SCHEMA_VERSION)
}

/// Run pending migrations up to and including `target`.
pub(crate) fn run_migrations_to(conn: &Connection, target: u32) -> Result<MigrationReport> {
    let from = user_version(conn)?;

    if from > LATEST_SCHEMA_VERSION {
        warn!(
            version = from,
            latest = LATEST_SCHEMA_VERSION,
            "Database schema is newer than this build; leaving it untouched"
        );
        return Ok(MigrationReport {
            from,
            to: from,
            applied: 0,
        });
    }

    let foreign_keys: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    if foreign_keys {
        conn.pragma_update(None, "foreign_keys", false)?;
    }

    let outcome = apply_pending(conn, from, target);

    if foreign_keys {
        conn.pragma_update(None, "foreign_keys", true)?;
    }

    let applied = outcome?;
    let to = user_version(conn)?;
    if applied > 0 {
        info!(from, to, applied, "Database schema migrated");
    }

    Ok(MigrationReport { from, to, applied })
}

fn apply_pending(conn: &Connection, from: u32, target: u32) -> Result<usize> {
    let mut applied = 0;

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > from && m.version <= target)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        apply_step(conn, migration).map_err(|source| Error::Migration {
            version: migration.version,
            source,
        })?;
        applied += 1;
    }

    Ok(applied)
}

fn apply_step(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;

    match migration.action {
        Action::Sql(sql) => tx.execute_batch(sql)?,
        Action::Conditional(step) => step(&tx)?,
    }
    set_user_version(&tx, migration.version)?;

    tx.commit()
}

/// Try to drop a column that a step has just replaced.
///
/// `DROP COLUMN` needs SQLite 3.35 and refuses columns that are still
/// indexed or constrained. Either way the old column is left in place as
/// unused residue; nothing reads it after the backfill.
fn drop_replaced_column(conn: &Connection, table: &str, column: &str) {
    match conn.execute_batch(&format!("ALTER TABLE {table} DROP COLUMN {column}")) {
        Ok(()) => debug!(table, column, "Dropped replaced column"),
        Err(e) => warn!(
            table,
            column,
            error = %e,
            "Could not drop replaced column, keeping it as residue"
        ),
    }
}

// ── Conditional steps ─────────────────────────────────────────

/// v2: split the free-text `kanjis.notes` into three typed note columns.
fn split_kanji_notes(conn: &Connection) -> rusqlite::Result<()> {
    let columns = table_columns(conn, "kanjis")?;
    let has_old = columns.iter().any(|c| c == "notes");
    let has_new = columns.iter().any(|c| c == "notes_etymology");

    if !has_old || has_new {
        debug!("kanjis notes already split");
        return Ok(());
    }

    conn.execute_batch(
        "ALTER TABLE kanjis ADD COLUMN notes_etymology TEXT;
         ALTER TABLE kanjis ADD COLUMN notes_cultural TEXT;
         ALTER TABLE kanjis ADD COLUMN notes_personal TEXT;
         UPDATE kanjis SET notes_personal = notes WHERE notes IS NOT NULL;",
    )?;
    drop_replaced_column(conn, "kanjis", "notes");
    Ok(())
}

/// v3: component occurrences and the tables around them.
fn component_overhaul(conn: &Connection) -> rusqlite::Result<()> {
    if table_exists(conn, "component_occurrences")? {
        debug!("component_occurrences already present");
        return Ok(());
    }
    conn.execute_batch(COMPONENT_OVERHAUL_SQL)
}

/// v4: Kanji Kentei level.
fn add_kentei_level(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "kanjis", "kanji_kentei_level")? {
        conn.execute_batch(
            "ALTER TABLE kanjis ADD COLUMN kanji_kentei_level TEXT;
             CREATE INDEX IF NOT EXISTS idx_kanjis_kentei_level ON kanjis(kanji_kentei_level);",
        )?;
    }
    Ok(())
}

/// v5: short meaning on kanji and components.
fn add_short_meaning(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "kanjis", "short_meaning")? {
        conn.execute_batch("ALTER TABLE kanjis ADD COLUMN short_meaning TEXT")?;
    }
    if !has_column(conn, "components", "short_meaning")? {
        conn.execute_batch("ALTER TABLE components ADD COLUMN short_meaning TEXT")?;
    }
    Ok(())
}

/// v6: replace `components.japanese_name` with `search_keywords`.
fn component_search_keywords(conn: &Connection) -> rusqlite::Result<()> {
    let columns = table_columns(conn, "components")?;
    let has_old = columns.iter().any(|c| c == "japanese_name");
    let has_new = columns.iter().any(|c| c == "search_keywords");

    match (has_old, has_new) {
        (true, false) => {
            conn.execute_batch(
                "ALTER TABLE components ADD COLUMN search_keywords TEXT;
                 UPDATE components SET search_keywords = japanese_name
                     WHERE japanese_name IS NOT NULL;",
            )?;
            drop_replaced_column(conn, "components", "japanese_name");
        }
        (false, false) => {
            conn.execute_batch("ALTER TABLE components ADD COLUMN search_keywords TEXT")?;
        }
        (_, true) => debug!("components.search_keywords already present"),
    }
    Ok(())
}

/// v7: search keywords on kanji.
fn kanji_search_keywords(conn: &Connection) -> rusqlite::Result<()> {
    if has_column(conn, "kanjis", "search_keywords")? {
        debug!("kanjis.search_keywords already present");
        return Ok(());
    }
    conn.execute_batch(KANJI_SEARCH_KEYWORDS_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::row_count;
    use crate::storage::snapshot::{export_image, open_image};

    fn fresh() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn shape(conn: &Connection) -> Vec<(String, Vec<String>)> {
        crate::storage::schema::list_tables(conn)
            .unwrap()
            .into_iter()
            .map(|t| {
                let cols = table_columns(conn, &t).unwrap();
                (t, cols)
            })
            .collect()
    }

    #[test]
    fn test_migrations_are_ordered() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version + 1 == w[1].version));
        assert_eq!(MIGRATIONS.first().unwrap().version, 1);
        assert_eq!(MIGRATIONS.last().unwrap().version, LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let conn = fresh();
        let report = run_migrations(&conn).expect("Migrations should apply to fresh database");

        assert_eq!(report.from, 0);
        assert_eq!(report.to, LATEST_SCHEMA_VERSION);
        assert_eq!(report.applied, MIGRATIONS.len());
        assert_eq!(user_version(&conn).unwrap(), LATEST_SCHEMA_VERSION);

        // Tables from migration 1 and 3 are queryable.
        assert_eq!(row_count(&conn, "kanjis").unwrap(), 0);
        assert_eq!(row_count(&conn, "component_occurrences").unwrap(), 0);
        assert!(!table_exists(&conn, "kanji_components").unwrap());
        assert!(row_count(&conn, "position_types").unwrap() > 0);
    }

    #[test]
    fn test_run_migrations_idempotent_across_export() {
        let conn = fresh();
        run_migrations(&conn).expect("First run should succeed");
        let second = run_migrations(&conn).expect("Second run should succeed (idempotent)");
        assert_eq!(second.applied, 0);

        let before = shape(&conn);
        let reloaded = open_image(&export_image(&conn).unwrap()).unwrap();
        let third = run_migrations(&reloaded).unwrap();

        assert_eq!(third.applied, 0);
        assert_eq!(third.to, LATEST_SCHEMA_VERSION);
        assert_eq!(shape(&reloaded), before);
    }

    #[test]
    fn test_any_starting_version_reaches_latest() {
        let reference = fresh();
        run_migrations(&reference).unwrap();
        let expected = shape(&reference);

        for start in [1, 2, 3, 5, 7, 9] {
            let conn = fresh();
            run_migrations_to(&conn, start).unwrap();
            assert_eq!(user_version(&conn).unwrap(), start);

            let report = run_migrations(&conn).unwrap();
            assert_eq!(report.from, start);
            assert_eq!(report.to, LATEST_SCHEMA_VERSION);
            assert_eq!(shape(&conn), expected, "diverged when starting at v{start}");
        }
    }

    #[test]
    fn test_data_survives_table_rebuilds() {
        let conn = fresh();
        run_migrations_to(&conn, 7).unwrap();
        conn.execute_batch(
            "INSERT INTO kanjis (character, stroke_count, jlpt_level, notes_personal)
                 VALUES ('明', 8, 'N4', 'sun + moon');
             INSERT INTO components (character, stroke_count) VALUES ('日', 4);
             INSERT INTO component_occurrences (kanji_id, component_id) VALUES (1, 1);",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let (character, notes): (String, String) = conn
            .query_row(
                "SELECT character, notes_personal FROM kanjis WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(character, "明");
        assert_eq!(notes, "sun + moon");
        assert_eq!(row_count(&conn, "component_occurrences").unwrap(), 1);

        // v8 and v10 constraints are in force.
        conn.execute(
            "INSERT INTO kanjis (character, stroke_count, jlpt_level) VALUES ('々', NULL, 'non-jlpt')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_foreign_keys_restored_after_run() {
        let conn = fresh();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        run_migrations(&conn).unwrap();
        let enabled: bool = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert!(enabled);
    }

    #[test]
    fn test_conditional_step_skips_existing_shape() {
        // An image that already has the v4/v5 columns but still records v3,
        // as happens with an interrupted session or an external tool.
        let conn = fresh();
        run_migrations_to(&conn, 3).unwrap();
        conn.execute_batch(
            "ALTER TABLE kanjis ADD COLUMN kanji_kentei_level TEXT;
             ALTER TABLE kanjis ADD COLUMN short_meaning TEXT;",
        )
        .unwrap();

        let report = run_migrations_to(&conn, 5).expect("existing columns must not fail");
        assert_eq!(report.to, 5);

        let columns = table_columns(&conn, "kanjis").unwrap();
        assert_eq!(columns.iter().filter(|c| *c == "kanji_kentei_level").count(), 1);
        assert_eq!(columns.iter().filter(|c| *c == "short_meaning").count(), 1);
        assert!(has_column(&conn, "components", "short_meaning").unwrap());
    }

    #[test]
    fn test_overhaul_skipped_when_occurrences_exist() {
        let conn = fresh();
        run_migrations_to(&conn, 2).unwrap();
        conn.execute_batch(
            "CREATE TABLE component_occurrences (id INTEGER PRIMARY KEY, kanji_id INTEGER);",
        )
        .unwrap();

        let report = run_migrations_to(&conn, 3).unwrap();
        assert_eq!(report.to, 3);
        // The full script did not run, so the legacy link table is still there.
        assert!(table_exists(&conn, "kanji_components").unwrap());
    }

    #[test]
    fn test_notes_split_backfills_old_column() {
        let conn = fresh();
        conn.execute_batch(
            "CREATE TABLE kanjis (id INTEGER PRIMARY KEY, character TEXT, notes TEXT);
             INSERT INTO kanjis (character, notes) VALUES ('山', 'mountain shape');
             PRAGMA user_version = 1;",
        )
        .unwrap();

        run_migrations_to(&conn, 2).unwrap();

        let personal: String = conn
            .query_row("SELECT notes_personal FROM kanjis", [], |row| row.get(0))
            .unwrap();
        assert_eq!(personal, "mountain shape");
        assert!(!has_column(&conn, "kanjis", "notes").unwrap());
    }

    #[test]
    fn test_failed_column_drop_leaves_residue() {
        let conn = fresh();
        // The index makes SQLite refuse DROP COLUMN, standing in for an engine
        // without column drop support.
        conn.execute_batch(
            "CREATE TABLE kanjis (id INTEGER PRIMARY KEY, character TEXT, notes TEXT);
             CREATE INDEX idx_kanjis_notes ON kanjis(notes);
             INSERT INTO kanjis (character, notes) VALUES ('川', 'river');
             PRAGMA user_version = 1;",
        )
        .unwrap();

        let report = run_migrations_to(&conn, 2).expect("drop failure is tolerated");
        assert_eq!(report.to, 2);

        let columns = table_columns(&conn, "kanjis").unwrap();
        assert!(columns.contains(&"notes".to_string()));
        assert!(columns.contains(&"notes_personal".to_string()));
    }

    #[test]
    fn test_component_keywords_replace_japanese_name() {
        let conn = fresh();
        run_migrations_to(&conn, 5).unwrap();
        conn.execute(
            "INSERT INTO components (character, stroke_count, japanese_name) VALUES ('氵', 3, 'さんずい')",
            [],
        )
        .unwrap();

        run_migrations_to(&conn, 6).unwrap();

        let keywords: String = conn
            .query_row("SELECT search_keywords FROM components", [], |row| row.get(0))
            .unwrap();
        assert_eq!(keywords, "さんずい");
        assert!(!has_column(&conn, "components", "japanese_name").unwrap());
    }

    #[test]
    fn test_failing_step_reports_version_and_rolls_back() {
        let conn = fresh();
        // Claims v7 but has no kanjis table for the v8 rebuild to copy.
        set_user_version(&conn, 7).unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, Error::Migration { version: 8, .. }));
        assert_eq!(user_version(&conn).unwrap(), 7);
        assert!(!table_exists(&conn, "kanjis_new").unwrap());
    }

    #[test]
    fn test_newer_database_left_untouched() {
        let conn = fresh();
        set_user_version(&conn, LATEST_SCHEMA_VERSION + 5).unwrap();
        let report = run_migrations(&conn).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.to, LATEST_SCHEMA_VERSION + 5);
    }

    #[test]
    fn test_pending_for() {
        assert!(pending_for(LATEST_SCHEMA_VERSION).is_empty());
        let pending = pending_for(8);
        assert_eq!(pending, vec![(9, "nullable_component_stroke_count"), (10, "non_jlpt_joyo")]);
    }
}
