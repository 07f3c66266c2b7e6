//! The database session.
//!
//! Everything outside this module reaches the database through a
//! [`DatabaseSession`]. It owns the live in-memory connection, brings it up
//! from the persisted image, and makes sure every write is followed by a
//! scheduled save.
//!
//! ```text
//! initialize: load image ─┬─ found ──► open image ─┐
//!                         └─ none ───► open empty ─┴─► migrate ─► baseline save ─► attach lifecycle ─► Ready
//! ```

use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleBinder, LifecycleTarget};
use crate::storage::migrations::{LATEST_SCHEMA_VERSION, MigrationReport, pending_for, run_migrations};
use crate::storage::schema::{CLEARABLE_TABLES, list_tables, row_count, table_exists, user_version};
use crate::storage::snapshot::{export_image, open_empty, open_image, validate_image};
use crate::store::{BlobStore, DATABASE_KEY, DatabaseRef, PersistPhase, Persister};
use rusqlite::types::Value;
use rusqlite::{Connection, Params};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
}

/// How a session persists and which lifecycle signals it listens to.
#[derive(Clone)]
pub struct SessionOptions {
    /// Store key the image lives under.
    pub key: String,
    /// Delay between the last write and its save.
    pub debounce: Duration,
    /// Signal source to attach save handlers to, if any.
    pub lifecycle: Option<Arc<dyn LifecycleTarget>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            key: DATABASE_KEY.to_string(),
            debounce: Duration::from_millis(crate::config::DEFAULT_PERSIST_DEBOUNCE_MS),
            lifecycle: None,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, target: Arc<dyn LifecycleTarget>) -> Self {
        self.lifecycle = Some(target);
        self
    }
}

/// Rows returned by [`DatabaseSession::exec`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    ///
    /// Blobs are rendered as lowercase hex.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), value_to_json(value)))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

/// Convert one SQLite value to JSON.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(bytes) => serde_json::Value::String(
            bytes.iter().map(|b| format!("{b:02x}")).collect(),
        ),
    }
}

/// Row count of one table, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Snapshot of the session for status output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub schema_version: u32,
    pub latest_version: u32,
    pub pending_migrations: Vec<u32>,
    pub persist: PersistPhase,
    pub store: String,
    pub tables: Vec<TableCount>,
}

/// Owner of the live database.
pub struct DatabaseSession {
    database: DatabaseRef,
    persister: Persister,
    binder: LifecycleBinder,
    lifecycle: Option<Arc<dyn LifecycleTarget>>,
    ready: OnceCell<()>,
    initializing: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("state", &self.state())
            .field("persister", &self.persister)
            .field("lifecycle", &self.lifecycle.is_some())
            .finish_non_exhaustive()
    }
}

impl DatabaseSession {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, options: SessionOptions) -> Self {
        Self {
            database: Arc::new(Mutex::new(None)),
            persister: Persister::new(store, options.key, options.debounce),
            binder: LifecycleBinder::new(),
            lifecycle: options.lifecycle,
            ready: OnceCell::new(),
            initializing: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.ready.initialized() {
            SessionState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            SessionState::Initializing
        } else {
            SessionState::Uninitialized
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Message of the most recent failed initialization, if it failed.
    #[must_use]
    pub fn last_init_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    #[must_use]
    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// Bring the session to Ready.
    ///
    /// Safe to call any number of times; once it has succeeded, later calls
    /// return at once. Concurrent callers wait for the same attempt. After
    /// a failure the next call starts over.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read, the stored image is unreadable, a
    /// migration fails, or the baseline save fails.
    pub async fn initialize(&self) -> Result<()> {
        self.ready.get_or_try_init(|| self.bootstrap()).await?;
        Ok(())
    }

    async fn bootstrap(&self) -> Result<()> {
        self.initializing.store(true, Ordering::SeqCst);
        let outcome = self.open_and_prepare().await;
        self.initializing.store(false, Ordering::SeqCst);

        match &outcome {
            Ok(()) => *lock(&self.last_error) = None,
            Err(e) => {
                error!(error = %e, "Database initialization failed");
                *lock(&self.last_error) = Some(e.to_string());
                *lock(&self.database) = None;
            }
        }
        outcome
    }

    async fn open_and_prepare(&self) -> Result<()> {
        let conn = match self.persister.load().await? {
            Some(bytes) => {
                info!(bytes = bytes.len(), "Loaded persisted database image");
                open_image(&bytes)?
            }
            None => {
                info!("No persisted database found, starting empty");
                open_empty()?
            }
        };

        let report = run_migrations(&conn)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        *lock(&self.database) = Some(conn);
        self.persister.set_database_ref(Arc::clone(&self.database));

        // Baseline: the migrated image becomes the persisted one before any
        // caller gets to write.
        self.persister.persist_immediately().await?;

        if let Some(target) = &self.lifecycle {
            self.binder.attach(target.as_ref(), &self.persister);
        }

        info!(
            schema_version = report.to,
            migrated = report.applied,
            "Database ready"
        );
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_ready()?;
        let slot = lock(&self.database);
        let conn = slot.as_ref().ok_or(Error::NotInitialized)?;
        f(conn)
    }

    /// Run a read query and collect every row.
    ///
    /// Never schedules a save.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`initialize`](Self::initialize)
    /// succeeds; otherwise whatever SQLite reports.
    pub fn exec<P: Params>(&self, sql: &str, params: P) -> Result<QueryResult> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();

            let rows = stmt
                .query_map(params, |row| {
                    (0..width)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(QueryResult { columns, rows })
        })
    }

    /// Whether a statement leaves the database unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization, or the prepare
    /// error for invalid SQL.
    pub fn is_read_only(&self, sql: &str) -> Result<bool> {
        self.with_connection(|conn| Ok(conn.prepare(sql)?.readonly()))
    }

    /// Run one write statement, then schedule a debounced save.
    ///
    /// Returns the number of rows changed. The change is visible to
    /// [`exec`](Self::exec) as soon as this returns, whatever happens to the
    /// save.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization; constraint
    /// violations and other SQLite errors as [`Error::Database`]. No save is
    /// scheduled when the statement fails.
    pub fn run<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let changed = self.with_connection(|conn| Ok(conn.execute(sql, params)?))?;
        self.persister.schedule();
        Ok(changed)
    }

    /// Run several semicolon-separated write statements, then schedule a
    /// save. Statements take no parameters.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run). Statements before the failing one stay
    /// applied unless the batch wraps itself in a transaction.
    pub fn run_batch(&self, sql: &str) -> Result<()> {
        self.with_connection(|conn| Ok(conn.execute_batch(sql)?))?;
        self.persister.schedule();
        Ok(())
    }

    /// Save now and wait for it.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization; [`Error::Persist`]
    /// if the write fails.
    pub async fn persist(&self) -> Result<()> {
        self.ensure_ready()?;
        self.persister.persist_immediately().await
    }

    /// Wait for any scheduled or running save to finish.
    ///
    /// # Errors
    ///
    /// [`Error::Persist`] if the final write fails.
    pub async fn flush(&self) -> Result<()> {
        self.persister.flush().await
    }

    /// Current database image.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization, or the export error.
    pub fn export(&self) -> Result<Vec<u8>> {
        self.with_connection(export_image)
    }

    /// Replace the live database with an imported image.
    ///
    /// The image must pass [`validate_image`], then it is opened and
    /// migrated on its own connection; only then is it swapped in and the
    /// old connection closed. If anything before the swap fails, the
    /// current database is untouched.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] unless Ready; [`Error::InvalidImage`] or
    /// [`Error::Migration`] for a bad image, with nothing changed;
    /// [`Error::Persist`] if the swap succeeded but the save did not.
    pub async fn replace_database(&self, bytes: &[u8]) -> Result<MigrationReport> {
        self.ensure_ready()?;

        validate_image(bytes)?;
        let conn = open_image(bytes)?;
        let report = run_migrations(&conn)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        drop(lock(&self.database).replace(conn));
        info!(
            from = report.from,
            to = report.to,
            bytes = bytes.len(),
            "Database replaced from import"
        );

        self.persister.persist_immediately().await?;
        Ok(report)
    }

    /// Delete every row of every application table, then save.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization; [`Error::Database`]
    /// if a delete fails (nothing is deleted then); [`Error::Persist`] if
    /// the save fails.
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut removed = 0;
            for table in CLEARABLE_TABLES {
                if table_exists(&tx, table)? {
                    removed += tx.execute(&format!("DELETE FROM {table}"), [])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })?;

        info!(rows = removed, "Cleared all data");
        self.persist().await?;
        Ok(removed)
    }

    /// Schema version, pending migrations and row counts.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before initialization.
    pub fn status(&self) -> Result<SessionStatus> {
        let (schema_version, tables) = self.with_connection(|conn| {
            let version = user_version(conn)?;
            let tables = list_tables(conn)?
                .into_iter()
                .map(|table| -> Result<TableCount> {
                    let rows = row_count(conn, &table)?;
                    Ok(TableCount { table, rows })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((version, tables))
        })?;

        Ok(SessionStatus {
            state: self.state(),
            schema_version,
            latest_version: LATEST_SCHEMA_VERSION,
            pending_migrations: pending_for(schema_version).into_iter().map(|(v, _)| v).collect(),
            persist: self.persister.phase(),
            store: self.persister.store().describe(),
            tables,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleEvents, LifecycleSignal};
    use crate::storage::migrations::run_migrations_to;
    use crate::store::MemoryBlobStore;
    use rusqlite::params;

    const INSERT_KANJI: &str =
        "INSERT INTO kanjis (character, stroke_count, jlpt_level) VALUES (?1, ?2, ?3)";

    fn session_over(store: &Arc<MemoryBlobStore>) -> DatabaseSession {
        DatabaseSession::new(store.clone(), SessionOptions::default())
    }

    async fn ready_session() -> (Arc<MemoryBlobStore>, DatabaseSession) {
        let store = Arc::new(MemoryBlobStore::new());
        let session = session_over(&store);
        session.initialize().await.unwrap();
        (store, session)
    }

    fn characters(session: &DatabaseSession) -> Vec<Value> {
        session
            .exec("SELECT character FROM kanjis ORDER BY id", [])
            .unwrap()
            .rows
            .into_iter()
            .map(|mut row| row.remove(0))
            .collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let store = Arc::new(MemoryBlobStore::new());
        let session = session_over(&store);

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(matches!(session.exec("SELECT 1", []), Err(Error::NotInitialized)));
        assert!(matches!(session.run("DELETE FROM kanjis", []), Err(Error::NotInitialized)));
        assert!(matches!(session.export(), Err(Error::NotInitialized)));
        assert!(matches!(session.persist().await, Err(Error::NotInitialized)));
        assert!(matches!(
            session.replace_database(b"anything").await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_initialize_empty_store_writes_migrated_baseline() {
        let (store, session) = ready_session().await;

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(store.write_count(), 1);

        let baseline = open_image(&store.get(DATABASE_KEY).unwrap()).unwrap();
        assert_eq!(user_version(&baseline).unwrap(), LATEST_SCHEMA_VERSION);

        let status = session.status().unwrap();
        assert_eq!(status.schema_version, LATEST_SCHEMA_VERSION);
        assert!(status.pending_migrations.is_empty());
        assert!(status.tables.iter().any(|t| t.table == "kanjis" && t.rows == 0));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = Arc::new(MemoryBlobStore::new());
        let session = session_over(&store);

        let (a, b) = tokio::join!(session.initialize(), session.initialize());
        a.unwrap();
        b.unwrap();
        session.initialize().await.unwrap();

        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_migrates_older_persisted_image() {
        let old = Connection::open_in_memory().unwrap();
        run_migrations_to(&old, 3).unwrap();
        old.execute(
            "INSERT INTO kanjis (character, stroke_count) VALUES ('古', 5)",
            [],
        )
        .unwrap();
        let store = Arc::new(MemoryBlobStore::with_blob(
            DATABASE_KEY,
            export_image(&old).unwrap(),
        ));

        let session = session_over(&store);
        session.initialize().await.unwrap();

        assert_eq!(characters(&session), vec![text("古")]);
        assert_eq!(session.status().unwrap().schema_version, LATEST_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_unreadable_image_fails_initialization() {
        let store = Arc::new(MemoryBlobStore::with_blob(DATABASE_KEY, b"junk".to_vec()));
        let session = session_over(&store);

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.last_init_error().is_some());
        // The stored image was not overwritten.
        assert_eq!(store.get(DATABASE_KEY).unwrap(), b"junk");
    }

    #[tokio::test]
    async fn test_failed_baseline_save_is_fatal_and_retryable() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_next(1);
        let session = session_over(&store);

        assert!(matches!(session.initialize().await, Err(Error::Persist(_))));
        assert!(!session.is_ready());

        session.initialize().await.unwrap();
        assert!(session.is_ready());
        assert!(session.last_init_error().is_none());
    }

    #[tokio::test]
    async fn test_write_read_export_reload_scenario() {
        let (_store, session) = ready_session().await;

        let changed = session.run(INSERT_KANJI, params!["日", 4, "N5"]).unwrap();
        assert_eq!(changed, 1);

        let result = session
            .exec("SELECT character, stroke_count FROM kanjis WHERE jlpt_level = ?1", ["N5"])
            .unwrap();
        assert_eq!(result.columns, vec!["character", "stroke_count"]);
        assert_eq!(result.rows, vec![vec![text("日"), Value::Integer(4)]]);

        let image = session.export().unwrap();
        let reloaded = Arc::new(MemoryBlobStore::with_blob(DATABASE_KEY, image.clone()));
        let second = session_over(&reloaded);
        second.initialize().await.unwrap();

        assert_eq!(characters(&second), vec![text("日")]);
        let reexported = open_image(&second.export().unwrap()).unwrap();
        assert_eq!(user_version(&reexported).unwrap(), LATEST_SCHEMA_VERSION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_visible_despite_failed_save() {
        let (store, session) = ready_session().await;
        store.fail_next(1);

        session.run(INSERT_KANJI, params!["月", 4, "N5"]).unwrap();
        assert_eq!(characters(&session), vec![text("月")]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.write_count(), 1, "only the baseline landed");
        assert_eq!(session.persister().phase(), PersistPhase::Idle);
        assert_eq!(characters(&session), vec![text("月")]);

        // The queue recovered: the next write saves both rows.
        session.run(INSERT_KANJI, params!["星", 9, "N2"]).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.write_count(), 2);

        let saved = open_image(&store.get(DATABASE_KEY).unwrap()).unwrap();
        assert_eq!(row_count(&saved, "kanjis").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reads_never_save() {
        let (store, session) = ready_session().await;
        assert!(session.is_read_only("SELECT * FROM kanjis").unwrap());
        assert!(!session.is_read_only("DELETE FROM kanjis").unwrap());
        session.exec("SELECT * FROM kanjis", []).unwrap();
        session.flush().await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_constraint_violation_propagates_without_save() {
        let (store, session) = ready_session().await;

        let err = session
            .run(INSERT_KANJI, params!["犬", 4, "N9"])
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(session.persister().phase(), PersistPhase::Idle);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_import_keeps_current_database() {
        let (store, session) = ready_session().await;
        session.run(INSERT_KANJI, params!["人", 2, "N5"]).unwrap();
        session.persist().await.unwrap();
        let before = store.get(DATABASE_KEY).unwrap();

        // Claims v7 but lacks the columns the v8 rebuild copies.
        let bad = Connection::open_in_memory().unwrap();
        bad.execute_batch(
            "CREATE TABLE kanjis (id INTEGER PRIMARY KEY, character TEXT);
             INSERT INTO kanjis (character) VALUES ('偽');
             PRAGMA user_version = 7;",
        )
        .unwrap();

        let err = session
            .replace_database(&export_image(&bad).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Migration { version: 8, .. }));

        assert_eq!(characters(&session), vec![text("人")]);
        assert_eq!(store.get(DATABASE_KEY).unwrap(), before);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_import_garbage_is_rejected() {
        let (_store, session) = ready_session().await;
        let err = session.replace_database(b"not sqlite").await.unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_import_without_kanjis_table_is_rejected() {
        let (store, session) = ready_session().await;
        session.run(INSERT_KANJI, params!["月", 4, "N5"]).unwrap();
        session.persist().await.unwrap();
        let writes = store.write_count();

        let unrelated = Connection::open_in_memory().unwrap();
        unrelated
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
            .unwrap();

        let err = session
            .replace_database(&export_image(&unrelated).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert_eq!(characters(&session), vec![text("月")]);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_import_replaces_and_persists() {
        let (store, session) = ready_session().await;
        session.run(INSERT_KANJI, params!["旧", 5, "N3"]).unwrap();

        let other = Connection::open_in_memory().unwrap();
        run_migrations_to(&other, 7).unwrap();
        other
            .execute(
                "INSERT INTO kanjis (character, stroke_count, jlpt_level) VALUES ('新', 13, 'N2')",
                [],
            )
            .unwrap();

        let report = session
            .replace_database(&export_image(&other).unwrap())
            .await
            .unwrap();
        assert_eq!(report.from, 7);
        assert_eq!(report.to, LATEST_SCHEMA_VERSION);
        assert_eq!(characters(&session), vec![text("新")]);

        let saved = open_image(&store.get(DATABASE_KEY).unwrap()).unwrap();
        let character: String = saved
            .query_row("SELECT character FROM kanjis", [], |row| row.get(0))
            .unwrap();
        assert_eq!(character, "新");
    }

    #[tokio::test]
    async fn test_clear_all_empties_tables_and_saves() {
        let (store, session) = ready_session().await;
        session
            .run_batch(
                "INSERT INTO radicals (character, stroke_count, number) VALUES ('口', 3, 30);
                 INSERT INTO kanjis (character, stroke_count) VALUES ('口', 3);
                 INSERT INTO components (character, stroke_count) VALUES ('口', 3);
                 INSERT INTO component_occurrences (kanji_id, component_id) VALUES (1, 1);",
            )
            .unwrap();

        let removed = session.clear_all().await.unwrap();
        assert_eq!(removed, 3);
        assert!(characters(&session).is_empty());

        let saved = open_image(&store.get(DATABASE_KEY).unwrap()).unwrap();
        assert_eq!(row_count(&saved, "kanjis").unwrap(), 0);
        // Lookup tables seeded by migrations are not application data.
        assert!(row_count(&saved, "position_types").unwrap() > 0);
        assert_eq!(row_count(&saved, "radicals").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_attached_once_after_ready() {
        let events = Arc::new(LifecycleEvents::new());
        let store = Arc::new(MemoryBlobStore::new());
        let session = DatabaseSession::new(
            store.clone(),
            SessionOptions::default().with_lifecycle(events.clone()),
        );

        assert_eq!(events.listener_count(LifecycleSignal::PageHide), 0);
        session.initialize().await.unwrap();
        session.initialize().await.unwrap();

        for signal in LifecycleSignal::ALL {
            assert_eq!(events.listener_count(signal), 1);
        }

        session.run(INSERT_KANJI, params!["雨", 8, "N5"]).unwrap();
        events.dispatch(LifecycleSignal::BeforeUnload);
        let saved = open_image(&store.get(DATABASE_KEY).unwrap()).unwrap();
        assert_eq!(row_count(&saved, "kanjis").unwrap(), 1);
    }

    #[test]
    fn test_query_result_json() {
        let result = QueryResult {
            columns: vec!["id".into(), "character".into(), "image".into(), "note".into()],
            rows: vec![vec![
                Value::Integer(1),
                text("字"),
                Value::Blob(vec![0xde, 0xad]),
                Value::Null,
            ]],
        };
        let json = result.to_json();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["character"], "字");
        assert_eq!(json[0]["image"], "dead");
        assert!(json[0]["note"].is_null());
    }
}
