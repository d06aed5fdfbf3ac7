use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use super::models::*;
use crate::errors::BoardError;
use crate::schedule::ProductSnapshot;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|_| BoardError::LockPoisoned.into())
    }
}

pub struct BoardDb {
    conn: Connection,
}

const RELEASE_COLUMNS: &str = "id, product_name, dev_end_date, qa_end_date, release_date, version, release_notes, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, release_id, version, product_name, dev_end_date, qa_end_date, release_date, release_notes, changed_by, change_note, changed_at";

const CUSTOMER_MODULE_SELECT: &str = "
    SELECT cmv.id, cmv.customer_id, cmv.module_id, cmv.version, cmv.image_url, cmv.notes,
           cmv.uploaded_by, cmv.created_at, cmv.updated_at,
           c.name, c.created_at,
           m.name, m.description, m.created_at
    FROM customer_module_versions cmv
    JOIN customers c ON c.id = cmv.customer_id
    JOIN modules m ON m.id = cmv.module_id";

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS releases (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    product_name TEXT NOT NULL UNIQUE,
                    dev_end_date TEXT NOT NULL,
                    qa_end_date TEXT NOT NULL,
                    release_date TEXT NOT NULL,
                    version TEXT,
                    release_notes TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS version_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    release_id INTEGER NOT NULL REFERENCES releases(id) ON DELETE CASCADE,
                    version TEXT NOT NULL,
                    product_name TEXT NOT NULL,
                    dev_end_date TEXT NOT NULL,
                    qa_end_date TEXT NOT NULL,
                    release_date TEXT NOT NULL,
                    release_notes TEXT,
                    changed_by TEXT,
                    change_note TEXT,
                    changed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
                );

                CREATE TABLE IF NOT EXISTS customers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS modules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS customer_module_versions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
                    module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
                    version TEXT,
                    image_url TEXT,
                    notes TEXT,
                    uploaded_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                    UNIQUE(customer_id, module_id)
                );

                CREATE INDEX IF NOT EXISTS idx_version_history_release ON version_history(release_id, changed_at);
                CREATE INDEX IF NOT EXISTS idx_customer_modules_customer ON customer_module_versions(customer_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Releases ──────────────────────────────────────────────────────

    pub fn create_release(&self, draft: &ReleaseDraft) -> Result<Release> {
        self.conn
            .execute(
                "INSERT INTO releases (product_name, dev_end_date, qa_end_date, release_date, version, release_notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    draft.product_name,
                    draft.dev_end_date.to_string(),
                    draft.qa_end_date.to_string(),
                    draft.release_date.to_string(),
                    draft.version,
                    draft.release_notes,
                ],
            )
            .map_err(|e| unique_violation(e, || format!("Product '{}' already exists", draft.product_name)))
            .context("Failed to insert release")?;
        let id = self.conn.last_insert_rowid();
        self.get_release(id)?.context("Release not found after insert")
    }

    pub fn list_releases(&self) -> Result<Vec<Release>> {
        let sql = format!("SELECT {RELEASE_COLUMNS} FROM releases ORDER BY product_name");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_releases")?;
        let rows = stmt
            .query_map([], ReleaseRow::read)
            .context("Failed to query releases")?;
        let mut releases = Vec::new();
        for row in rows {
            let r = row.context("Failed to read release row")?;
            releases.push(r.into_release()?);
        }
        Ok(releases)
    }

    pub fn get_release(&self, id: i64) -> Result<Option<Release>> {
        let sql = format!("SELECT {RELEASE_COLUMNS} FROM releases WHERE id = ?1");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare get_release")?;
        let mut rows = stmt
            .query_map(params![id], ReleaseRow::read)
            .context("Failed to query release")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read release row")?;
                Ok(Some(r.into_release()?))
            }
            None => Ok(None),
        }
    }

    /// Replace a release's schedule. Returns `None` when the id is unknown.
    pub fn update_release(&self, id: i64, draft: &ReleaseDraft) -> Result<Option<Release>> {
        let count = self
            .conn
            .execute(
                "UPDATE releases
                 SET product_name = ?1, dev_end_date = ?2, qa_end_date = ?3, release_date = ?4,
                     version = COALESCE(?5, version), release_notes = ?6, updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    draft.product_name,
                    draft.dev_end_date.to_string(),
                    draft.qa_end_date.to_string(),
                    draft.release_date.to_string(),
                    draft.version,
                    draft.release_notes,
                    id,
                ],
            )
            .map_err(|e| unique_violation(e, || format!("Product '{}' already exists", draft.product_name)))
            .context("Failed to update release")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_release(id)
    }

    /// Update a release and, when the edit carries a note or a new version,
    /// record the resulting state in its version history. Both writes commit
    /// together.
    pub fn update_release_with_history(
        &self,
        id: i64,
        draft: &ReleaseDraft,
        change_note: Option<String>,
        changed_by: Option<String>,
    ) -> Result<Option<(Release, Option<VersionHistoryEntry>)>> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let Some(before) = self.get_release(id)? else {
            return Ok(None);
        };
        let Some(after) = self.update_release(id, draft)? else {
            return Ok(None);
        };

        let version_changed = before.version_or_default() != after.version_or_default();
        let entry = if change_note.is_some() || version_changed {
            let history = HistoryDraft::from_release(&after, change_note, changed_by);
            Some(self.create_history(id, &history)?)
        } else {
            None
        };

        tx.commit().context("Failed to commit release update")?;
        Ok(Some((after, entry)))
    }

    pub fn delete_release(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM releases WHERE id = ?1", params![id])
            .context("Failed to delete release")?;
        Ok(count > 0)
    }

    /// All products as immutable snapshots, ordered by name.
    pub fn list_snapshots(&self) -> Result<Vec<ProductSnapshot>> {
        Ok(self
            .list_releases()?
            .iter()
            .map(ProductSnapshot::from)
            .collect())
    }

    // ── Version history ───────────────────────────────────────────────

    pub fn create_history(&self, release_id: i64, draft: &HistoryDraft) -> Result<VersionHistoryEntry> {
        if self.get_release(release_id)?.is_none() {
            return Err(BoardError::ReleaseNotFound { id: release_id }.into());
        }
        self.conn
            .execute(
                "INSERT INTO version_history
                    (release_id, version, product_name, dev_end_date, qa_end_date, release_date, release_notes, changed_by, change_note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    release_id,
                    draft.version,
                    draft.product_name,
                    draft.dev_end_date.to_string(),
                    draft.qa_end_date.to_string(),
                    draft.release_date.to_string(),
                    draft.release_notes,
                    draft.changed_by,
                    draft.change_note,
                ],
            )
            .context("Failed to insert version history")?;
        let id = self.conn.last_insert_rowid();
        self.get_history(id)?
            .context("Version history not found after insert")
    }

    /// History of one release, newest change first.
    pub fn list_history(&self, release_id: i64) -> Result<Vec<VersionHistoryEntry>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM version_history WHERE release_id = ?1 ORDER BY changed_at DESC, id DESC"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_history")?;
        let rows = stmt
            .query_map(params![release_id], HistoryRow::read)
            .context("Failed to query version history")?;
        let mut entries = Vec::new();
        for row in rows {
            let r = row.context("Failed to read version history row")?;
            entries.push(r.into_entry()?);
        }
        Ok(entries)
    }

    pub fn get_history(&self, id: i64) -> Result<Option<VersionHistoryEntry>> {
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM version_history WHERE id = ?1");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare get_history")?;
        let mut rows = stmt
            .query_map(params![id], HistoryRow::read)
            .context("Failed to query version history")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read version history row")?;
                Ok(Some(r.into_entry()?))
            }
            None => Ok(None),
        }
    }

    pub fn update_history(&self, id: i64, draft: &HistoryDraft) -> Result<Option<VersionHistoryEntry>> {
        let count = self
            .conn
            .execute(
                "UPDATE version_history
                 SET version = ?1, product_name = ?2, dev_end_date = ?3, qa_end_date = ?4,
                     release_date = ?5, release_notes = ?6, change_note = ?7,
                     changed_by = COALESCE(?8, changed_by)
                 WHERE id = ?9",
                params![
                    draft.version,
                    draft.product_name,
                    draft.dev_end_date.to_string(),
                    draft.qa_end_date.to_string(),
                    draft.release_date.to_string(),
                    draft.release_notes,
                    draft.change_note,
                    draft.changed_by,
                    id,
                ],
            )
            .context("Failed to update version history")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_history(id)
    }

    pub fn delete_history(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM version_history WHERE id = ?1", params![id])
            .context("Failed to delete version history")?;
        Ok(count > 0)
    }

    // ── Customers & modules ───────────────────────────────────────────

    pub fn create_customer(&self, name: &str) -> Result<Customer> {
        self.conn
            .execute("INSERT INTO customers (name) VALUES (?1)", params![name])
            .context("Failed to insert customer")?;
        let id = self.conn.last_insert_rowid();
        self.get_customer(id)?
            .context("Customer not found after insert")
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM customers ORDER BY name, id")
            .context("Failed to prepare list_customers")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query customers")?;
        let mut customers = Vec::new();
        for row in rows {
            customers.push(row.context("Failed to read customer row")?);
        }
        Ok(customers)
    }

    pub fn get_customer(&self, id: i64) -> Result<Option<Customer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM customers WHERE id = ?1")
            .context("Failed to prepare get_customer")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query customer")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read customer row")?)),
            None => Ok(None),
        }
    }

    pub fn create_module(&self, name: &str, description: Option<&str>) -> Result<Module> {
        self.conn
            .execute(
                "INSERT INTO modules (name, description) VALUES (?1, ?2)",
                params![name, description],
            )
            .context("Failed to insert module")?;
        let id = self.conn.last_insert_rowid();
        self.get_module(id)?.context("Module not found after insert")
    }

    pub fn list_modules(&self) -> Result<Vec<Module>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM modules ORDER BY name, id")
            .context("Failed to prepare list_modules")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Module {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("Failed to query modules")?;
        let mut modules = Vec::new();
        for row in rows {
            modules.push(row.context("Failed to read module row")?);
        }
        Ok(modules)
    }

    pub fn get_module(&self, id: i64) -> Result<Option<Module>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM modules WHERE id = ?1")
            .context("Failed to prepare get_module")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Module {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("Failed to query module")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read module row")?)),
            None => Ok(None),
        }
    }

    // ── Customer module versions ──────────────────────────────────────

    /// Insert or replace the record for a (customer, module) pair.
    pub fn upsert_customer_module(
        &self,
        customer_id: i64,
        module_id: i64,
        draft: &CustomerModuleDraft,
    ) -> Result<CustomerModule> {
        if self.get_customer(customer_id)?.is_none() {
            return Err(BoardError::Validation(format!("Customer {} does not exist", customer_id)).into());
        }
        if self.get_module(module_id)?.is_none() {
            return Err(BoardError::Validation(format!("Module {} does not exist", module_id)).into());
        }

        self.conn
            .execute(
                "INSERT INTO customer_module_versions (customer_id, module_id, version, image_url, notes, uploaded_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(customer_id, module_id) DO UPDATE SET
                    version = excluded.version,
                    image_url = excluded.image_url,
                    notes = excluded.notes,
                    uploaded_by = excluded.uploaded_by,
                    updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')",
                params![
                    customer_id,
                    module_id,
                    draft.version,
                    draft.image_url,
                    draft.notes,
                    draft.uploaded_by,
                ],
            )
            .context("Failed to upsert customer module")?;

        let sql = format!("{CUSTOMER_MODULE_SELECT} WHERE cmv.customer_id = ?1 AND cmv.module_id = ?2");
        self.conn
            .query_row(&sql, params![customer_id, module_id], read_customer_module)
            .context("Customer module not found after upsert")
    }

    /// Joined records, newest first, optionally for a single customer.
    pub fn list_customer_modules(&self, customer_id: Option<i64>) -> Result<Vec<CustomerModule>> {
        let sql = format!(
            "{CUSTOMER_MODULE_SELECT} WHERE (?1 IS NULL OR cmv.customer_id = ?1) ORDER BY cmv.created_at DESC, cmv.id DESC"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_customer_modules")?;
        let rows = stmt
            .query_map(params![customer_id], read_customer_module)
            .context("Failed to query customer modules")?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read customer module row")?);
        }
        Ok(records)
    }

    pub fn get_customer_module(&self, id: i64) -> Result<Option<CustomerModule>> {
        let sql = format!("{CUSTOMER_MODULE_SELECT} WHERE cmv.id = ?1");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare get_customer_module")?;
        let mut rows = stmt
            .query_map(params![id], read_customer_module)
            .context("Failed to query customer module")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read customer module row")?)),
            None => Ok(None),
        }
    }

    pub fn update_customer_module(
        &self,
        id: i64,
        draft: &CustomerModuleDraft,
    ) -> Result<Option<CustomerModule>> {
        let count = self
            .conn
            .execute(
                "UPDATE customer_module_versions
                 SET version = ?1, image_url = ?2, notes = ?3, uploaded_by = ?4,
                     updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?5",
                params![
                    draft.version,
                    draft.image_url,
                    draft.notes,
                    draft.uploaded_by,
                    id,
                ],
            )
            .context("Failed to update customer module")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_customer_module(id)
    }

    pub fn delete_customer_module(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM customer_module_versions WHERE id = ?1",
                params![id],
            )
            .context("Failed to delete customer module")?;
        Ok(count > 0)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Turn a UNIQUE constraint failure into a `BoardError::Conflict`.
fn unique_violation(err: rusqlite::Error, message: impl FnOnce() -> String) -> anyhow::Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            BoardError::Conflict(message()).into()
        }
        _ => err.into(),
    }
}

/// Intermediate row struct for releases before the date strings are parsed.
struct ReleaseRow {
    id: i64,
    product_name: String,
    dev_end_date: String,
    qa_end_date: String,
    release_date: String,
    version: Option<String>,
    release_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ReleaseRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_name: row.get(1)?,
            dev_end_date: row.get(2)?,
            qa_end_date: row.get(3)?,
            release_date: row.get(4)?,
            version: row.get(5)?,
            release_notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_release(self) -> Result<Release> {
        let (dev_end_date, qa_end_date, release_date) = parse_schedule(
            Some(&self.dev_end_date),
            Some(&self.qa_end_date),
            Some(&self.release_date),
        )
        .with_context(|| format!("Failed to parse dates of release {}", self.id))?;

        Ok(Release {
            id: self.id,
            product_name: self.product_name,
            dev_end_date,
            qa_end_date,
            release_date,
            version: self.version,
            release_notes: self.release_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for version_history.
struct HistoryRow {
    id: i64,
    release_id: i64,
    version: String,
    product_name: String,
    dev_end_date: String,
    qa_end_date: String,
    release_date: String,
    release_notes: Option<String>,
    changed_by: Option<String>,
    change_note: Option<String>,
    changed_at: String,
}

impl HistoryRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            release_id: row.get(1)?,
            version: row.get(2)?,
            product_name: row.get(3)?,
            dev_end_date: row.get(4)?,
            qa_end_date: row.get(5)?,
            release_date: row.get(6)?,
            release_notes: row.get(7)?,
            changed_by: row.get(8)?,
            change_note: row.get(9)?,
            changed_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<VersionHistoryEntry> {
        let (dev_end_date, qa_end_date, release_date) = parse_schedule(
            Some(&self.dev_end_date),
            Some(&self.qa_end_date),
            Some(&self.release_date),
        )
        .with_context(|| format!("Failed to parse dates of version history {}", self.id))?;

        Ok(VersionHistoryEntry {
            id: self.id,
            release_id: self.release_id,
            version: self.version,
            product_name: self.product_name,
            dev_end_date,
            qa_end_date,
            release_date,
            release_notes: self.release_notes,
            changed_by: self.changed_by,
            change_note: self.change_note,
            changed_at: self.changed_at,
        })
    }
}

fn read_customer_module(row: &Row<'_>) -> rusqlite::Result<CustomerModule> {
    let customer_id: i64 = row.get(1)?;
    let module_id: i64 = row.get(2)?;
    Ok(CustomerModule {
        id: row.get(0)?,
        customer_id,
        module_id,
        version: row.get(3)?,
        image_url: row.get(4)?,
        notes: row.get(5)?,
        uploaded_by: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        customer: Customer {
            id: customer_id,
            name: row.get(9)?,
            created_at: row.get(10)?,
        },
        module: Module {
            id: module_id,
            name: row.get(11)?,
            description: row.get(12)?,
            created_at: row.get(13)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn draft(name: &str) -> ReleaseDraft {
        ReleaseDraft {
            product_name: name.to_string(),
            dev_end_date: d(2024, 1, 1),
            qa_end_date: d(2024, 2, 1),
            release_date: d(2024, 3, 1),
            version: None,
            release_notes: None,
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let tables: Vec<String> = {
            let mut stmt = db
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for table in [
            "customer_module_versions",
            "customers",
            "modules",
            "releases",
            "version_history",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("board.db");
        BoardDb::new(&path)?.create_release(&draft("Persisted"))?;
        let reopened = BoardDb::new(&path)?;
        assert_eq!(reopened.list_releases()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_create_and_get_release() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let mut input = draft("Viewer");
        input.version = Some("2.0.0".into());
        input.release_notes = Some("1. New UI".into());
        let release = db.create_release(&input)?;

        assert!(release.id > 0);
        assert_eq!(release.product_name, "Viewer");
        assert_eq!(release.qa_end_date, d(2024, 2, 1));
        assert_eq!(release.version.as_deref(), Some("2.0.0"));

        let fetched = db.get_release(release.id)?.unwrap();
        assert_eq!(fetched, release);
        assert!(db.get_release(999)?.is_none());
        Ok(())
    }

    #[test]
    fn test_list_releases_ordered_by_name() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_release(&draft("Zeta"))?;
        db.create_release(&draft("Alpha"))?;
        db.create_release(&draft("Mid"))?;

        let names: Vec<_> = db
            .list_snapshots()?
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_product_name_is_conflict() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_release(&draft("Viewer"))?;
        let err = db.create_release(&draft("Viewer")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::Conflict(_))
        ));
        Ok(())
    }

    #[test]
    fn test_update_release_keeps_version_when_absent() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let mut input = draft("Viewer");
        input.version = Some("1.2.0".into());
        let release = db.create_release(&input)?;

        let mut edit = draft("Viewer");
        edit.qa_end_date = d(2024, 2, 15);
        let updated = db.update_release(release.id, &edit)?.unwrap();
        assert_eq!(updated.qa_end_date, d(2024, 2, 15));
        assert_eq!(updated.version.as_deref(), Some("1.2.0"));

        assert!(db.update_release(999, &edit)?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_release_with_history_records_on_note() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;

        // No note, same version: nothing recorded.
        let (_, entry) = db
            .update_release_with_history(release.id, &draft("Viewer"), None, None)?
            .unwrap();
        assert!(entry.is_none());

        let (updated, entry) = db
            .update_release_with_history(
                release.id,
                &draft("Viewer"),
                Some("QA slipped".into()),
                Some("pm".into()),
            )?
            .unwrap();
        let entry = entry.unwrap();
        assert_eq!(entry.release_id, updated.id);
        assert_eq!(entry.version, "1.0.0");
        assert_eq!(entry.change_note.as_deref(), Some("QA slipped"));
        assert_eq!(entry.changed_by.as_deref(), Some("pm"));
        Ok(())
    }

    #[test]
    fn test_update_release_with_history_records_on_version_change() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;

        let mut edit = draft("Viewer");
        edit.version = Some("1.1.0".into());
        let (_, entry) = db
            .update_release_with_history(release.id, &edit, None, None)?
            .unwrap();
        assert_eq!(entry.unwrap().version, "1.1.0");

        assert!(db
            .update_release_with_history(999, &edit, None, None)?
            .is_none());
        Ok(())
    }

    #[test]
    fn test_delete_release_cascades_history() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;
        let history = HistoryDraft::from_release(&release, Some("init".into()), None);
        db.create_history(release.id, &history)?;
        assert_eq!(db.list_history(release.id)?.len(), 1);

        assert!(db.delete_release(release.id)?);
        assert!(!db.delete_release(release.id)?);
        assert!(db.list_history(release.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_history_newest_first() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;
        for note in ["first", "second", "third"] {
            let history = HistoryDraft::from_release(&release, Some(note.into()), None);
            db.create_history(release.id, &history)?;
        }
        let notes: Vec<_> = db
            .list_history(release.id)?
            .into_iter()
            .map(|e| e.change_note.unwrap())
            .collect();
        assert_eq!(notes, vec!["third", "second", "first"]);
        Ok(())
    }

    #[test]
    fn test_history_for_missing_release() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;
        let history = HistoryDraft::from_release(&release, None, None);
        let err = db.create_history(42, &history).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::ReleaseNotFound { id: 42 })
        ));
        Ok(())
    }

    #[test]
    fn test_update_and_delete_history() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let release = db.create_release(&draft("Viewer"))?;
        let mut history = HistoryDraft::from_release(&release, Some("a".into()), Some("qa".into()));
        let entry = db.create_history(release.id, &history)?;

        history.version = "1.0.1".into();
        history.change_note = None;
        history.changed_by = None;
        let updated = db.update_history(entry.id, &history)?.unwrap();
        assert_eq!(updated.version, "1.0.1");
        assert_eq!(updated.change_note, None);
        assert_eq!(updated.changed_by.as_deref(), Some("qa"));

        assert!(db.update_history(999, &history)?.is_none());
        assert!(db.delete_history(entry.id)?);
        assert!(db.get_history(entry.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_customers_and_modules_ordered_by_name() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_customer("Umbrella")?;
        db.create_customer("Acme")?;
        db.create_module("Scheduler", Some("Cron jobs"))?;
        db.create_module("Auth", None)?;

        let customers: Vec<_> = db.list_customers()?.into_iter().map(|c| c.name).collect();
        assert_eq!(customers, vec!["Acme", "Umbrella"]);

        let modules = db.list_modules()?;
        assert_eq!(modules[0].name, "Auth");
        assert_eq!(modules[0].description, None);
        assert_eq!(modules[1].description.as_deref(), Some("Cron jobs"));
        Ok(())
    }

    #[test]
    fn test_upsert_customer_module_replaces_pair() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let acme = db.create_customer("Acme")?;
        let auth = db.create_module("Auth", None)?;

        let first = db.upsert_customer_module(
            acme.id,
            auth.id,
            &CustomerModuleDraft::new(Some("1.0".into()), None, None, None),
        )?;
        let second = db.upsert_customer_module(
            acme.id,
            auth.id,
            &CustomerModuleDraft::new(Some("1.1".into()), None, Some("hotfix".into()), None),
        )?;

        assert_eq!(first.id, second.id);
        assert_eq!(second.version.as_deref(), Some("1.1"));
        assert_eq!(second.notes.as_deref(), Some("hotfix"));
        assert_eq!(second.customer.name, "Acme");
        assert_eq!(second.module.name, "Auth");
        assert_eq!(db.list_customer_modules(None)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_upsert_customer_module_rejects_unknown_parent() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let auth = db.create_module("Auth", None)?;
        let err = db
            .upsert_customer_module(77, auth.id, &CustomerModuleDraft::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_list_customer_modules_filters_by_customer() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let acme = db.create_customer("Acme")?;
        let globex = db.create_customer("Globex")?;
        let auth = db.create_module("Auth", None)?;
        let billing = db.create_module("Billing", None)?;

        db.upsert_customer_module(acme.id, auth.id, &CustomerModuleDraft::default())?;
        db.upsert_customer_module(acme.id, billing.id, &CustomerModuleDraft::default())?;
        db.upsert_customer_module(globex.id, auth.id, &CustomerModuleDraft::default())?;

        let acme_records = db.list_customer_modules(Some(acme.id))?;
        assert_eq!(acme_records.len(), 2);
        assert!(acme_records.iter().all(|r| r.customer_id == acme.id));
        // Newest first.
        assert_eq!(acme_records[0].module.name, "Billing");

        assert_eq!(db.list_customer_modules(None)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_update_and_delete_customer_module() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let acme = db.create_customer("Acme")?;
        let auth = db.create_module("Auth", None)?;
        let record = db.upsert_customer_module(acme.id, auth.id, &CustomerModuleDraft::default())?;

        let edit = CustomerModuleDraft::new(
            Some("2.0".into()),
            Some("http://localhost/uploads/a.png".into()),
            None,
            Some("ops".into()),
        );
        let updated = db.update_customer_module(record.id, &edit)?.unwrap();
        assert_eq!(updated.version.as_deref(), Some("2.0"));
        assert_eq!(updated.uploaded_by.as_deref(), Some("ops"));
        assert!(db.update_customer_module(999, &edit)?.is_none());

        assert!(db.delete_customer_module(record.id)?);
        assert!(db.get_customer_module(record.id)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(BoardDb::new_in_memory()?);
        let created = handle
            .call(|db| db.create_release(&draft("Async")))
            .await?;
        let listed = handle.call(|db| db.list_releases()).await?;
        assert_eq!(listed, vec![created]);
        assert_eq!(handle.lock_sync()?.list_releases()?.len(), 1);
        Ok(())
    }
}
