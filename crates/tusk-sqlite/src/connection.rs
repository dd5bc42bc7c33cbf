//! SQLite connection.
//!
//! A [`SqliteConnection`] owns one `sqlite3` handle behind a mutex and
//! implements the synchronous [`Connection`] trait from tusk-core. Every
//! statement is prepared, bound, stepped and finalized inside one call.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::types;
use libsqlite3_sys as ffi;
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tusk_core::{
    ColumnInfo, Connection, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, Row, Value,
};

// ==================== Configuration ====================

/// How to open a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// File path, or `:memory:`.
    pub path: String,
    pub read_only: bool,
    /// Milliseconds to wait on a locked database. Zero disables waiting.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// A database file, created on first open.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    /// Open an existing database without write access.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    fn open_flags(&self) -> c_int {
        if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        }
    }
}

// ==================== Connection ====================

struct Handle(*mut ffi::sqlite3);

// SAFETY: the handle is only used while the connection mutex is held
unsafe impl Send for Handle {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    handle: Mutex<Handle>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let path = CString::new(config.path.as_str())
            .map_err(|_| connect_error("database path contains a NUL byte".to_string()))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: path is NUL-terminated and db is a valid out pointer
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, config.open_flags(), ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                let (_, message) = last_error(db);
                // SAFETY: a failed open still hands back a handle to close
                unsafe { ffi::sqlite3_close(db) };
                message
            };
            return Err(connect_error(format!("cannot open {}: {message}", config.path)));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db was just opened
            unsafe { ffi::sqlite3_busy_timeout(db, ms) };
        }

        tracing::debug!(path = %config.path, read_only = config.read_only, "Opened SQLite database");
        Ok(Self {
            handle: Mutex::new(Handle(db)),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Handle> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        let db = self.lock();
        // SAFETY: the handle stays open until drop
        u64::try_from(unsafe { ffi::sqlite3_changes(db.0) }).unwrap_or(0)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        let db = self.lock();
        // SAFETY: the handle stays open until drop
        unsafe { ffi::sqlite3_last_insert_rowid(db.0) }
    }

    /// Run a write and report (changed rows, last rowid).
    fn write(&self, sql: &str, params: &[Value]) -> Result<(u64, i64)> {
        let db = self.lock();
        let mut stmt = Prepared::new(&db, sql, params)?;
        stmt.step()?;
        // SAFETY: the handle stays open until drop
        let (changes, rowid) = unsafe { (ffi::sqlite3_changes(db.0), ffi::sqlite3_last_insert_rowid(db.0)) };
        Ok((u64::try_from(changes).unwrap_or(0), rowid))
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let db = self.lock();
        let mut stmt = Prepared::new(&db, sql, params)?;
        let columns = Arc::new(stmt.columns());
        let mut rows = Vec::new();
        while stmt.step()? {
            rows.push(Row::with_columns(Arc::clone(&columns), stmt.values()));
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.write(sql, params).map(|(changes, _)| changes)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.write(sql, params).map(|(_, rowid)| rowid)
    }

    fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.lock();
        let text = CString::new(sql).map_err(|_| nul_error(sql))?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();
        // SAFETY: text is NUL-terminated and errmsg is a valid out pointer
        let rc = unsafe { ffi::sqlite3_exec(db.0, text.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            error_string(rc)
        } else {
            // SAFETY: errmsg was allocated by SQLite and is freed once read
            unsafe {
                let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                message
            }
        };
        Err(query_error(kind_of(rc), sql, message))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let db = self.lock();
        if !db.0.is_null() {
            // SAFETY: every statement is finalized before its call returns
            unsafe { ffi::sqlite3_close(db.0) };
        }
    }
}

// ==================== Statements ====================

/// A prepared statement, finalized on drop.
struct Prepared<'c> {
    db: &'c Handle,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &'c str,
}

impl<'c> Prepared<'c> {
    fn new(db: &'c Handle, sql: &'c str, params: &[Value]) -> Result<Self> {
        let text = CString::new(sql).map_err(|_| nul_error(sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: text outlives the call and stmt is a valid out pointer
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db.0, text.as_ptr(), text.as_bytes().len() as c_int, &mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            let (code, message) = last_error(db.0);
            let kind = match kind_of(code) {
                QueryErrorKind::Database if message.contains("no such") => QueryErrorKind::NotFound,
                QueryErrorKind::Database => QueryErrorKind::Syntax,
                other => other,
            };
            return Err(query_error(kind, sql, message));
        }

        let prepared = Self { db, stmt, sql };
        for (at, value) in params.iter().enumerate() {
            // SAFETY: stmt is prepared and parameter indexes are 1-based
            let rc = unsafe { types::bind_value(stmt, (at + 1) as c_int, value) };
            if rc != ffi::SQLITE_OK {
                let (_, reason) = last_error(db.0);
                let message = format!("cannot bind parameter {} ({}): {reason}", at + 1, value.type_name());
                return Err(query_error(QueryErrorKind::Database, sql, message));
            }
        }
        Ok(prepared)
    }

    fn columns(&self) -> ColumnInfo {
        // SAFETY: stmt is prepared
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        let names = (0..count)
            // SAFETY: at is below the column count
            .map(|at| unsafe { types::column_name(self.stmt, at) }.unwrap_or_else(|| format!("col{at}")))
            .collect();
        ColumnInfo::new(names)
    }

    /// Advance the statement. `true` means a row is ready to read.
    fn step(&mut self) -> Result<bool> {
        // SAFETY: stmt is prepared
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => {
                let (code, message) = last_error(self.db.0);
                Err(query_error(kind_of(code), self.sql, message))
            }
        }
    }

    fn values(&self) -> Vec<Value> {
        // SAFETY: only called after step returned a row
        let count = unsafe { ffi::sqlite3_data_count(self.stmt) };
        (0..count)
            // SAFETY: at is below the data count of the current row
            .map(|at| unsafe { types::read_column(self.stmt, at) })
            .collect()
    }
}

impl Drop for Prepared<'_> {
    fn drop(&mut self) {
        // SAFETY: stmt came from sqlite3_prepare_v2 and is finalized once
        unsafe { ffi::sqlite3_finalize(self.stmt) };
    }
}

// ==================== Errors ====================

fn connect_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message,
        source: None,
    })
}

fn query_error(kind: QueryErrorKind, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn nul_error(sql: &str) -> Error {
    query_error(QueryErrorKind::Syntax, sql, "SQL contains a NUL byte".to_string())
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string for any code
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)) }
        .to_string_lossy()
        .into_owned()
}

fn last_error(db: *mut ffi::sqlite3) -> (c_int, String) {
    // SAFETY: db is an open handle
    unsafe {
        let message = CStr::from_ptr(ffi::sqlite3_errmsg(db)).to_string_lossy().into_owned();
        (ffi::sqlite3_errcode(db), message)
    }
}

fn kind_of(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}
