//! SQLite connection and prepared statements.
//!
//! [`SqliteConnection`] is the [`DatabaseConfiguration`] for SQLite: it
//! generates SQL through [`StandardGenDelegate`] with the SQLite dialect and
//! executes it through [`SqliteStatement`].
//!
//! ```rust,ignore
//! use sqlcrud_query::Database;
//! use sqlcrud_sqlite::SqliteConnection;
//!
//! let db = Database::new(SqliteConnection::open_memory()?);
//! db.sql("CREATE TABLE t (id INTEGER)", &[])?;
//! ```

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)] // Clearer for error handling

use crate::ffi;
use crate::types;
use sqlcrud_core::{
    Binding, ColumnInfo, ConfigError, ConnectionError, ConnectionErrorKind, DatabaseConfiguration,
    Error, ExecutionDelegate, QueryError, QueryErrorKind, Result, Row, TypeError,
    describe_bindings,
};
use sqlcrud_query::{Dialect, StandardGenDelegate};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// A connection to a SQLite database.
///
/// Statements borrow the connection, so it outlives every statement
/// prepared on it. The handle is not shared between threads.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    path: String,
}

// SAFETY: the handle is owned by this value and only used through `&self`
// on one thread at a time; the type is deliberately not `Sync`.
unsafe impl Send for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path))]
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Config(ConfigError {
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;
        let busy_timeout = c_int::try_from(config.busy_timeout_ms).map_err(|e| {
            Error::Config(ConfigError {
                message: format!(
                    "busy_timeout_ms {} exceeds the maximum of {} ms",
                    config.busy_timeout_ms,
                    c_int::MAX
                ),
                source: Some(Box::new(e)),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid even on failure and must still be closed
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if busy_timeout > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, busy_timeout);
            }
        }

        tracing::debug!(version = ffi::version(), "opened sqlite database");
        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL directly without preparing. Accepts several
    /// `;`-separated statements.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut message: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut message)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if !message.is_null() {
                // SAFETY: message was allocated by sqlite3_exec and is freed here
                unsafe {
                    let msg = CStr::from_ptr(message).to_string_lossy().into_owned();
                    ffi::sqlite3_free(message.cast());
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };
            return Err(query_error(rc, sql, msg));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(self.db) }
    }

    /// Prepare `sql` as a reusable statement.
    pub fn prepare(&self, sql: &str) -> Result<SqliteStatement<'_>> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(self.last_error(rc, sql));
        }
        if stmt.is_null() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: "statement is empty".to_string(),
                source: None,
            }));
        }

        // SAFETY: stmt is a freshly prepared statement
        let columns = unsafe {
            let count = ffi::sqlite3_column_count(stmt);
            (0..count)
                .map(|i| types::column_name(stmt, i).unwrap_or_else(|| format!("column{}", i)))
                .collect()
        };

        tracing::debug!(sql = %sql, "prepared statement");
        Ok(SqliteStatement {
            conn: self,
            stmt,
            sql: sql.to_string(),
            columns: Arc::new(ColumnInfo::new(columns)),
            state: StepState::Ready,
        })
    }

    fn last_error(&self, rc: c_int, sql: &str) -> Error {
        // SAFETY: db is valid
        let msg = unsafe { errmsg(self.db) };
        query_error(rc, sql, msg)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        // SAFETY: db is valid; close_v2 defers until statements are finalized
        unsafe {
            ffi::sqlite3_close_v2(self.db);
        }
    }
}

impl DatabaseConfiguration for SqliteConnection {
    type Generation = StandardGenDelegate;
    type Execution<'a> = SqliteStatement<'a>;

    fn generation_delegate(&self) -> StandardGenDelegate {
        StandardGenDelegate::new(Dialect::Sqlite)
    }

    fn execution_delegate(&self, sql: &str) -> Result<SqliteStatement<'_>> {
        self.prepare(sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Ready,
    Row,
    Done,
}

/// A prepared statement on a [`SqliteConnection`].
pub struct SqliteStatement<'conn> {
    conn: &'conn SqliteConnection,
    stmt: *mut ffi::sqlite3_stmt,
    sql: String,
    columns: Arc<ColumnInfo>,
    state: StepState,
}

impl std::fmt::Debug for SqliteStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("columns", &self.columns.names())
            .finish_non_exhaustive()
    }
}

impl SqliteStatement<'_> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    fn reset(&mut self) {
        // SAFETY: stmt is valid. The return value repeats the last step
        // error, which was already reported.
        unsafe {
            ffi::sqlite3_reset(self.stmt);
        }
        self.state = StepState::Ready;
    }
}

impl ExecutionDelegate for SqliteStatement<'_> {
    fn bind(&mut self, bindings: &[Binding], skip: usize) -> Result<()> {
        self.reset();
        if skip == 0 {
            // SAFETY: stmt is valid
            unsafe {
                ffi::sqlite3_clear_bindings(self.stmt);
            }
        }
        tracing::trace!(
            sql = %self.sql,
            skip,
            bindings = %describe_bindings(&bindings[skip.min(bindings.len())..]),
            "binding parameters"
        );
        for (position, binding) in bindings.iter().enumerate().skip(skip) {
            let index = position + 1;
            if let Some(v) = types::unsigned_overflow(&binding.value) {
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Bind,
                    sql: Some(self.sql.clone()),
                    message: format!(
                        "Failed to bind parameter {} ({}): u64 value {} exceeds the SQLite INTEGER range (max {})",
                        index,
                        binding.placeholder,
                        v,
                        i64::MAX
                    ),
                    source: None,
                }));
            }
            // SAFETY: stmt is valid
            let rc = unsafe { types::bind_value(self.stmt, index as c_int, &binding.value) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid
                let msg = unsafe { errmsg(self.conn.db) };
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Bind,
                    sql: Some(self.sql.clone()),
                    message: format!(
                        "Failed to bind {} to parameter {} ({}): {}",
                        types::storage_class(&binding.value),
                        index,
                        binding.placeholder,
                        msg
                    ),
                    source: None,
                }));
            }
        }
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        // A finished statement would restart if stepped again.
        if self.state == StepState::Done {
            return Ok(false);
        }
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                self.state = StepState::Row;
                Ok(true)
            }
            ffi::SQLITE_DONE => {
                self.state = StepState::Done;
                Ok(false)
            }
            _ => {
                self.state = StepState::Done;
                Err(self.conn.last_error(rc, &self.sql))
            }
        }
    }

    fn decode_row(&mut self) -> Result<Row> {
        if self.state != StepState::Row {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Misuse,
                sql: Some(self.sql.clone()),
                message: "decode_row called while not positioned on a row".to_string(),
                source: None,
            }));
        }
        let mut values = Vec::with_capacity(self.columns.len());
        for (i, name) in self.columns.names().iter().enumerate() {
            // SAFETY: stmt is valid and positioned on a row
            let value = unsafe { types::read_column(self.stmt, i as c_int) }.map_err(|e| {
                Error::Type(TypeError {
                    expected: "UTF-8 text",
                    actual: format!("TEXT with invalid UTF-8: {}", e.utf8_error()),
                    column: Some(name.clone()),
                    rust_type: Some("String"),
                })
            })?;
            values.push(value);
        }
        Ok(Row::with_columns(Arc::clone(&self.columns), values))
    }
}

impl Drop for SqliteStatement<'_> {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
    }
}

// Helper functions

/// # Safety
///
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: the caller guarantees db is valid; errmsg returns a C string
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        if ptr.is_null() {
            return String::from("unknown error");
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn query_error(rc: c_int, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(rc, &message),
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn error_code_to_kind(code: c_int, message: &str) -> QueryErrorKind {
    // Extended result codes keep the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_MISUSE => QueryErrorKind::Misuse,
        ffi::SQLITE_RANGE => QueryErrorKind::Bind,
        ffi::SQLITE_ERROR if message.starts_with("no such") => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
