//! SQLite driver for SQLCrud.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate provides a SQLite driver using FFI bindings to libsqlite3
//! (bundled through `libsqlite3-sys`). [`SqliteConnection`] implements
//! `DatabaseConfiguration`, so it plugs straight into
//! `sqlcrud_query::Database`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlcrud_query::Database;
//! use sqlcrud_sqlite::SqliteConnection;
//!
//! let db = Database::new(SqliteConnection::open_memory()?);
//! db.create::<User>(TableCreatePolicy::DEFAULT)?
//!     .insert(&[User { id: 1, name: "Alice".into() }])?;
//! let users = db.table::<User>().filter(User::NAME.eq("Alice")).select()?.all()?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `TinyInt` .. `BigInt`, `Unsigned` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Decimal`, `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Uuid` | BLOB (16 bytes) |
//! | `Timestamp` | INTEGER (microseconds) |
//! | `Null` | NULL |
//!
//! `Unsigned` values above `i64::MAX` fail to bind with `QueryErrorKind::Bind`,
//! and TEXT that is not valid UTF-8 fails to decode with a type error.
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` but not `Sync`. Statements borrow the
//! connection and are finalized before it closes.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteStatement};

/// A [`Database`](sqlcrud_query::Database) backed by SQLite.
pub type SqliteDatabase = sqlcrud_query::Database<SqliteConnection>;

/// Open a database with the given configuration.
pub fn open(config: &SqliteConfig) -> sqlcrud_core::Result<SqliteDatabase> {
    SqliteConnection::open(config).map(sqlcrud_query::Database::new)
}

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
