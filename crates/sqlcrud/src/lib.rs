//! SQLCrud - typed query building, SQL generation and relationship merging.
//!
//! SQLCrud maps plain structs to tables and lets application code describe
//! selects, counts, inserts, updates and deletes against them:
//!
//! - `#[derive(Record)]` builds a static field table and one typed field
//!   handle per field, with no runtime reflection
//! - a fluent [`Query`] builder renders dialect-specific SQL with positional
//!   bindings
//! - joins fill `Vec<_>` collection fields by running one statement per
//!   joined table and merging the rows by key
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlcrud::prelude::*;
//! use sqlcrud::sqlite::SqliteConnection;
//!
//! #[derive(Record, Debug)]
//! #[crud(table = "authors")]
//! struct Author {
//!     id: i64,
//!     name: String,
//!     books: Vec<Book>,
//! }
//!
//! #[derive(Record, Debug)]
//! struct Book {
//!     #[crud(primary_key)]
//!     isbn: String,
//!     author_id: i64,
//!     title: String,
//! }
//!
//! fn main() -> Result<()> {
//!     let db = Database::new(SqliteConnection::open_memory()?);
//!     db.create::<Author>(TableCreatePolicy::DEFAULT)?;
//!
//!     let authors = db
//!         .table::<Author>()
//!         .filter(Author::NAME.ne(Expr::null()))
//!         .join(Author::BOOKS, Author::ID, Book::AUTHOR_ID)
//!         .order_by(Book::TITLE)
//!         .select()?
//!         .all()?;
//!     Ok(())
//! }
//! ```
//!
//! # Crates
//!
//! - `sqlcrud-core`: values, rows, errors, record reflection, delegate traits
//! - `sqlcrud-query`: expressions, SQL generation, merge engine, [`Database`]
//! - `sqlcrud-macros`: `#[derive(Record)]`
//! - `sqlcrud-sqlite`: the SQLite driver (feature `sqlite`, on by default)
//!
//! Code generated by `#[derive(Record)]` names `sqlcrud_core` directly, so
//! crates deriving it depend on `sqlcrud-core` too.

// Re-export all public types from sub-crates
pub use sqlcrud_core::{
    Binding, ColumnDef, ColumnInfo, DatabaseConfiguration, Decimal, DecodeErrorKind, Error,
    ExecutionDelegate, Field, FieldInfo, FieldKind, FieldRef, FromValue, GenerationDelegate,
    GenerationErrorKind, KeyKind, KeyType, QueryErrorKind, Record, RecordReader, RecordType,
    Result, Row, TableCreatePolicy, TableStructure, Timestamp, TransactionErrorKind, Value,
};
pub use sqlcrud_macros::Record;
pub use sqlcrud_query::{
    Command, Database, Dialect, Expr, FieldExpr, Query, Select, SelectIter, StandardGenDelegate,
    Statement,
};

/// The SQLite driver.
#[cfg(feature = "sqlite")]
pub use sqlcrud_sqlite as sqlite;

/// Open an in-memory SQLite database.
#[cfg(feature = "sqlite")]
pub fn open_memory() -> Result<sqlcrud_sqlite::SqliteDatabase> {
    tracing::debug!("opening in-memory sqlite database");
    sqlcrud_sqlite::open(&sqlcrud_sqlite::SqliteConfig::memory())
}

pub mod prelude {
    pub use crate::{
        // Query building
        Command,
        Database,
        Decimal,
        Error,
        Expr,
        Field,
        FieldExpr,
        // Record reflection (trait and derive share the name)
        Record,
        Result,
        TableCreatePolicy,
        Timestamp,
        Value,
    };
}
