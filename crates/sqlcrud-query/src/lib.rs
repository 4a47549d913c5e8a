//! Query construction, SQL generation and result merging for SQLCrud.
//!
//! `sqlcrud-query` is the **engine layer** between typed record
//! definitions and a driver.
//!
//! # Role In The Architecture
//!
//! - **Expressions**: [`Expr`] and [`FieldExpr`] build WHERE clauses over
//!   typed field handles; rendering binds literals through the driver's
//!   [`GenerationDelegate`](sqlcrud_core::GenerationDelegate).
//! - **Builder**: [`Database::table`] starts a [`Query`]; filters, joins,
//!   orderings and limits are replayed into a [`QueryState`] by each
//!   terminal.
//! - **Generation**: [`generate`] renders the state into one statement per
//!   table, joining only the tables the WHERE clause touches.
//! - **Merge**: [`SelectIter`] steps the root statement and fills
//!   collection fields from the buffered joined statements.
//! - **Dialects**: [`StandardGenDelegate`] covers SQLite, PostgreSQL and
//!   MySQL placeholder, quoting and DDL rules.

pub mod database;
pub mod dialect;
pub mod expr;
pub mod generate;
pub mod join;
pub mod merge;
pub mod query;
pub mod state;

#[cfg(test)]
mod testing;

pub use database::Database;
pub use dialect::{Dialect, StandardGenDelegate};
pub use expr::{BinaryOp, Expr, FieldExpr, LazyExpr};
pub use generate::generate;
pub use join::PIVOT_KEY_COLUMN;
pub use merge::{MergeContext, SelectIter};
pub use query::{Query, Select};
pub use state::{
    ColumnFilter, Command, JoinData, Limit, Ordering, PivotJoin, QueryState, Statement,
    TableDescriptor,
};
