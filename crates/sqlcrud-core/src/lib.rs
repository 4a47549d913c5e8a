//! Core types and traits for SQLCrud.
//!
//! `sqlcrud-core` is the **foundation layer** shared by the query engine,
//! the drivers and the derive macro.
//!
//! # Role In The Architecture
//!
//! - **Values and rows**: [`Value`], [`Row`] and [`FromValue`] carry data
//!   between expressions, bindings and decoded results.
//! - **Record reflection**: [`Record`], [`FieldInfo`], [`Field`] and
//!   [`RecordType`] describe record types statically, so typed field
//!   handles resolve to column names without touching an instance.
//! - **Delegates**: [`GenerationDelegate`], [`ExecutionDelegate`] and
//!   [`DatabaseConfiguration`] are what a driver implements.
//! - **Errors**: [`Error`] and the per-family error structs.

pub mod delegate;
pub mod error;
pub mod identifiers;
pub mod record;
pub mod row;
pub mod value;

pub use delegate::{
    Binding, ColumnDef, DatabaseConfiguration, ExecutionDelegate, GenerationDelegate,
    TableCreatePolicy, TableStructure, describe_bindings,
};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, DecodeError, DecodeErrorKind, Error,
    GenerationError, GenerationErrorKind, QueryError, QueryErrorKind, Result, SchemaError,
    SchemaErrorKind, TransactionError, TransactionErrorKind, TypeError,
};
pub use identifiers::{is_valid_identifier, quote_ident, quote_ident_mysql, validate_identifier};
pub use record::{
    Collection, CollectionSource, Field, FieldInfo, FieldKind, FieldRef, KeyKind, KeyType, Record,
    RecordReader, RecordType, decode_row, fields_of, resolve_field_reference, validate_record,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::{Decimal, Timestamp, Value};
