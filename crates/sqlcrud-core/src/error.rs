//! Error types for SQLCrud operations.

use std::fmt;

/// The primary error type for all SQLCrud operations.
#[derive(Debug)]
pub enum Error {
    /// SQL generation failed before anything reached the database
    Generation(GenerationError),
    /// Statement preparation or execution errors
    Query(QueryError),
    /// Value conversion errors
    Type(TypeError),
    /// Record hydration errors
    Decode(DecodeError),
    /// Connection-related errors (open, close)
    Connection(ConnectionError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Schema/DDL errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The query reached the generator without a command
    CommandUnset,
    /// No table was registered
    NoTables,
    /// An expression referenced a record type with no registered table
    UnknownType,
    /// A referenced table was registered without join data
    JoinWithoutClause,
    /// Orderings were declared where no terminal could drain them
    OrderingsNotConsumed,
    /// A field reference did not resolve to a column
    UnresolvedField,
    /// The same record type was registered twice
    DuplicateTable,
    /// A stage is not valid for the requested command
    InvalidStage,
    /// The generation delegate cannot bind this value
    UnsupportedValue,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied or read-only database
    Permission,
    /// Database busy or locked
    Busy,
    /// Parameter binding failed
    Bind,
    /// The statement was used in an invalid state
    Misuse,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub record: &'static str,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The row has no column for a declared field
    MissingColumn,
    /// A collection field has no registered join
    MissingJoin,
    /// The root row cannot produce its join key
    MissingKey,
    /// The field kind cannot be decoded from a row
    UnsupportedKind,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Failed to close the database
    Close,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN failed
    Begin,
    /// COMMIT failed
    Commit,
    /// The body failed and so did the ROLLBACK that followed
    RollbackFailed,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Identifier is not a valid table or column name
    InvalidIdentifier,
    /// No primary key column could be determined
    MissingPrimaryKey,
    /// Column not found
    ColumnNotFound,
    /// Invalid schema definition
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a generation error.
    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Error::Generation(GenerationError {
            kind,
            message: message.into(),
        })
    }

    /// Build a decode error for one field of a record.
    pub fn decode(
        kind: DecodeErrorKind,
        record: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Decode(DecodeError {
            kind,
            record,
            field: field.into(),
            message: message.into(),
        })
    }

    /// Build a schema error.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
        })
    }

    /// Generation error kind, if this is one.
    pub fn generation_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            Error::Generation(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Decode error kind, if this is one.
    pub fn decode_kind(&self) -> Option<DecodeErrorKind> {
        match self {
            Error::Decode(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The SQL that failed, for query errors that carry it.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(e) => e.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this a unique/foreign key/check violation?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Generation(e) => write!(f, "SQL generation error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} (in `{}`)", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.record, self.field, self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<GenerationError> for Error {
    fn from(err: GenerationError) -> Self {
        Error::Generation(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_exposes_kind() {
        let err = Error::generation(GenerationErrorKind::NoTables, "no tables registered");
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::NoTables));
        assert_eq!(err.decode_kind(), None);
        assert_eq!(err.to_string(), "SQL generation error: no tables registered");
    }

    #[test]
    fn query_error_display_includes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(err.to_string().contains("in `SELEC 1`"));
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn constraint_violation_detected() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            message: "UNIQUE constraint failed".to_string(),
            source: None,
        });
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn decode_error_names_record_and_field() {
        let err = Error::decode(
            DecodeErrorKind::MissingJoin,
            "parent",
            "children",
            "no join registered",
        );
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::MissingJoin));
        assert_eq!(err.to_string(), "Decode error: parent.children: no join registered");
    }

    #[test]
    fn type_error_with_column() {
        let err = TypeError {
            expected: "i64",
            actual: "TEXT".to_string(),
            column: Some("age".to_string()),
            rust_type: None,
        };
        assert_eq!(err.to_string(), "expected i64 for column 'age', found TEXT");
    }
}
