//! Database facade: query entry point, schema creation, raw SQL and
//! transactions.

use sqlcrud_core::{
    DatabaseConfiguration, Error, Field, GenerationDelegate, Record, RecordType, Result,
    TableCreatePolicy, TableStructure, TransactionError, TransactionErrorKind, Value, decode_row,
    validate_record,
};

use crate::merge::{execute, fetch_all};
use crate::query::Query;
use crate::state::Statement;

/// Entry point wrapping a driver's [`DatabaseConfiguration`].
#[derive(Debug)]
pub struct Database<C> {
    configuration: C,
}

impl<C: DatabaseConfiguration> Database<C> {
    pub fn new(configuration: C) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &C {
        &self.configuration
    }

    /// Start a query rooted at `R`.
    pub fn table<R: Record>(&self) -> Query<'_, C, R> {
        Query::new(self)
    }

    /// Create the table of `R`, plus the tables of its collection fields
    /// unless the policy is shallow.
    pub fn create<R: Record>(&self, policy: TableCreatePolicy) -> Result<Query<'_, C, R>> {
        self.create_table(RecordType::of::<R>(), None, policy)?;
        Ok(self.table())
    }

    /// Like [`create`](Self::create) with an explicit primary key column.
    pub fn create_with_primary_key<R: Record, T>(
        &self,
        primary_key: Field<R, T>,
        policy: TableCreatePolicy,
    ) -> Result<Query<'_, C, R>> {
        self.create_table(RecordType::of::<R>(), Some(primary_key.name()), policy)?;
        Ok(self.table())
    }

    #[tracing::instrument(level = "debug", skip(self, policy), fields(table = record.table_name()))]
    fn create_table(
        &self,
        record: RecordType,
        primary_key: Option<&str>,
        policy: TableCreatePolicy,
    ) -> Result<()> {
        validate_record(record)?;
        let structure = TableStructure::of(record, primary_key, policy)?;
        let mut delegate = self.configuration.generation_delegate();
        for sql in delegate.create_table_statements(&structure, policy)? {
            self.sql(&sql, &[])?;
        }
        Ok(())
    }

    fn statement(&self, sql: &str, values: &[Value]) -> Result<Statement> {
        let mut delegate = self.configuration.generation_delegate();
        for value in values {
            delegate.bind(value.clone())?;
        }
        Ok(Statement {
            sql: sql.to_string(),
            bindings: delegate.take_bindings(),
        })
    }

    /// Run a raw statement. `values` bind to its placeholders in order.
    pub fn sql(&self, sql: &str, values: &[Value]) -> Result<()> {
        tracing::debug!(sql = %sql, bindings = values.len(), "raw statement");
        execute(&self.configuration, &self.statement(sql, values)?)
    }

    /// Run a raw query and decode every row as `R`.
    ///
    /// Rows carry no joined data, so required collection fields fail to
    /// decode.
    pub fn sql_select<R: Record>(&self, sql: &str, values: &[Value]) -> Result<Vec<R>> {
        tracing::debug!(sql = %sql, bindings = values.len(), "raw query");
        fetch_all(&self.configuration, &self.statement(sql, values)?)?
            .iter()
            .map(decode_row::<R>)
            .collect()
    }

    /// Run `body` inside `BEGIN`/`COMMIT`.
    ///
    /// When `body` fails the transaction is rolled back and the body's error
    /// is returned. A failed rollback is reported with both messages.
    pub fn transaction<T>(&self, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.sql("BEGIN", &[]).map_err(|e| {
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Begin,
                message: e.to_string(),
            })
        })?;
        match body(self) {
            Ok(value) => {
                self.sql("COMMIT", &[]).map_err(|e| {
                    Error::Transaction(TransactionError {
                        kind: TransactionErrorKind::Commit,
                        message: e.to_string(),
                    })
                })?;
                Ok(value)
            }
            Err(error) => {
                tracing::debug!(error = %error, "rolling back transaction");
                match self.sql("ROLLBACK", &[]) {
                    Ok(()) => Err(error),
                    Err(rollback) => Err(Error::Transaction(TransactionError {
                        kind: TransactionErrorKind::RollbackFailed,
                        message: format!("{error}; rollback failed: {rollback}"),
                    })),
                }
            }
        }
    }
}
