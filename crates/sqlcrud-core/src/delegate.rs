//! The two driver-facing interfaces and the schema shapes they consume.
//!
//! A [`GenerationDelegate`] owns dialect policy: placeholder tokens,
//! identifier quoting and DDL. An [`ExecutionDelegate`] owns one prepared
//! statement. A [`DatabaseConfiguration`] hands out both.

use serde::Serialize;

use crate::Result;
use crate::error::{Error, SchemaErrorKind};
use crate::record::{FieldKind, RecordType};
use crate::row::Row;
use crate::value::Value;

/// A value bound to one placeholder of a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub placeholder: String,
    pub value: Value,
}

impl Binding {
    pub fn new(placeholder: impl Into<String>, value: Value) -> Self {
        Self {
            placeholder: placeholder.into(),
            value,
        }
    }
}

/// Render a binding list for log output.
pub fn describe_bindings(bindings: &[Binding]) -> String {
    serde_json::to_string(bindings).unwrap_or_else(|e| format!("<unprintable bindings: {e}>"))
}

/// Dialect policy used while SQL is generated.
pub trait GenerationDelegate {
    /// Register a value and return its placeholder token.
    ///
    /// The n-th call after a [`take_bindings`](Self::take_bindings) yields
    /// the n-th binding.
    fn bind(&mut self, value: Value) -> Result<String>;

    /// Move the live binding buffer out, leaving it empty.
    fn take_bindings(&mut self) -> Vec<Binding>;

    fn quote_identifier(&self, name: &str) -> Result<String>;

    /// `LIMIT`/`OFFSET` clause for a root statement. `max == 0` means no
    /// upper bound.
    fn limit_clause(&mut self, max: usize, skip: usize) -> String {
        match (max, skip) {
            (0, 0) => String::new(),
            (max, 0) => format!("LIMIT {}", max),
            (0, skip) => format!("OFFSET {}", skip),
            (max, skip) => format!("LIMIT {} OFFSET {}", max, skip),
        }
    }

    fn create_table_statements(
        &mut self,
        table: &TableStructure,
        policy: TableCreatePolicy,
    ) -> Result<Vec<String>>;

    fn create_index_statements(
        &mut self,
        table: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<Vec<String>>;
}

/// One prepared statement.
pub trait ExecutionDelegate {
    /// Bind `bindings[skip..]` to positions `skip + 1 ..`, resetting the
    /// statement first so it can be stepped again.
    fn bind(&mut self, bindings: &[Binding], skip: usize) -> Result<()>;

    /// Step to the next row. Statements that produce no rows are executed by
    /// the first call, which returns `false`.
    fn has_next(&mut self) -> Result<bool>;

    /// Decode the current row.
    fn decode_row(&mut self) -> Result<Row>;
}

/// A database handle that can generate and execute SQL.
pub trait DatabaseConfiguration {
    type Generation: GenerationDelegate;
    type Execution<'a>: ExecutionDelegate
    where
        Self: 'a;

    fn generation_delegate(&self) -> Self::Generation;

    fn execution_delegate(&self, sql: &str) -> Result<Self::Execution<'_>>;
}

/// Options for table creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCreatePolicy {
    /// Only create the root table, not the tables of its collection fields.
    pub shallow: bool,
    /// Drop each table before creating it.
    pub drop_table: bool,
}

impl TableCreatePolicy {
    pub const DEFAULT: Self = Self {
        shallow: false,
        drop_table: false,
    };

    pub const fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    pub const fn drop_table(mut self) -> Self {
        self.drop_table = true;
        self
    }
}

/// A column in a [`TableStructure`].
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub optional: bool,
    pub primary_key: bool,
}

/// Table shape derived from a record's field table, with the tables of its
/// collection fields nested below it.
#[derive(Debug, Clone)]
pub struct TableStructure {
    pub table: &'static str,
    pub columns: Vec<ColumnDef>,
    pub sub_tables: Vec<TableStructure>,
}

impl TableStructure {
    /// Build the structure for `record`.
    ///
    /// `primary_key` overrides the record's own choice (the field marked as
    /// primary key, else `id`). Collection fields contribute sub-tables
    /// unless the policy is shallow; a record type reached twice on one path
    /// is not expanded again.
    pub fn of(
        record: RecordType,
        primary_key: Option<&str>,
        policy: TableCreatePolicy,
    ) -> Result<Self> {
        let mut path = Vec::new();
        Self::build(record, primary_key, policy, &mut path)
    }

    fn build(
        record: RecordType,
        primary_key: Option<&str>,
        policy: TableCreatePolicy,
        path: &mut Vec<RecordType>,
    ) -> Result<Self> {
        let key = match primary_key {
            Some(name) => {
                let field = record.columns().find(|f| f.name == name).ok_or_else(|| {
                    Error::schema(
                        SchemaErrorKind::ColumnNotFound,
                        format!(
                            "primary key '{}' is not a column of {}",
                            name,
                            record.table_name()
                        ),
                    )
                })?;
                Some(field.name)
            }
            None => record.primary_key().map(|f| f.name),
        };
        let columns = record
            .columns()
            .map(|f| ColumnDef {
                name: f.name,
                kind: f.kind,
                optional: f.optional,
                primary_key: Some(f.name) == key,
            })
            .collect();

        let mut sub_tables = Vec::new();
        if !policy.shallow {
            path.push(record);
            for related in record.collections().filter_map(|f| f.kind.related()) {
                if path.contains(&related) {
                    continue;
                }
                sub_tables.push(Self::build(related, None, policy, path)?);
            }
            path.pop();
        }

        Ok(Self {
            table: record.table_name(),
            columns,
            sub_tables,
        })
    }

    pub fn primary_key(&self) -> Option<&'static str> {
        self.columns.iter().find(|c| c.primary_key).map(|c| c.name)
    }
}
