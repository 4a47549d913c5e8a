//! Query state threaded from the builder stages into the generator.

use sqlcrud_core::{
    Binding, Error, FieldInfo, FieldRef, GenerationErrorKind, KeyKind, RecordType, Result, Value,
};

use crate::expr::Expr;

/// The statement family a query renders to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    #[default]
    Unset,
    Select,
    Insert,
    Update,
    Delete,
    Count,
}

/// How a joined table attaches to the root record.
#[derive(Debug, Clone)]
pub struct JoinData {
    /// Collection field on the root record that receives the rows.
    pub collection: &'static str,
    /// Key field on the root record.
    pub on: FieldRef,
    /// Matching field on the joined record, or on the pivot record.
    pub equals: FieldRef,
    pub key_kind: KeyKind,
    pub pivot: Option<PivotJoin>,
}

/// Second hop of a many-to-many join through a junction record.
#[derive(Debug, Clone)]
pub struct PivotJoin {
    pub table: RecordType,
    /// Key field on the joined record.
    pub and: FieldRef,
    /// Matching field on the pivot record.
    pub also_equals: FieldRef,
}

#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub record: RecordType,
    pub alias: String,
    pub join: Option<JoinData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub field: FieldRef,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Zero means unbounded.
    pub max: usize,
    pub skip: usize,
}

/// One rendered SQL statement and the values for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

/// Include/exclude lists applied to a record's columns for insert and update.
#[derive(Debug, Clone, Default)]
pub struct ColumnFilter {
    include: Vec<FieldRef>,
    exclude: Vec<FieldRef>,
}

impl ColumnFilter {
    pub fn new(include: &[FieldRef], exclude: &[FieldRef]) -> Self {
        Self {
            include: include.to_vec(),
            exclude: exclude.to_vec(),
        }
    }

    /// Columns of `record` in declaration order: everything when the include
    /// list is empty, minus the exclude list.
    pub fn columns(&self, record: RecordType) -> Result<Vec<&'static FieldInfo>> {
        for field in self.include.iter().chain(&self.exclude) {
            let known = field.record() == record
                && record.columns().any(|f| f.name == field.name());
            if !known {
                return Err(Error::generation(
                    GenerationErrorKind::UnresolvedField,
                    format!(
                        "{} has no column named '{}'",
                        record.table_name(),
                        field.name()
                    ),
                ));
            }
        }
        let listed = |list: &[FieldRef], name: &str| list.iter().any(|f| f.name() == name);
        Ok(record
            .columns()
            .filter(|f| self.include.is_empty() || listed(&self.include, f.name))
            .filter(|f| !listed(&self.exclude, f.name))
            .collect())
    }
}

#[derive(Debug, Clone)]
struct PendingOrdering {
    ordering: Ordering,
    // number of registered tables when the ordering was declared
    segment: usize,
}

/// Accumulated state of one query, built fresh for every terminal operation.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    tables: Vec<TableDescriptor>,
    command: Command,
    filters: Vec<Expr>,
    pending_orderings: Vec<PendingOrdering>,
    pending_limit: Option<Limit>,
    instance: Vec<(&'static str, Value)>,
    column_filter: ColumnFilter,
    statements: Vec<Statement>,
}

impl QueryState {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn set_command(&mut self, command: Command) {
        self.command = command;
    }

    /// Register a table under the next alias (`t0`, `t1`, ...).
    pub fn add_table(
        &mut self,
        record: RecordType,
        join: Option<JoinData>,
    ) -> Result<&TableDescriptor> {
        if self.table_for(record).is_some() {
            return Err(Error::generation(
                GenerationErrorKind::DuplicateTable,
                format!("{} is already part of this query", record.type_name()),
            ));
        }
        let alias = format!("t{}", self.tables.len());
        self.tables.push(TableDescriptor {
            record,
            alias,
            join,
        });
        Ok(&self.tables[self.tables.len() - 1])
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn root(&self) -> Option<&TableDescriptor> {
        self.tables.first()
    }

    pub fn table_for(&self, record: RecordType) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.record == record)
    }

    /// Tables that carry join data, in registration order. Each one gets its
    /// own statement after the root's.
    pub fn joined_tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter().filter(|t| t.join.is_some())
    }

    pub fn add_filter(&mut self, expr: Expr) {
        self.filters.push(expr);
    }

    pub fn filters(&self) -> &[Expr] {
        &self.filters
    }

    /// All filters folded into one conjunction.
    pub fn where_expr(&self) -> Option<Expr> {
        self.filters
            .iter()
            .cloned()
            .reduce(|acc, next| acc.and(next))
    }

    pub fn add_ordering(&mut self, fields: &[FieldRef], descending: bool) {
        let segment = self.tables.len();
        self.pending_orderings
            .extend(fields.iter().map(|&field| PendingOrdering {
                ordering: Ordering { field, descending },
                segment,
            }));
    }

    pub fn set_limit(&mut self, limit: Limit) {
        self.pending_limit = Some(limit);
    }

    /// Take the orderings declared after the last table registration.
    ///
    /// Orderings declared earlier stay pending; generation fails on them.
    pub fn drain_orderings(&mut self) -> Vec<Ordering> {
        let current = self.tables.len();
        let (drained, kept) = std::mem::take(&mut self.pending_orderings)
            .into_iter()
            .partition::<Vec<_>, _>(|p| p.segment == current);
        self.pending_orderings = kept;
        drained.into_iter().map(|p| p.ordering).collect()
    }

    pub fn take_limit(&mut self) -> Option<Limit> {
        self.pending_limit.take()
    }

    pub fn has_pending_orderings(&self) -> bool {
        !self.pending_orderings.is_empty()
    }

    /// Encoded column values of the instance being inserted or updated.
    pub fn set_instance(&mut self, values: Vec<(&'static str, Value)>, filter: ColumnFilter) {
        self.instance = values;
        self.column_filter = filter;
    }

    pub fn instance_value(&self, column: &str) -> Option<&Value> {
        self.instance
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn column_filter(&self) -> &ColumnFilter {
        &self.column_filter
    }

    pub fn push_statement(&mut self, sql: String, bindings: Vec<Binding>) {
        self.statements.push(Statement { sql, bindings });
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}
