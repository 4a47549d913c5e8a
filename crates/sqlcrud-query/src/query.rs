//! Fluent query builder and its terminal operations.
//!
//! A [`Query`] records its stages as plain values. Every terminal replays
//! them into a fresh [`QueryState`], so one builder can be run many times.

use std::marker::PhantomData;

use sqlcrud_core::{
    Binding, Collection, DatabaseConfiguration, DecodeErrorKind, Error, ExecutionDelegate, Field,
    FieldRef, GenerationDelegate, GenerationErrorKind, KeyType, Record, RecordType, Result, Value,
};

use crate::database::Database;
use crate::expr::Expr;
use crate::generate::generate;
use crate::merge::{SelectIter, execute, fetch_all};
use crate::state::{ColumnFilter, Command, JoinData, Limit, PivotJoin, QueryState, Statement};

#[derive(Debug, Clone)]
enum Stage {
    Where(Expr),
    Join { record: RecordType, join: JoinData },
    Ordering { fields: Vec<FieldRef>, descending: bool },
    Limit(Limit),
}

/// A query rooted at record type `R`.
///
/// ```ignore
/// let parents = db
///     .table::<Parent>()
///     .filter(Parent::NAME.ne(Expr::null()))
///     .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
///     .order_by(Child::NAME)
///     .select()?
///     .all()?;
/// ```
pub struct Query<'db, C: DatabaseConfiguration, R: Record> {
    database: &'db Database<C>,
    stages: Vec<Stage>,
    _marker: PhantomData<fn() -> R>,
}

impl<C: DatabaseConfiguration, R: Record> Clone for Query<'_, C, R> {
    fn clone(&self) -> Self {
        Self {
            database: self.database,
            stages: self.stages.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C: DatabaseConfiguration, R: Record> std::fmt::Debug for Query<'_, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &R::TABLE_NAME)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl<'db, C: DatabaseConfiguration, R: Record> Query<'db, C, R> {
    pub(crate) fn new(database: &'db Database<C>) -> Self {
        Self {
            database,
            stages: Vec::new(),
            _marker: PhantomData,
        }
    }

    // ==================== Stages ====================

    /// Add a WHERE fragment. Several fragments are conjoined.
    #[must_use]
    pub fn filter(mut self, expr: impl Into<Expr>) -> Self {
        self.stages.push(Stage::Where(expr.into()));
        self
    }

    /// Join the record type held by collection field `to`, matching
    /// `on` of the root record against `equals` of the joined record.
    #[must_use]
    pub fn join<T, K1, K2>(
        mut self,
        to: Field<R, T>,
        on: Field<R, K1>,
        equals: Field<T::Item, K2>,
    ) -> Self
    where
        T: Collection,
        K1: KeyType,
        K2: KeyType<Base = K1::Base>,
    {
        self.stages.push(Stage::Join {
            record: RecordType::of::<T::Item>(),
            join: JoinData {
                collection: to.name(),
                on: on.field_ref(),
                equals: equals.field_ref(),
                key_kind: K1::KIND,
                pivot: None,
            },
        });
        self
    }

    /// Join through junction record `P`: `on` of the root matches `equals`
    /// of `P`, and `and` of the joined record matches `also_equals` of `P`.
    #[must_use]
    pub fn join_pivot<T, P, K1, K2, K3, K4>(
        mut self,
        to: Field<R, T>,
        on: Field<R, K1>,
        equals: Field<P, K2>,
        and: Field<T::Item, K3>,
        also_equals: Field<P, K4>,
    ) -> Self
    where
        T: Collection,
        P: Record,
        K1: KeyType,
        K2: KeyType<Base = K1::Base>,
        K3: KeyType,
        K4: KeyType<Base = K3::Base>,
    {
        self.stages.push(Stage::Join {
            record: RecordType::of::<T::Item>(),
            join: JoinData {
                collection: to.name(),
                on: on.field_ref(),
                equals: equals.field_ref(),
                key_kind: K1::KIND,
                pivot: Some(PivotJoin {
                    table: RecordType::of::<P>(),
                    and: and.field_ref(),
                    also_equals: also_equals.field_ref(),
                }),
            },
        });
        self
    }

    #[must_use]
    pub fn order_by(self, field: impl Into<FieldRef>) -> Self {
        self.order(&[field.into()], false)
    }

    #[must_use]
    pub fn order_by_desc(self, field: impl Into<FieldRef>) -> Self {
        self.order(&[field.into()], true)
    }

    /// Sort by several fields in one direction. Orderings only take effect
    /// when declared after the last join.
    #[must_use]
    pub fn order(mut self, fields: &[FieldRef], descending: bool) -> Self {
        self.stages.push(Stage::Ordering {
            fields: fields.to_vec(),
            descending,
        });
        self
    }

    /// Limit the root statement. `max == 0` leaves it unbounded.
    #[must_use]
    pub fn limit(mut self, max: usize, skip: usize) -> Self {
        self.stages.push(Stage::Limit(Limit { max, skip }));
        self
    }

    fn build_state(&self, command: Command) -> Result<QueryState> {
        let mut state = QueryState::new(command);
        state.add_table(RecordType::of::<R>(), None)?;
        for stage in &self.stages {
            match stage {
                Stage::Where(expr) => state.add_filter(expr.clone()),
                Stage::Join { record, join } => {
                    let pivot = join.pivot.as_ref().map(|p| p.table);
                    state.add_table(*record, Some(join.clone()))?;
                    if let Some(pivot) = pivot {
                        state.add_table(pivot, None)?;
                    }
                }
                Stage::Ordering { fields, descending } => state.add_ordering(fields, *descending),
                Stage::Limit(limit) => state.set_limit(*limit),
            }
        }
        Ok(state)
    }

    fn generated(&self, mut state: QueryState) -> Result<QueryState> {
        let mut delegate = self.database.configuration().generation_delegate();
        generate(&mut state, &mut delegate)?;
        Ok(state)
    }

    // ==================== Terminals ====================

    /// Render the statements for `command` without executing them.
    ///
    /// Insert and Update have no instance here, so every column binds NULL.
    pub fn to_sql(&self, command: Command) -> Result<Vec<Statement>> {
        let state = self.build_state(command)?;
        Ok(self.generated(state)?.into_statements())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE_NAME))]
    pub fn select(&self) -> Result<Select<'db, C, R>> {
        let state = self.generated(self.build_state(Command::Select)?)?;
        Ok(Select {
            database: self.database,
            state,
            _marker: PhantomData,
        })
    }

    /// Number of distinct root rows matched.
    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE_NAME))]
    pub fn count(&self) -> Result<usize> {
        let state = self.generated(self.build_state(Command::Count)?)?;
        let Some(statement) = state.statements().first() else {
            return Err(Error::Custom("count produced no statement".to_string()));
        };
        let rows = fetch_all(self.database.configuration(), statement)?;
        let Some(count) = rows.first().and_then(|row| row.get_by_name("count")) else {
            return Err(Error::decode(
                DecodeErrorKind::MissingColumn,
                R::TABLE_NAME,
                "count",
                "count statement returned no count column",
            ));
        };
        let count = count.as_i64().ok_or_else(|| {
            Error::Type(sqlcrud_core::TypeError {
                expected: "integer",
                actual: count.type_name().to_string(),
                column: Some("count".to_string()),
                rust_type: Some("usize"),
            })
        })?;
        usize::try_from(count).map_err(|_| Error::Custom(format!("negative row count {count}")))
    }

    /// Set every column of the matched rows from `record`.
    pub fn update(&self, record: &R) -> Result<()> {
        self.update_with(record, &[], &[])
    }

    /// Set the columns in `include` (all when empty) minus `exclude`.
    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE_NAME))]
    pub fn update_with(&self, record: &R, include: &[FieldRef], exclude: &[FieldRef]) -> Result<()> {
        let mut state = self.build_state(Command::Update)?;
        state.set_instance(record.to_values(), ColumnFilter::new(include, exclude));
        let state = self.generated(state)?;
        for statement in state.statements() {
            execute(self.database.configuration(), statement)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE_NAME))]
    pub fn delete(&self) -> Result<()> {
        let state = self.generated(self.build_state(Command::Delete)?)?;
        for statement in state.statements() {
            execute(self.database.configuration(), statement)?;
        }
        Ok(())
    }

    pub fn insert(&self, records: &[R]) -> Result<()> {
        self.insert_with(records, &[], &[])
    }

    /// Insert `records` with one prepared statement, rebinding it per
    /// record. The first record fixes the column list.
    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE_NAME, rows = records.len()))]
    pub fn insert_with(
        &self,
        records: &[R],
        include: &[FieldRef],
        exclude: &[FieldRef],
    ) -> Result<()> {
        let Some((first, rest)) = records.split_first() else {
            return Ok(());
        };
        let filter = ColumnFilter::new(include, exclude);
        let columns = filter.columns(RecordType::of::<R>())?;
        let mut state = self.build_state(Command::Insert)?;
        state.set_instance(first.to_values(), filter);
        let state = self.generated(state)?;
        let Some(statement) = state.statements().first() else {
            return Err(Error::Custom("insert produced no statement".to_string()));
        };

        let mut exe = self
            .database
            .configuration()
            .execution_delegate(&statement.sql)?;
        exe.bind(&statement.bindings, 0)?;
        while exe.has_next()? {}
        for record in rest {
            let values = record.to_values();
            let bindings: Vec<Binding> = statement
                .bindings
                .iter()
                .zip(&columns)
                .map(|(binding, field)| {
                    let value = values
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map_or(Value::Null, |(_, v)| v.clone());
                    Binding::new(binding.placeholder.clone(), value)
                })
                .collect();
            exe.bind(&bindings, 0)?;
            while exe.has_next()? {}
        }
        Ok(())
    }

    /// Create an index on `fields` of the root table.
    pub fn index(self, unique: bool, fields: &[FieldRef]) -> Result<Self> {
        let record = RecordType::of::<R>();
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let resolved = (field.record() == record)
                .then(|| sqlcrud_core::resolve_field_reference(*field))
                .flatten();
            let Some(column) = resolved else {
                return Err(Error::generation(
                    GenerationErrorKind::UnresolvedField,
                    format!("{} has no column named '{}'", R::TABLE_NAME, field.name()),
                ));
            };
            columns.push(column);
        }
        let mut delegate = self.database.configuration().generation_delegate();
        for sql in delegate.create_index_statements(R::TABLE_NAME, &columns, unique)? {
            self.database.sql(&sql, &[])?;
        }
        Ok(self)
    }
}

/// A rendered select, ready to run.
pub struct Select<'db, C: DatabaseConfiguration, R> {
    database: &'db Database<C>,
    state: QueryState,
    _marker: PhantomData<fn() -> R>,
}

impl<C: DatabaseConfiguration, R: Record> std::fmt::Debug for Select<'_, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select")
            .field("table", &R::TABLE_NAME)
            .field("statements", &self.state.statements())
            .finish_non_exhaustive()
    }
}

impl<'db, C: DatabaseConfiguration, R: Record> Select<'db, C, R> {
    /// Root statement first, then one statement per joined table.
    pub fn statements(&self) -> &[Statement] {
        self.state.statements()
    }

    /// Execute and return a lazy iterator of hydrated root records.
    ///
    /// Joined statements run to completion before the first record is
    /// produced.
    pub fn iter(&self) -> Result<SelectIter<'db, C, R>> {
        SelectIter::start(self.database.configuration(), &self.state)
    }

    pub fn all(&self) -> Result<Vec<R>> {
        self.iter()?.collect()
    }

    pub fn first(&self) -> Result<Option<R>> {
        self.iter()?.next().transpose()
    }
}
