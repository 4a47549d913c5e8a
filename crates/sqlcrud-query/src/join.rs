//! Join resolution for multi-table selects.
//!
//! The root statement only joins the tables its WHERE clause touches. Every
//! table registered with join data also gets a statement of its own, which
//! the merge engine buffers and filters per root row.

use sqlcrud_core::{Error, GenerationDelegate, GenerationErrorKind, RecordType, Result};

use crate::expr::Expr;
use crate::state::{JoinData, QueryState, TableDescriptor};

/// Reserved column carrying the root key in pivot join statements.
pub const PIVOT_KEY_COLUMN: &str = "__sqlcrud_pivot_key__";

/// `<table> AS <alias>`
pub(crate) fn table_ref(
    delegate: &mut dyn GenerationDelegate,
    table: &TableDescriptor,
) -> Result<String> {
    Ok(format!(
        "{} AS {}",
        delegate.quote_identifier(table.record.table_name())?,
        delegate.quote_identifier(&table.alias)?
    ))
}

fn join_clause(
    delegate: &mut dyn GenerationDelegate,
    state: &QueryState,
    record: RecordType,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<String> {
    let table = lookup(state, record)?;
    Ok(format!(
        "JOIN {} ON {} = {}",
        table_ref(delegate, table)?,
        lhs.render(delegate, state)?,
        rhs.render(delegate, state)?
    ))
}

fn lookup(state: &QueryState, record: RecordType) -> Result<&TableDescriptor> {
    state.table_for(record).ok_or_else(|| {
        Error::generation(
            GenerationErrorKind::UnknownType,
            format!("unknown type in where clause: {}", record.type_name()),
        )
    })
}

fn join_data<'s>(state: &'s QueryState, record: RecordType) -> Result<&'s JoinData> {
    lookup(state, record)?.join.as_ref().ok_or_else(|| {
        Error::generation(
            GenerationErrorKind::JoinWithoutClause,
            format!("join without a clause: {}", record.type_name()),
        )
    })
}

/// Distinct record types referenced by the WHERE clause, in table
/// registration order, that must be joined into a statement rooted at
/// `current`.
///
/// Fails when a referenced type has no registered table or when such a
/// table carries no join data.
pub(crate) fn forced_joins(state: &QueryState, current: RecordType) -> Result<Vec<RecordType>> {
    // A lone root has nothing to force; unknown types still fail at render.
    if state.tables().len() < 2 {
        return Ok(Vec::new());
    }
    let Some(where_expr) = state.where_expr() else {
        return Ok(Vec::new());
    };
    let Some(root) = state.root().map(|t| t.record) else {
        return Ok(Vec::new());
    };
    let referenced = where_expr.referenced_types();
    for record in &referenced {
        lookup(state, *record)?;
    }
    let mut forced = Vec::new();
    for table in state.tables() {
        if table.record == root || table.record == current || !referenced.contains(&table.record)
        {
            continue;
        }
        join_data(state, table.record)?;
        forced.push(table.record);
    }
    Ok(forced)
}

/// JOIN clauses reaching `record` from the root table.
pub(crate) fn join_from_root(
    delegate: &mut dyn GenerationDelegate,
    state: &QueryState,
    record: RecordType,
) -> Result<Vec<String>> {
    let data = join_data(state, record)?;
    let on = Expr::from(data.on);
    let equals = Expr::from(data.equals);
    match &data.pivot {
        None => Ok(vec![join_clause(delegate, state, record, &on, &equals)?]),
        Some(pivot) => Ok(vec![
            join_clause(delegate, state, pivot.table, &on, &equals)?,
            join_clause(
                delegate,
                state,
                record,
                &Expr::from(pivot.and),
                &Expr::from(pivot.also_equals),
            )?,
        ]),
    }
}

/// Head of the statement that loads a joined table: the SELECT list, its
/// FROM table and the JOINs back to the root.
pub(crate) fn joined_select_head(
    delegate: &mut dyn GenerationDelegate,
    state: &QueryState,
    table: &TableDescriptor,
) -> Result<String> {
    let data = join_data(state, table.record)?;
    let root = state.root().ok_or_else(|| {
        Error::generation(GenerationErrorKind::NoTables, "no tables registered")
    })?;
    let alias = delegate.quote_identifier(&table.alias)?;
    let from = table_ref(delegate, table)?;
    let on = Expr::from(data.on);
    let equals = Expr::from(data.equals);
    match &data.pivot {
        None => Ok(format!(
            "SELECT DISTINCT {}.* FROM {} {}",
            alias,
            from,
            join_clause(delegate, state, root.record, &on, &equals)?
        )),
        Some(pivot) => {
            let key = on.render(delegate, state)?;
            let pivot_join = join_clause(
                delegate,
                state,
                pivot.table,
                &Expr::from(pivot.and),
                &Expr::from(pivot.also_equals),
            )?;
            let root_join = join_clause(delegate, state, root.record, &on, &equals)?;
            Ok(format!(
                "SELECT DISTINCT {}.*, {} AS {} FROM {} {} {}",
                alias,
                key,
                delegate.quote_identifier(PIVOT_KEY_COLUMN)?,
                from,
                pivot_join,
                root_join
            ))
        }
    }
}
