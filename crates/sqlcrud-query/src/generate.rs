//! SQL generation: renders a [`QueryState`] into statements.

use sqlcrud_core::{
    Error, GenerationDelegate, GenerationErrorKind, RecordType, Result, Value, describe_bindings,
};

use crate::join::{forced_joins, join_from_root, joined_select_head, table_ref};
use crate::state::{Command, Limit, Ordering, QueryState, TableDescriptor};

/// Render every statement for the state's command and append them to the
/// state.
///
/// Select emits the root statement followed by one statement per joined
/// table. Every other command emits exactly one statement.
pub fn generate(state: &mut QueryState, delegate: &mut dyn GenerationDelegate) -> Result<()> {
    let command = state.command();
    if command == Command::Unset {
        return Err(Error::generation(
            GenerationErrorKind::CommandUnset,
            "no command was set on the query",
        ));
    }
    if state.tables().is_empty() {
        return Err(Error::generation(
            GenerationErrorKind::NoTables,
            "no tables registered",
        ));
    }
    // discard anything a previous generation left in the buffer
    delegate.take_bindings();

    match command {
        Command::Select | Command::Count => generate_select(state, delegate)?,
        Command::Update => generate_update(state, delegate)?,
        Command::Delete => generate_delete(state, delegate)?,
        Command::Insert => generate_insert(state, delegate)?,
        Command::Unset => {}
    }

    if state.has_pending_orderings() {
        return Err(Error::generation(
            GenerationErrorKind::OrderingsNotConsumed,
            "orderings were not consumed; declare them after the last join",
        ));
    }
    if state.take_limit().is_some() {
        tracing::warn!(?command, "limit has no effect on this command and was ignored");
    }
    Ok(())
}

fn emit(state: &mut QueryState, delegate: &mut dyn GenerationDelegate, sql: String) {
    let bindings = delegate.take_bindings();
    tracing::debug!(sql = %sql, bindings = bindings.len(), "generated statement");
    if !bindings.is_empty() {
        tracing::trace!(bindings = %describe_bindings(&bindings), "statement bindings");
    }
    state.push_statement(sql, bindings);
}

fn where_clause(state: &QueryState, delegate: &mut dyn GenerationDelegate) -> Result<String> {
    match state.filters() {
        [] => Ok(String::new()),
        [only] => Ok(format!(" WHERE {}", only.render(delegate, state)?)),
        many => {
            let parts = many
                .iter()
                .map(|expr| Ok(format!("({})", expr.render(delegate, state)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!(" WHERE {}", parts.join(" AND ")))
        }
    }
}

fn order_clause(
    state: &QueryState,
    delegate: &mut dyn GenerationDelegate,
    orderings: &[Ordering],
    record: RecordType,
) -> Result<String> {
    let mut terms = Vec::new();
    for ordering in orderings.iter().filter(|o| o.field.record() == record) {
        let column = crate::expr::Expr::Field(ordering.field).render(delegate, state)?;
        terms.push(if ordering.descending {
            format!("{} DESC", column)
        } else {
            column
        });
    }
    if terms.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" ORDER BY {}", terms.join(", ")))
    }
}

/// Orderings can only sort the root statement or the statement of a joined
/// table.
fn check_orderings(state: &QueryState, orderings: &[Ordering]) -> Result<()> {
    for ordering in orderings {
        let record = ordering.field.record();
        let sortable = state
            .table_for(record)
            .is_some_and(|t| t.join.is_some() || state.root().is_some_and(|r| r.record == record));
        if !sortable {
            return Err(Error::generation(
                GenerationErrorKind::UnknownType,
                format!("cannot order by a field of {}", record.type_name()),
            ));
        }
    }
    Ok(())
}

fn root_table(state: &QueryState) -> Result<TableDescriptor> {
    state
        .root()
        .cloned()
        .ok_or_else(|| Error::generation(GenerationErrorKind::NoTables, "no tables registered"))
}

fn generate_select(state: &mut QueryState, delegate: &mut dyn GenerationDelegate) -> Result<()> {
    let orderings = state.drain_orderings();
    let limit = state.take_limit();
    check_orderings(state, &orderings)?;
    let command = state.command();
    let root = root_table(state)?;

    let mut sql = format!(
        "SELECT DISTINCT {}.* FROM {}",
        delegate.quote_identifier(&root.alias)?,
        table_ref(delegate, &root)?
    );
    for record in forced_joins(state, root.record)? {
        for clause in join_from_root(delegate, state, record)? {
            sql.push(' ');
            sql.push_str(&clause);
        }
    }
    sql.push_str(&where_clause(state, delegate)?);
    if command == Command::Select {
        sql.push_str(&order_clause(state, delegate, &orderings, root.record)?);
    }
    if let Some(Limit { max, skip }) = limit {
        let clause = delegate.limit_clause(max, skip);
        if !clause.is_empty() {
            sql.push(' ');
            sql.push_str(&clause);
        }
    }
    if command == Command::Count {
        sql = format!("SELECT COUNT(*) AS count FROM ({}) AS s1", sql);
        emit(state, delegate, sql);
        return Ok(());
    }
    emit(state, delegate, sql);

    let joined: Vec<TableDescriptor> = state.joined_tables().cloned().collect();
    for table in &joined {
        let mut sql = joined_select_head(delegate, state, table)?;
        for record in forced_joins(state, table.record)? {
            for clause in join_from_root(delegate, state, record)? {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }
        sql.push_str(&where_clause(state, delegate)?);
        sql.push_str(&order_clause(state, delegate, &orderings, table.record)?);
        emit(state, delegate, sql);
    }
    Ok(())
}

/// Update, Delete and Insert address the root table alone.
fn single_table(state: &QueryState, command: &str) -> Result<TableDescriptor> {
    let root = root_table(state)?;
    if state.tables().len() > 1 {
        return Err(Error::generation(
            GenerationErrorKind::InvalidStage,
            format!("{} cannot follow a join", command),
        ));
    }
    for filter in state.filters() {
        if let Some(other) = filter
            .referenced_types()
            .into_iter()
            .find(|r| *r != root.record)
        {
            return Err(Error::generation(
                GenerationErrorKind::UnknownType,
                format!("unknown type in where clause: {}", other.type_name()),
            ));
        }
    }
    Ok(root)
}

fn generate_update(state: &mut QueryState, delegate: &mut dyn GenerationDelegate) -> Result<()> {
    let root = single_table(state, "update")?;
    let columns = state.column_filter().columns(root.record)?;
    if columns.is_empty() {
        return Err(Error::generation(
            GenerationErrorKind::InvalidStage,
            "update has no columns to set",
        ));
    }
    let mut sets = Vec::with_capacity(columns.len());
    for field in columns {
        let value = state
            .instance_value(field.name)
            .cloned()
            .unwrap_or(Value::Null);
        sets.push(format!(
            "{}={}",
            delegate.quote_identifier(field.name)?,
            delegate.bind(value)?
        ));
    }
    let sql = format!(
        "UPDATE {} SET {}{}",
        delegate.quote_identifier(root.record.table_name())?,
        sets.join(", "),
        where_clause(state, delegate)?
    );
    emit(state, delegate, sql);
    Ok(())
}

fn generate_delete(state: &mut QueryState, delegate: &mut dyn GenerationDelegate) -> Result<()> {
    let root = single_table(state, "delete")?;
    let sql = format!(
        "DELETE FROM {}{}",
        delegate.quote_identifier(root.record.table_name())?,
        where_clause(state, delegate)?
    );
    emit(state, delegate, sql);
    Ok(())
}

fn generate_insert(state: &mut QueryState, delegate: &mut dyn GenerationDelegate) -> Result<()> {
    let root = single_table(state, "insert")?;
    if !state.filters().is_empty() {
        return Err(Error::generation(
            GenerationErrorKind::InvalidStage,
            "insert does not take a where clause",
        ));
    }
    let columns = state.column_filter().columns(root.record)?;
    if columns.is_empty() {
        return Err(Error::generation(
            GenerationErrorKind::InvalidStage,
            "insert has no columns",
        ));
    }
    let mut names = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    for field in columns {
        let value = state
            .instance_value(field.name)
            .cloned()
            .unwrap_or(Value::Null);
        names.push(delegate.quote_identifier(field.name)?);
        placeholders.push(delegate.bind(value)?);
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        delegate.quote_identifier(root.record.table_name())?,
        names.join(", "),
        placeholders.join(", ")
    );
    emit(state, delegate, sql);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, StandardGenDelegate};
    use crate::expr::{Expr, FieldExpr};
    use crate::state::{ColumnFilter, JoinData};
    use crate::testing::{Child, Parent};
    use sqlcrud_core::{KeyKind, Record};

    fn state_for(command: Command) -> QueryState {
        let mut state = QueryState::new(command);
        state.add_table(Parent::record_type(), None).unwrap();
        state
    }

    fn children_join() -> JoinData {
        JoinData {
            collection: "children",
            on: Parent::ID.field_ref(),
            equals: Child::PARENT_ID.field_ref(),
            key_kind: KeyKind::Int,
            pivot: None,
        }
    }

    fn run(state: &mut QueryState) -> Result<()> {
        generate(state, &mut StandardGenDelegate::new(Dialect::Sqlite))
    }

    // ==================== Guard Tests ====================

    #[test]
    fn test_unset_command_is_fatal() {
        let mut state = state_for(Command::Unset);
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::CommandUnset));
    }

    #[test]
    fn test_no_tables_is_fatal() {
        let mut state = QueryState::new(Command::Select);
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::NoTables));
    }

    #[test]
    fn test_joined_table_without_clause() {
        let mut state = state_for(Command::Select);
        state.add_table(Child::record_type(), None).unwrap();
        state.add_filter(Child::NAME.eq("a"));
        let err = run(&mut state).unwrap_err();
        assert_eq!(
            err.generation_kind(),
            Some(GenerationErrorKind::JoinWithoutClause)
        );
    }

    #[test]
    fn test_update_after_join_rejected() {
        let mut state = state_for(Command::Update);
        state
            .add_table(Child::record_type(), Some(children_join()))
            .unwrap();
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::InvalidStage));
    }

    #[test]
    fn test_delete_filter_on_foreign_type() {
        let mut state = state_for(Command::Delete);
        state.add_filter(Child::NAME.eq("a"));
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::UnknownType));
    }

    #[test]
    fn test_insert_with_filter_rejected() {
        let mut state = state_for(Command::Insert);
        state.add_filter(Parent::ID.eq(1));
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::InvalidStage));
    }

    #[test]
    fn test_ordering_on_unjoined_table_rejected() {
        let mut state = state_for(Command::Select);
        state.add_ordering(&[Child::NAME.field_ref()], false);
        let err = run(&mut state).unwrap_err();
        assert_eq!(err.generation_kind(), Some(GenerationErrorKind::UnknownType));
    }

    // ==================== Emission Tests ====================

    #[test]
    fn test_each_statement_owns_its_bindings() {
        let mut state = state_for(Command::Select);
        state
            .add_table(Child::record_type(), Some(children_join()))
            .unwrap();
        state.add_filter(Parent::NAME.eq("p"));
        run(&mut state).unwrap();
        let statements = state.statements();
        assert_eq!(statements.len(), 2);
        for statement in statements {
            assert_eq!(statement.bindings.len(), 1);
            assert_eq!(statement.bindings[0].placeholder, "?1");
            assert_eq!(statement.bindings[0].value, Value::Text("p".into()));
        }
    }

    #[test]
    fn test_update_binds_instance_in_schema_order() {
        let mut state = state_for(Command::Update);
        state.set_instance(
            vec![("name", Value::from("n")), ("id", Value::from(4_i64))],
            ColumnFilter::default(),
        );
        state.add_filter(Expr::column("id").eq(4_i64));
        run(&mut state).unwrap();
        let statement = &state.statements()[0];
        assert_eq!(
            statement.sql,
            "UPDATE \"parent\" SET \"id\"=?1, \"name\"=?2 WHERE \"id\" = ?3"
        );
        let values: Vec<_> = statement.bindings.iter().map(|b| b.value.clone()).collect();
        assert_eq!(
            values,
            [Value::BigInt(4), Value::Text("n".into()), Value::BigInt(4)]
        );
    }

    #[test]
    fn test_update_include_list() {
        let mut state = state_for(Command::Update);
        state.set_instance(
            vec![("id", Value::from(1_i64)), ("name", Value::from("n"))],
            ColumnFilter::new(&[Parent::NAME.field_ref()], &[]),
        );
        run(&mut state).unwrap();
        assert_eq!(state.statements()[0].sql, "UPDATE \"parent\" SET \"name\"=?1");
    }

    #[test]
    fn test_limit_ignored_for_delete() {
        let mut state = state_for(Command::Delete);
        state.set_limit(Limit { max: 1, skip: 0 });
        run(&mut state).unwrap();
        assert_eq!(state.statements()[0].sql, "DELETE FROM \"parent\"");
    }

    #[test]
    fn test_skip_only_limit_on_sqlite() {
        let mut state = state_for(Command::Select);
        state.set_limit(Limit { max: 0, skip: 2 });
        run(&mut state).unwrap();
        assert_eq!(
            state.statements()[0].sql,
            "SELECT DISTINCT \"t0\".* FROM \"parent\" AS \"t0\" LIMIT -1 OFFSET 2"
        );
    }

    #[test]
    fn test_lazy_rendered_each_time() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

        let counter = Arc::new(AtomicI64::new(0));
        let produced = Arc::clone(&counter);
        let mut state = state_for(Command::Select);
        state.add_filter(Expr::lazy(move || {
            Parent::ID.eq(produced.fetch_add(1, AtomicOrdering::SeqCst))
        }));
        run(&mut state).unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(state.statements()[0].bindings.len(), 1);

        let mut again = state_for(Command::Select);
        let produced = Arc::clone(&counter);
        again.add_filter(Expr::lazy(move || {
            Parent::ID.eq(produced.fetch_add(1, AtomicOrdering::SeqCst))
        }));
        run(&mut again).unwrap();
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 2);
    }
}
