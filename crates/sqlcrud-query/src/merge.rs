//! Execution and merge engine.
//!
//! The root statement is stepped lazily. Each joined statement is drained
//! up front into memory, and while a root row decodes, its collection fields
//! are filled by filtering those buffered rows on key equality.

use std::collections::HashMap;
use std::marker::PhantomData;

use sqlcrud_core::{
    CollectionSource, DatabaseConfiguration, DecodeErrorKind, Error, ExecutionDelegate, FromValue,
    KeyKind, Record, RecordReader, RecordType, Result, Row, Value,
};

use crate::join::PIVOT_KEY_COLUMN;
use crate::state::{QueryState, Statement};

/// A join key normalized by its declared kind.
#[derive(Debug, PartialEq)]
enum KeyValue<'a> {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Text(&'a str),
    Timestamp(i64),
    Blob(&'a [u8]),
}

impl<'a> KeyValue<'a> {
    /// `None` for NULL, which joins with nothing.
    fn read(kind: KeyKind, value: &'a Value) -> Result<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        let key = match kind {
            KeyKind::Bool => value.as_bool().map(KeyValue::Bool),
            KeyKind::Int => value.as_i64().map(KeyValue::Int),
            KeyKind::UInt => value.as_u64().map(KeyValue::UInt),
            KeyKind::Float => f32::from_value(value).ok().map(KeyValue::Float),
            KeyKind::Double => value.as_f64().map(KeyValue::Double),
            KeyKind::Text => value.as_str().map(KeyValue::Text),
            KeyKind::Timestamp => value.as_i64().map(KeyValue::Timestamp),
            KeyKind::Blob => value.as_bytes().map(KeyValue::Blob),
        };
        key.map(Some).ok_or_else(|| {
            Error::Type(sqlcrud_core::TypeError {
                expected: "join key",
                actual: format!("{} cannot be compared as {:?}", value.type_name(), kind),
                column: None,
                rust_type: None,
            })
        })
    }
}

#[derive(Debug)]
struct JoinedRows {
    root_key: &'static str,
    key_kind: KeyKind,
    related_key: &'static str,
    rows: Vec<Row>,
}

/// Buffered joined rows, keyed by the root collection field they populate.
#[derive(Debug)]
pub struct MergeContext {
    root: RecordType,
    joins: HashMap<&'static str, JoinedRows>,
}

impl MergeContext {
    fn new(root: RecordType) -> Self {
        Self {
            root,
            joins: HashMap::new(),
        }
    }
}

impl CollectionSource for MergeContext {
    fn related_rows<'s>(
        &'s self,
        record: RecordType,
        field: &str,
        root: &Row,
    ) -> Result<Option<Vec<&'s Row>>> {
        if record != self.root {
            return Ok(None);
        }
        let Some(joined) = self.joins.get(field) else {
            return Ok(None);
        };
        let Some(raw) = root.get_by_name(joined.root_key) else {
            return Err(Error::decode(
                DecodeErrorKind::MissingKey,
                record.table_name(),
                field,
                format!("root row has no '{}' column to join on", joined.root_key),
            ));
        };
        let Some(key) = KeyValue::read(joined.key_kind, raw)? else {
            return Ok(Some(Vec::new()));
        };
        let mut related = Vec::new();
        for row in &joined.rows {
            let Some(value) = row.get_by_name(joined.related_key) else {
                return Err(Error::decode(
                    DecodeErrorKind::MissingKey,
                    record.table_name(),
                    field,
                    format!("joined row has no '{}' column", joined.related_key),
                ));
            };
            if KeyValue::read(joined.key_kind, value)?.as_ref() == Some(&key) {
                related.push(row);
            }
        }
        Ok(Some(related))
    }
}

/// Prepare `statement` and bind all of its values.
pub(crate) fn prepare<'db, C: DatabaseConfiguration>(
    configuration: &'db C,
    statement: &Statement,
) -> Result<C::Execution<'db>> {
    let mut exe = configuration.execution_delegate(&statement.sql)?;
    exe.bind(&statement.bindings, 0)?;
    Ok(exe)
}

/// Run a statement to completion, discarding any rows.
pub(crate) fn execute<C: DatabaseConfiguration>(
    configuration: &C,
    statement: &Statement,
) -> Result<()> {
    let mut exe = prepare(configuration, statement)?;
    while exe.has_next()? {}
    Ok(())
}

/// Run a statement and collect every row.
pub(crate) fn fetch_all<C: DatabaseConfiguration>(
    configuration: &C,
    statement: &Statement,
) -> Result<Vec<Row>> {
    let mut exe = prepare(configuration, statement)?;
    let mut rows = Vec::new();
    while exe.has_next()? {
        rows.push(exe.decode_row()?);
    }
    Ok(rows)
}

/// Lazy, single-pass iterator over hydrated root records.
///
/// The first error ends the iteration.
pub struct SelectIter<'db, C: DatabaseConfiguration + 'db, R> {
    root: C::Execution<'db>,
    merge: MergeContext,
    done: bool,
    _marker: PhantomData<fn() -> R>,
}

impl<'db, C: DatabaseConfiguration + 'db, R: Record> SelectIter<'db, C, R> {
    /// Prepare the root statement and buffer every joined statement.
    pub(crate) fn start(configuration: &'db C, state: &QueryState) -> Result<Self> {
        let statements = state.statements();
        let Some(root_statement) = statements.first() else {
            return Err(Error::Custom("select produced no statements".to_string()));
        };
        let root = prepare(configuration, root_statement)?;

        let mut merge = MergeContext::new(RecordType::of::<R>());
        for (table, statement) in state.joined_tables().zip(&statements[1..]) {
            let Some(join) = &table.join else { continue };
            let related_key = if join.pivot.is_some() {
                PIVOT_KEY_COLUMN
            } else {
                join.equals.name()
            };
            let rows = fetch_all(configuration, statement)?;
            tracing::debug!(
                table = table.record.table_name(),
                field = join.collection,
                rows = rows.len(),
                "buffered joined rows"
            );
            merge.joins.insert(
                join.collection,
                JoinedRows {
                    root_key: join.on.name(),
                    key_kind: join.key_kind,
                    related_key,
                    rows,
                },
            );
        }

        Ok(Self {
            root,
            merge,
            done: false,
            _marker: PhantomData,
        })
    }

    fn step(&mut self) -> Result<Option<R>> {
        if !self.root.has_next()? {
            return Ok(None);
        }
        let row = self.root.decode_row()?;
        let reader = RecordReader::with_collections(RecordType::of::<R>(), &row, &self.merge);
        R::from_reader(&reader).map(Some)
    }
}

impl<'db, C: DatabaseConfiguration + 'db, R: Record> Iterator for SelectIter<'db, C, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(columns: &[&str], values: Vec<Value>) -> Row {
        Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
    }

    fn context(kind: KeyKind, rows: Vec<Row>) -> MergeContext {
        let mut merge = MergeContext::new(crate::testing::Parent::record_type());
        merge.joins.insert(
            "children",
            JoinedRows {
                root_key: "id",
                key_kind: kind,
                related_key: "parent_id",
                rows,
            },
        );
        merge
    }

    // ==================== Key Normalization Tests ====================

    #[test]
    fn test_int_keys_compare_across_widths() {
        let a = Value::Int(7);
        let b = Value::BigInt(7);
        assert_eq!(
            KeyValue::read(KeyKind::Int, &a).unwrap(),
            KeyValue::read(KeyKind::Int, &b).unwrap()
        );
    }

    #[test]
    fn test_null_key_is_none() {
        assert_eq!(KeyValue::read(KeyKind::Text, &Value::Null).unwrap(), None);
    }

    #[test]
    fn test_mismatched_key_is_type_error() {
        let err = KeyValue::read(KeyKind::Int, &Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_timestamp_and_blob_keys() {
        let ts = Value::Timestamp(10);
        assert_eq!(
            KeyValue::read(KeyKind::Timestamp, &ts).unwrap(),
            Some(KeyValue::Timestamp(10))
        );
        let blob = Value::Bytes(vec![1, 2]);
        assert_eq!(
            KeyValue::read(KeyKind::Blob, &blob).unwrap(),
            Some(KeyValue::Blob(&[1, 2]))
        );
    }

    // ==================== Filtering Tests ====================

    #[test]
    fn test_related_rows_filtered_by_key() {
        let children = vec![
            row(&["parent_id", "name"], vec![Value::Int(1), "a".into()]),
            row(&["parent_id", "name"], vec![Value::Int(1), "b".into()]),
            row(&["parent_id", "name"], vec![Value::Int(2), "c".into()]),
        ];
        let merge = context(KeyKind::Int, children);
        let root = row(&["id"], vec![Value::BigInt(1)]);
        let related = merge
            .related_rows(crate::testing::Parent::record_type(), "children", &root)
            .unwrap()
            .unwrap();
        let names: Vec<_> = related
            .iter()
            .map(|r| r.get_named::<String>("name").unwrap())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_unjoined_field_is_none() {
        let merge = context(KeyKind::Int, Vec::new());
        let root = row(&["id"], vec![Value::BigInt(1)]);
        let related = merge
            .related_rows(crate::testing::Parent::record_type(), "tags", &root)
            .unwrap();
        assert!(related.is_none());
    }

    #[test]
    fn test_missing_root_key_is_fatal() {
        let merge = context(KeyKind::Int, Vec::new());
        let root = row(&["name"], vec!["x".into()]);
        let err = merge
            .related_rows(crate::testing::Parent::record_type(), "children", &root)
            .unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::MissingKey));
    }

    #[test]
    fn test_null_root_key_yields_empty() {
        let children = vec![row(&["parent_id"], vec![Value::Null])];
        let merge = context(KeyKind::Int, children);
        let root = row(&["id"], vec![Value::Null]);
        let related = merge
            .related_rows(crate::testing::Parent::record_type(), "children", &root)
            .unwrap()
            .unwrap();
        assert!(related.is_empty());
    }
}
