//! End-to-end tests against a real in-memory SQLite database.

use sqlcrud_core::{
    Binding, DatabaseConfiguration, Decimal, Error, ExecutionDelegate, FromValue, QueryErrorKind,
    TableCreatePolicy, Timestamp, Value,
};
use sqlcrud_macros::Record;
use sqlcrud_query::{Database, Expr, FieldExpr};
use sqlcrud_sqlite::{SqliteConnection, SqliteDatabase};

#[derive(Record, Debug, Clone, PartialEq)]
struct Parent {
    id: i64,
    name: String,
    children: Vec<Child>,
    tags: Option<Vec<Tag>>,
}

#[derive(Record, Debug, Clone, PartialEq)]
struct Child {
    parent_id: i64,
    name: String,
}

#[derive(Record, Debug, Clone, PartialEq)]
struct Tag {
    id: i64,
    label: String,
}

#[derive(Record, Debug, Clone, PartialEq)]
struct ParentTag {
    parent_id: i64,
    tag_id: i64,
}

#[derive(Record, Debug, Clone, PartialEq)]
#[crud(table = "samples")]
struct Sample {
    id: i64,
    flag: bool,
    small: i16,
    wide: u32,
    ratio: f32,
    score: f64,
    note: Option<String>,
    data: Vec<u8>,
    uid: [u8; 16],
    at: Timestamp,
}

fn parent(id: i64, name: &str) -> Parent {
    Parent {
        id,
        name: name.to_string(),
        children: Vec::new(),
        tags: None,
    }
}

fn child(parent_id: i64, name: &str) -> Child {
    Child {
        parent_id,
        name: name.to_string(),
    }
}

fn names(children: &[Child]) -> Vec<&str> {
    children.iter().map(|c| c.name.as_str()).collect()
}

/// p1 has children a and b, p2 has c, p3 has none.
fn family() -> SqliteDatabase {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    db.create::<Parent>(TableCreatePolicy::DEFAULT)
        .unwrap()
        .insert(&[parent(1, "p1"), parent(2, "p2"), parent(3, "p3")])
        .unwrap();
    db.table::<Child>()
        .insert(&[child(1, "a"), child(1, "b"), child(2, "c")])
        .unwrap();
    db
}

// ==================== Schema Tests ====================

#[test]
fn test_create_makes_collection_tables() {
    let db = family();
    let tables = db
        .sql_select::<Tag>(
            "SELECT 0 AS id, name AS label FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )
        .unwrap();
    let labels: Vec<_> = tables.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, ["child", "parent", "tag"]);
}

#[test]
fn test_shallow_create_skips_collections() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    db.create::<Parent>(TableCreatePolicy::DEFAULT.shallow())
        .unwrap();
    let err = db.table::<Child>().insert(&[child(1, "a")]).unwrap_err();
    assert!(matches!(
        err,
        Error::Query(ref e) if e.kind == QueryErrorKind::NotFound
    ));
}

#[test]
fn test_drop_table_policy_empties_table() {
    let db = family();
    assert_eq!(db.table::<Parent>().count().unwrap(), 3);
    db.create::<Parent>(TableCreatePolicy::DEFAULT.shallow().drop_table())
        .unwrap();
    assert_eq!(db.table::<Parent>().count().unwrap(), 0);
    assert_eq!(db.table::<Child>().count().unwrap(), 3);
}

#[test]
fn test_primary_key_rejects_duplicates() {
    let db = family();
    let err = db.table::<Parent>().insert(&[parent(1, "again")]).unwrap_err();
    assert!(err.is_constraint_violation());
}

#[test]
fn test_unique_index() {
    let db = family();
    db.table::<Tag>()
        .index(true, &[Tag::LABEL.field_ref()])
        .unwrap()
        .insert(&[Tag {
            id: 1,
            label: "x".into(),
        }])
        .unwrap();
    let err = db
        .table::<Tag>()
        .insert(&[Tag {
            id: 2,
            label: "x".into(),
        }])
        .unwrap_err();
    assert!(err.is_constraint_violation());
}

// ==================== Select And Merge Tests ====================

#[test]
fn test_join_merges_children() {
    let db = family();
    let parents = db
        .table::<Parent>()
        .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
        .order_by(Parent::ID)
        .order_by_desc(Child::NAME)
        .select()
        .unwrap()
        .all()
        .unwrap();

    assert_eq!(parents.len(), 3);
    assert_eq!(names(&parents[0].children), ["b", "a"]);
    assert_eq!(names(&parents[1].children), ["c"]);
    assert!(parents[2].children.is_empty());
    assert_eq!(parents[0].tags, None);
}

#[test]
fn test_pivot_join_merges_tags() {
    let db = family();
    db.create::<ParentTag>(TableCreatePolicy::DEFAULT)
        .unwrap()
        .insert(&[
            ParentTag {
                parent_id: 1,
                tag_id: 10,
            },
            ParentTag {
                parent_id: 1,
                tag_id: 11,
            },
            ParentTag {
                parent_id: 2,
                tag_id: 10,
            },
        ])
        .unwrap();
    db.table::<Tag>()
        .insert(&[
            Tag {
                id: 10,
                label: "x".into(),
            },
            Tag {
                id: 11,
                label: "y".into(),
            },
        ])
        .unwrap();

    let parents = db
        .table::<Parent>()
        .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
        .join_pivot(
            Parent::TAGS,
            Parent::ID,
            ParentTag::PARENT_ID,
            Tag::ID,
            ParentTag::TAG_ID,
        )
        .order_by(Parent::ID)
        .order_by(Tag::LABEL)
        .select()
        .unwrap()
        .all()
        .unwrap();

    let labels: Vec<Vec<&str>> = parents
        .iter()
        .map(|p| {
            p.tags
                .iter()
                .flatten()
                .map(|t| t.label.as_str())
                .collect()
        })
        .collect();
    assert_eq!(labels, [vec!["x", "y"], vec!["x"], vec![]]);
    assert_eq!(parents[2].tags, Some(Vec::new()));
}

#[test]
fn test_limit_and_offset() {
    let db = family();
    let page = db
        .table::<Parent>()
        .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
        .order_by(Child::NAME)
        .select()
        .unwrap();
    assert_eq!(page.statements().len(), 2);

    let ids = |max, skip| -> Vec<i64> {
        db.table::<Parent>()
            .limit(max, skip)
            .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
            .order_by_desc(Parent::ID)
            .select()
            .unwrap()
            .all()
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect()
    };
    assert_eq!(ids(2, 0), [3, 2]);
    assert_eq!(ids(2, 1), [2, 1]);
    assert_eq!(ids(0, 2), [1]);
}

#[test]
fn test_first_and_lazy_iteration() {
    let db = family();
    let select = db
        .table::<Parent>()
        .filter(Parent::NAME.eq("p2"))
        .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
        .select()
        .unwrap();
    let first = select.first().unwrap().unwrap();
    assert_eq!(first.id, 2);
    assert_eq!(names(&first.children), ["c"]);

    let mut iter = select.iter().unwrap();
    assert!(iter.next().is_some());
    assert!(iter.next().is_none());
}

#[test]
fn test_missing_join_is_decode_error() {
    let db = family();
    let err = db.table::<Parent>().select().unwrap().all().unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

// ==================== Count Tests ====================

#[test]
fn test_count_matches_select() {
    let db = family();

    let all = db.table::<Parent>();
    assert_eq!(all.count().unwrap(), 3);

    let filtered = db.table::<Parent>().filter(Parent::ID.gt(1_i64));
    assert_eq!(filtered.count().unwrap(), 2);

    let joined = db
        .table::<Parent>()
        .join(Parent::CHILDREN, Parent::ID, Child::PARENT_ID)
        .filter(Child::NAME.ne("z"));
    let rows = joined.select().unwrap().all().unwrap();
    assert_eq!(joined.count().unwrap(), 2);
    assert_eq!(rows.len(), 2);
    assert_eq!(names(&rows.iter().find(|p| p.id == 1).unwrap().children), ["a", "b"]);
}

#[test]
fn test_null_filters() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    let samples = db.create::<Sample>(TableCreatePolicy::DEFAULT).unwrap();
    let mut with_note = sample(1);
    with_note.note = Some("hi".into());
    samples.insert(&[with_note, sample(2), sample(3)]).unwrap();

    assert_eq!(db.table::<Sample>().filter(Sample::NOTE.is_null()).count().unwrap(), 2);
    assert_eq!(
        db.table::<Sample>()
            .filter(Sample::NOTE.ne(Expr::null()))
            .count()
            .unwrap(),
        1
    );
}

// ==================== Write Tests ====================

#[test]
fn test_update_with_include() {
    let db = family();
    db.table::<Parent>()
        .filter(Parent::ID.eq(1_i64))
        .update_with(&parent(99, "renamed"), &[Parent::NAME.field_ref()], &[])
        .unwrap();
    let renamed = db
        .sql_select::<Child>(
            "SELECT id AS parent_id, name FROM parent WHERE id = ?1",
            &[Value::BigInt(1)],
        )
        .unwrap();
    assert_eq!(renamed, [child(1, "renamed")]);
}

#[test]
fn test_delete_with_filter() {
    let db = family();
    db.table::<Child>()
        .filter(Child::PARENT_ID.eq(1_i64))
        .delete()
        .unwrap();
    assert_eq!(db.table::<Child>().count().unwrap(), 1);
    assert_eq!(db.configuration().changes(), 2);
}

#[test]
fn test_insert_with_exclude_uses_defaults() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    db.sql(
        "CREATE TABLE child (parent_id INTEGER DEFAULT 7, name TEXT NOT NULL)",
        &[],
    )
    .unwrap();
    db.table::<Child>()
        .insert_with(
            &[child(1, "a"), child(2, "b")],
            &[],
            &[Child::PARENT_ID.field_ref()],
        )
        .unwrap();
    let rows = db
        .table::<Child>()
        .order_by(Child::NAME)
        .select()
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(rows, [child(7, "a"), child(7, "b")]);
}

// ==================== Value Round Trip Tests ====================

fn sample(id: i64) -> Sample {
    Sample {
        id,
        flag: true,
        small: -12,
        wide: 4_000_000_000,
        ratio: 1.5,
        score: -2.25,
        note: None,
        data: vec![0, 1, 255],
        uid: [7; 16],
        at: Timestamp::from_micros(1_700_000_000_000_000),
    }
}

#[test]
fn test_record_round_trip() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    let mut second = sample(2);
    second.flag = false;
    second.note = Some("note".into());
    second.data = Vec::new();
    db.create::<Sample>(TableCreatePolicy::DEFAULT)
        .unwrap()
        .insert(&[sample(1), second.clone()])
        .unwrap();

    let rows = db
        .table::<Sample>()
        .order_by(Sample::ID)
        .select()
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(rows, [sample(1), second]);
}

fn echo<T: FromValue>(conn: &SqliteConnection, value: Value) -> T {
    let mut stmt = conn.execution_delegate("SELECT ?1 AS v").unwrap();
    stmt.bind(&[Binding::new("?1", value)], 0).unwrap();
    assert!(stmt.has_next().unwrap());
    stmt.decode_row().unwrap().get_named("v").unwrap()
}

#[test]
fn test_literal_round_trip() {
    let conn = SqliteConnection::open_memory().unwrap();
    assert!(echo::<bool>(&conn, Value::Bool(true)));
    assert_eq!(echo::<i8>(&conn, Value::TinyInt(-3)), -3);
    assert_eq!(echo::<i64>(&conn, Value::BigInt(i64::MIN)), i64::MIN);
    assert_eq!(echo::<u64>(&conn, Value::Unsigned(42)), 42);
    assert_eq!(echo::<f32>(&conn, Value::Float(0.5)), 0.5);
    assert_eq!(echo::<f64>(&conn, Value::Double(1e300)), 1e300);
    assert_eq!(echo::<String>(&conn, Value::Decimal("12.50".into())), "12.50");
    assert_eq!(echo::<String>(&conn, Value::Text("héllo".into())), "héllo");
    assert_eq!(echo::<Vec<u8>>(&conn, Value::Bytes(vec![1, 2])), [1, 2]);
    assert_eq!(echo::<[u8; 16]>(&conn, Value::Uuid([9; 16])), [9; 16]);
    assert_eq!(
        echo::<Timestamp>(&conn, Value::Timestamp(123)),
        Timestamp::from_micros(123)
    );
    assert_eq!(echo::<Option<i64>>(&conn, Value::Null), None);
}

#[derive(Record, Debug, Clone, PartialEq)]
struct Counter {
    id: i64,
    hits: u64,
}

#[test]
fn test_unsigned_beyond_integer_range_rejected() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    let counters = db.create::<Counter>(TableCreatePolicy::DEFAULT).unwrap();

    let err = counters
        .insert(&[Counter {
            id: 1,
            hits: u64::MAX,
        }])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Query(ref e) if e.kind == QueryErrorKind::Bind
    ));
    assert_eq!(db.table::<Counter>().count().unwrap(), 0);

    let largest = Counter {
        id: 2,
        hits: u64::try_from(i64::MAX).unwrap(),
    };
    db.table::<Counter>()
        .insert(std::slice::from_ref(&largest))
        .unwrap();
    let stored = db.table::<Counter>().select().unwrap().all().unwrap();
    assert_eq!(stored, [largest]);
}

#[derive(Record, Debug, Clone, PartialEq)]
#[crud(table = "prices")]
struct Price {
    id: i64,
    amount: Decimal,
    discount: Option<Decimal>,
}

#[test]
fn test_decimal_round_trip_keeps_digits() {
    let db = Database::new(SqliteConnection::open_memory().unwrap());
    let prices = [
        Price {
            id: 1,
            amount: Decimal::new("12345678901234567890.123456789"),
            discount: Some(Decimal::new("0.10")),
        },
        Price {
            id: 2,
            amount: Decimal::new("0.1"),
            discount: None,
        },
    ];
    db.create::<Price>(TableCreatePolicy::DEFAULT)
        .unwrap()
        .insert(&prices)
        .unwrap();

    let stored = db
        .table::<Price>()
        .order_by(Price::ID)
        .select()
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(stored, prices);
}

// ==================== Transaction Tests ====================

#[test]
fn test_transaction_commits() {
    let db = family();
    let inserted = db
        .transaction(|db| {
            db.table::<Parent>().insert(&[parent(4, "p4")])?;
            db.table::<Parent>().count()
        })
        .unwrap();
    assert_eq!(inserted, 4);
    assert_eq!(db.table::<Parent>().count().unwrap(), 4);
}

#[test]
fn test_transaction_rolls_back() {
    let db = family();
    let err = db
        .transaction(|db| {
            db.table::<Parent>().insert(&[parent(4, "p4")])?;
            db.table::<Parent>().insert(&[parent(1, "dup")])
        })
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(db.table::<Parent>().count().unwrap(), 3);
}

#[test]
fn test_nested_begin_fails() {
    let db = family();
    let err = db
        .transaction(|db| db.transaction(|_| Ok(())))
        .unwrap_err();
    assert!(matches!(err, Error::Transaction(_)));
    assert_eq!(db.table::<Parent>().count().unwrap(), 3);
}
