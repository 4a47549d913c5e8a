//! SQL dialects and the stock generation delegate.

use sqlcrud_core::{
    Binding, Error, FieldKind, GenerationDelegate, Result, SchemaErrorKind, TableCreatePolicy,
    TableStructure, Value, quote_ident, quote_ident_mysql,
};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite dialect (uses ?1, ?2 placeholders)
    #[default]
    Sqlite,
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    Postgres,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => quote_ident(name),
            Dialect::Mysql => quote_ident_mysql(name),
        }
    }

    /// Column type for a field kind.
    pub fn column_type(self, kind: FieldKind, primary_key: bool) -> Result<&'static str> {
        let ty = match (self, kind) {
            (_, FieldKind::Collection(_)) => {
                return Err(Error::schema(
                    SchemaErrorKind::Invalid,
                    "collection fields have no column type",
                ));
            }

            (Dialect::Sqlite, FieldKind::Float | FieldKind::Double) => "REAL",
            (Dialect::Sqlite, FieldKind::Text | FieldKind::Decimal) => "TEXT",
            (Dialect::Sqlite, FieldKind::Blob | FieldKind::Uuid) => "BLOB",
            (Dialect::Sqlite, _) => "INTEGER",

            (Dialect::Postgres, FieldKind::Bool) => "BOOLEAN",
            (Dialect::Postgres, FieldKind::Int8 | FieldKind::Int16 | FieldKind::UInt8) => {
                "SMALLINT"
            }
            (Dialect::Postgres, FieldKind::Int32 | FieldKind::UInt16) => "INTEGER",
            (
                Dialect::Postgres,
                FieldKind::Int64 | FieldKind::UInt32 | FieldKind::Timestamp,
            ) => "BIGINT",
            (Dialect::Postgres, FieldKind::UInt64) => "NUMERIC(20)",
            (Dialect::Postgres, FieldKind::Float) => "REAL",
            (Dialect::Postgres, FieldKind::Double) => "DOUBLE PRECISION",
            (Dialect::Postgres, FieldKind::Decimal) => "NUMERIC",
            (Dialect::Postgres, FieldKind::Text) => "TEXT",
            (Dialect::Postgres, FieldKind::Blob) => "BYTEA",
            (Dialect::Postgres, FieldKind::Uuid) => "UUID",

            (Dialect::Mysql, FieldKind::Bool) => "TINYINT(1)",
            (Dialect::Mysql, FieldKind::Int8) => "TINYINT",
            (Dialect::Mysql, FieldKind::Int16) => "SMALLINT",
            (Dialect::Mysql, FieldKind::Int32) => "INT",
            (Dialect::Mysql, FieldKind::Int64 | FieldKind::Timestamp) => "BIGINT",
            (Dialect::Mysql, FieldKind::UInt8) => "TINYINT UNSIGNED",
            (Dialect::Mysql, FieldKind::UInt16) => "SMALLINT UNSIGNED",
            (Dialect::Mysql, FieldKind::UInt32) => "INT UNSIGNED",
            (Dialect::Mysql, FieldKind::UInt64) => "BIGINT UNSIGNED",
            (Dialect::Mysql, FieldKind::Float) => "FLOAT",
            (Dialect::Mysql, FieldKind::Double) => "DOUBLE",
            (Dialect::Mysql, FieldKind::Decimal) => "DECIMAL(65,30)",
            // TEXT cannot be a key without a prefix length
            (Dialect::Mysql, FieldKind::Text) if primary_key => "VARCHAR(255)",
            (Dialect::Mysql, FieldKind::Text) => "TEXT",
            (Dialect::Mysql, FieldKind::Blob) => "BLOB",
            (Dialect::Mysql, FieldKind::Uuid) => "BINARY(16)",
        };
        Ok(ty)
    }
}

/// Generation delegate driven entirely by a [`Dialect`].
#[derive(Debug, Clone, Default)]
pub struct StandardGenDelegate {
    dialect: Dialect,
    bindings: Vec<Binding>,
}

impl StandardGenDelegate {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            bindings: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn create_table(
        &self,
        table: &TableStructure,
        policy: TableCreatePolicy,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let name = self.dialect.quote_identifier(table.table);
        if policy.drop_table {
            out.push(format!("DROP TABLE IF EXISTS {}", name));
        }
        let columns = table
            .columns
            .iter()
            .map(|column| {
                let mut def = format!(
                    "{} {}",
                    self.dialect.quote_identifier(column.name),
                    self.dialect.column_type(column.kind, column.primary_key)?
                );
                if column.primary_key {
                    def.push_str(" PRIMARY KEY");
                } else if !column.optional {
                    def.push_str(" NOT NULL");
                }
                Ok(def)
            })
            .collect::<Result<Vec<_>>>()?;
        out.push(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            name,
            columns.join(", ")
        ));
        if !policy.shallow {
            for sub in &table.sub_tables {
                self.create_table(sub, policy, out)?;
            }
        }
        Ok(())
    }
}

impl GenerationDelegate for StandardGenDelegate {
    fn bind(&mut self, value: Value) -> Result<String> {
        let placeholder = self.dialect.placeholder(self.bindings.len() + 1);
        self.bindings.push(Binding::new(placeholder.clone(), value));
        Ok(placeholder)
    }

    fn take_bindings(&mut self) -> Vec<Binding> {
        std::mem::take(&mut self.bindings)
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        Ok(self.dialect.quote_identifier(name))
    }

    fn limit_clause(&mut self, max: usize, skip: usize) -> String {
        match (self.dialect, max, skip) {
            (_, 0, 0) => String::new(),
            (_, max, 0) => format!("LIMIT {}", max),
            (Dialect::Sqlite, 0, skip) => format!("LIMIT -1 OFFSET {}", skip),
            (Dialect::Mysql, 0, skip) => format!("LIMIT {} OFFSET {}", u64::MAX, skip),
            (Dialect::Postgres, 0, skip) => format!("OFFSET {}", skip),
            (_, max, skip) => format!("LIMIT {} OFFSET {}", max, skip),
        }
    }

    fn create_table_statements(
        &mut self,
        table: &TableStructure,
        policy: TableCreatePolicy,
    ) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.create_table(table, policy, &mut out)?;
        Ok(out)
    }

    fn create_index_statements(
        &mut self,
        table: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<Vec<String>> {
        if columns.is_empty() {
            return Err(Error::schema(
                SchemaErrorKind::Invalid,
                format!("index on {} needs at least one column", table),
            ));
        }
        let index_name = format!("index_{}_{}", table, columns.join("_"));
        let quoted = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let if_not_exists = match self.dialect {
            Dialect::Mysql => "",
            Dialect::Sqlite | Dialect::Postgres => "IF NOT EXISTS ",
        };
        Ok(vec![format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            if_not_exists,
            self.dialect.quote_identifier(&index_name),
            self.dialect.quote_identifier(table),
            quoted
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Child, Parent};
    use sqlcrud_core::Record;

    // ==================== Placeholder Tests ====================

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?3");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
    }

    #[test]
    fn test_bind_numbers_from_one_after_take() {
        let mut delegate = StandardGenDelegate::new(Dialect::Postgres);
        assert_eq!(delegate.bind(Value::Int(1)).unwrap(), "$1");
        assert_eq!(delegate.bind(Value::Int(2)).unwrap(), "$2");
        assert_eq!(delegate.take_bindings().len(), 2);
        assert_eq!(delegate.bind(Value::Int(3)).unwrap(), "$1");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("order"), "`order`");
    }

    // ==================== Limit Tests ====================

    #[test]
    fn test_limit_clauses() {
        let mut sqlite = StandardGenDelegate::new(Dialect::Sqlite);
        assert_eq!(sqlite.limit_clause(0, 0), "");
        assert_eq!(sqlite.limit_clause(5, 0), "LIMIT 5");
        assert_eq!(sqlite.limit_clause(5, 10), "LIMIT 5 OFFSET 10");
        assert_eq!(sqlite.limit_clause(0, 10), "LIMIT -1 OFFSET 10");

        let mut postgres = StandardGenDelegate::new(Dialect::Postgres);
        assert_eq!(postgres.limit_clause(0, 10), "OFFSET 10");
    }

    // ==================== DDL Tests ====================

    #[test]
    fn test_create_table_sqlite() {
        let table =
            TableStructure::of(Parent::record_type(), None, TableCreatePolicy::DEFAULT).unwrap();
        let mut delegate = StandardGenDelegate::new(Dialect::Sqlite);
        let statements = delegate
            .create_table_statements(&table, TableCreatePolicy::DEFAULT)
            .unwrap();
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS \"parent\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT NOT NULL)"
        );
        assert!(statements.iter().any(|s| s.contains("\"child\"")));
    }

    #[test]
    fn test_create_table_drop_and_shallow() {
        let policy = TableCreatePolicy::DEFAULT.shallow().drop_table();
        let table = TableStructure::of(Parent::record_type(), None, policy).unwrap();
        let mut delegate = StandardGenDelegate::new(Dialect::Postgres);
        let statements = delegate.create_table_statements(&table, policy).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "DROP TABLE IF EXISTS \"parent\"");
        assert!(statements[1].contains("\"id\" BIGINT PRIMARY KEY"));
    }

    #[test]
    fn test_create_table_child_optional_column() {
        let table =
            TableStructure::of(Child::record_type(), None, TableCreatePolicy::DEFAULT).unwrap();
        let mut delegate = StandardGenDelegate::new(Dialect::Mysql);
        let statements = delegate
            .create_table_statements(&table, TableCreatePolicy::DEFAULT)
            .unwrap();
        assert_eq!(
            statements,
            ["CREATE TABLE IF NOT EXISTS `child` (`parent_id` BIGINT NOT NULL, `name` TEXT NOT NULL)"]
        );
    }

    #[test]
    fn test_create_index() {
        let mut delegate = StandardGenDelegate::new(Dialect::Sqlite);
        let statements = delegate
            .create_index_statements("child", &["parent_id", "name"], true)
            .unwrap();
        assert_eq!(
            statements,
            ["CREATE UNIQUE INDEX IF NOT EXISTS \"index_child_parent_id_name\" ON \"child\" (\"parent_id\", \"name\")"]
        );
        assert!(delegate.create_index_statements("child", &[], false).is_err());
    }
}
