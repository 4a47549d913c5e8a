//! Expression AST for WHERE clauses and its renderer.

use std::fmt;
use std::sync::Arc;

use sqlcrud_core::{
    Error, Field, FieldRef, GenerationDelegate, GenerationErrorKind, Record, RecordType, Result,
    Timestamp, Value, resolve_field_reference,
};

use crate::state::{Command, QueryState};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// Producer behind [`Expr::Lazy`]. Called on every render.
#[derive(Clone)]
pub struct LazyExpr(Arc<dyn Fn() -> Expr + Send + Sync>);

impl LazyExpr {
    pub fn produce(&self) -> Expr {
        (self.0)()
    }
}

impl fmt::Debug for LazyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyExpr(..)")
    }
}

/// A boolean or scalar SQL expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A field of a record type, resolved through its field table.
    Field(FieldRef),
    /// A raw column name, quoted but never qualified.
    Column(String),
    /// A value bound as a statement parameter (NULL renders inline).
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Deferred sub-expression.
    Lazy(LazyExpr),
}

impl Expr {
    pub fn field<R: Record, T>(field: Field<R, T>) -> Self {
        Expr::Field(field.field_ref())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn lazy(producer: impl Fn() -> Expr + Send + Sync + 'static) -> Self {
        Expr::Lazy(LazyExpr(Arc::new(producer)))
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Render to SQL text, binding literals through `delegate`.
    ///
    /// Field references are qualified with their table alias only for
    /// Select and Count; the other commands address one unaliased table.
    pub fn render(
        &self,
        delegate: &mut dyn GenerationDelegate,
        state: &QueryState,
    ) -> Result<String> {
        match self {
            Expr::Field(field) => render_field(*field, delegate, state),
            Expr::Column(name) => delegate.quote_identifier(name),
            Expr::Literal(Value::Null) => Ok("NULL".to_string()),
            Expr::Literal(value) => delegate.bind(value.clone()),
            Expr::Binary { op, left, right } => {
                let lhs = left.render(delegate, state)?;
                match (op, right.as_ref()) {
                    (BinaryOp::Eq, Expr::Literal(Value::Null)) => Ok(format!("{} IS NULL", lhs)),
                    (BinaryOp::Ne, Expr::Literal(Value::Null)) => {
                        Ok(format!("{} IS NOT NULL", lhs))
                    }
                    _ => {
                        let rhs = right.render(delegate, state)?;
                        Ok(format!("{} {} {}", lhs, op.as_str(), rhs))
                    }
                }
            }
            Expr::Not(inner) => Ok(format!("NOT {}", inner.render(delegate, state)?)),
            Expr::Lazy(lazy) => lazy.produce().render(delegate, state),
        }
    }

    /// Every record type touched by a field reference, duplicates included.
    pub fn referenced_types(&self) -> Vec<RecordType> {
        let mut found = Vec::new();
        self.collect_types(&mut found);
        found
    }

    fn collect_types(&self, found: &mut Vec<RecordType>) {
        match self {
            Expr::Field(field) => found.push(field.record()),
            Expr::Column(_) | Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_types(found);
                right.collect_types(found);
            }
            Expr::Not(inner) => inner.collect_types(found),
            Expr::Lazy(lazy) => lazy.produce().collect_types(found),
        }
    }
}

fn render_field(
    field: FieldRef,
    delegate: &mut dyn GenerationDelegate,
    state: &QueryState,
) -> Result<String> {
    let column = resolve_field_reference(field).ok_or_else(|| {
        Error::generation(
            GenerationErrorKind::UnresolvedField,
            format!(
                "{} has no column named '{}'",
                field.record().type_name(),
                field.name()
            ),
        )
    })?;
    let quoted = delegate.quote_identifier(column)?;
    match state.command() {
        Command::Select | Command::Count => {
            let table = state.table_for(field.record()).ok_or_else(|| {
                Error::generation(
                    GenerationErrorKind::UnknownType,
                    format!(
                        "unknown type in where clause: {}",
                        field.record().type_name()
                    ),
                )
            })?;
            Ok(format!(
                "{}.{}",
                delegate.quote_identifier(&table.alias)?,
                quoted
            ))
        }
        _ => Ok(quoted),
    }
}

impl<R: Record, T> From<Field<R, T>> for Expr {
    fn from(field: Field<R, T>) -> Self {
        Expr::field(field)
    }
}

impl From<FieldRef> for Expr {
    fn from(field: FieldRef) -> Self {
        Expr::Field(field)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_from!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str, Vec<u8>, [u8; 16],
    Timestamp
);

impl<T: Into<Value>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        Expr::Literal(value.map_or(Value::Null, Into::into))
    }
}

/// Comparison builders on typed field handles.
///
/// ```ignore
/// db.table::<Parent>().filter(Parent::NAME.eq("ada").and(Parent::AGE.gt(30)))
/// ```
pub trait FieldExpr {
    fn eq(self, other: impl Into<Expr>) -> Expr;
    fn ne(self, other: impl Into<Expr>) -> Expr;
    fn lt(self, other: impl Into<Expr>) -> Expr;
    fn le(self, other: impl Into<Expr>) -> Expr;
    fn gt(self, other: impl Into<Expr>) -> Expr;
    fn ge(self, other: impl Into<Expr>) -> Expr;
    fn is_null(self) -> Expr;
    fn is_not_null(self) -> Expr;
}

impl<R: Record, T> FieldExpr for Field<R, T> {
    fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).eq(other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).ne(other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).lt(other)
    }

    fn le(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).le(other)
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).gt(other)
    }

    fn ge(self, other: impl Into<Expr>) -> Expr {
        Expr::field(self).ge(other)
    }

    fn is_null(self) -> Expr {
        Expr::field(self).eq(Expr::null())
    }

    fn is_not_null(self) -> Expr {
        Expr::field(self).ne(Expr::null())
    }
}
