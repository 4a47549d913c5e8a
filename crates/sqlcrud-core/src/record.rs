//! Record reflection.
//!
//! Every record type exposes a static, declaration-ordered field table
//! (usually generated by `#[derive(Record)]`). Query building, SQL generation
//! and row decoding all go through that table: a typed [`Field`] handle is
//! resolved to a column name by looking it up, never by inspecting a live
//! instance.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::Result;
use crate::error::{DecodeErrorKind, Error, TypeError};
use crate::identifiers::validate_identifier;
use crate::row::{FromValue, Row};
use crate::value::{Timestamp, Value};

/// Declared kind of a record field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Decimal,
    Text,
    Blob,
    Uuid,
    Timestamp,
    /// Zero or more related records, populated by a join rather than a column.
    Collection(fn() -> RecordType),
}

impl FieldKind {
    pub const fn is_collection(&self) -> bool {
        matches!(self, FieldKind::Collection(_))
    }

    /// The related record type of a collection field.
    pub fn related(&self) -> Option<RecordType> {
        match self {
            FieldKind::Collection(related) => Some(related()),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int8 => "int8",
            FieldKind::Int16 => "int16",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::UInt8 => "uint8",
            FieldKind::UInt16 => "uint16",
            FieldKind::UInt32 => "uint32",
            FieldKind::UInt64 => "uint64",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::Decimal => "decimal",
            FieldKind::Text => "text",
            FieldKind::Blob => "blob",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Collection(_) => "collection",
        }
    }
}

/// One entry of a record's field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    pub name: &'static str,
    pub kind: FieldKind,
    pub optional: bool,
    pub primary_key: bool,
}

impl FieldInfo {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            primary_key: false,
        }
    }

    pub const fn optional(mut self, value: bool) -> Self {
        self.optional = value;
        self
    }

    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Whether this field maps to a column of the record's own table.
    pub const fn is_column(&self) -> bool {
        !self.kind.is_collection()
    }
}

/// Type-erased descriptor of a record type.
///
/// Equality and hashing use the Rust `TypeId` only, so two descriptors of the
/// same type always compare equal no matter where they were produced.
#[derive(Clone, Copy)]
pub struct RecordType {
    type_id: TypeId,
    type_name: &'static str,
    table_name: &'static str,
    fields: fn() -> &'static [FieldInfo],
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
            table_name: R::TABLE_NAME,
            fields: R::fields,
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.table_name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &'static [FieldInfo] {
        (self.fields)()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldInfo> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Fields stored as columns, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &'static FieldInfo> {
        self.fields().iter().filter(|f| f.is_column())
    }

    /// Fields populated by joins, in declaration order.
    pub fn collections(&self) -> impl Iterator<Item = &'static FieldInfo> {
        self.fields().iter().filter(|f| f.kind.is_collection())
    }

    /// The field marked as primary key, else a column named `id`.
    pub fn primary_key(&self) -> Option<&'static FieldInfo> {
        self.columns()
            .find(|f| f.primary_key)
            .or_else(|| self.columns().find(|f| f.name == "id"))
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("type", &self.type_name)
            .field("table", &self.table_name)
            .finish()
    }
}

/// A typed handle on one field of record `R` holding values of type `T`.
///
/// Derived records expose one of these per field as an associated constant,
/// e.g. `Parent::ID`.
pub struct Field<R, T> {
    name: &'static str,
    _marker: PhantomData<fn() -> (R, T)>,
}

impl<R, T> Field<R, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<R: Record, T> Field<R, T> {
    /// Erase the value type.
    pub fn field_ref(&self) -> FieldRef {
        FieldRef::new(RecordType::of::<R>(), self.name)
    }
}

impl<R, T> Clone for Field<R, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, T> Copy for Field<R, T> {}

impl<R, T> fmt::Debug for Field<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.name)
    }
}

/// A field reference with its record type attached but its value type erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    record: RecordType,
    name: &'static str,
}

impl FieldRef {
    pub fn new(record: RecordType, name: &'static str) -> Self {
        Self { record, name }
    }

    pub fn record(&self) -> RecordType {
        self.record
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn info(&self) -> Option<&'static FieldInfo> {
        self.record.field(self.name)
    }
}

impl<R: Record, T> From<Field<R, T>> for FieldRef {
    fn from(field: Field<R, T>) -> Self {
        field.field_ref()
    }
}

/// All fields of `record` in declaration order.
pub fn fields_of(record: RecordType) -> &'static [FieldInfo] {
    record.fields()
}

/// Column name for a field reference.
///
/// Returns `None` when the record declares no such field or when the field
/// is a collection, which has no column of its own.
pub fn resolve_field_reference(field: FieldRef) -> Option<&'static str> {
    field
        .info()
        .filter(|info| info.is_column())
        .map(|info| info.name)
}

/// Check that a record's table and column names are plain identifiers.
pub fn validate_record(record: RecordType) -> Result<()> {
    validate_identifier(record.table_name())?;
    for field in record.fields() {
        validate_identifier(field.name)?;
    }
    Ok(())
}

/// Kinds of values a join key can hold.
///
/// The set is closed: merge filtering normalizes key columns by the declared
/// kind before comparing, so every kind needs its own normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Text,
    Timestamp,
    Blob,
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types usable as join keys.
///
/// `Base` strips `Option` so an optional key on one side of a join matches a
/// required key of the same type on the other.
pub trait KeyType: sealed::Sealed {
    type Base;
    const KIND: KeyKind;
}

macro_rules! key_types {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl KeyType for $ty {
                type Base = $ty;
                const KIND: KeyKind = KeyKind::$kind;
            }
        )*
    };
}

key_types!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    u64 => UInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Blob,
    Timestamp => Timestamp,
);

impl<T: KeyType> sealed::Sealed for Option<T> {}

impl<T: KeyType> KeyType for Option<T> {
    type Base = T::Base;
    const KIND: KeyKind = T::KIND;
}

/// Field types that hold related records.
pub trait Collection {
    type Item: Record;
}

impl<R: Record> Collection for Vec<R> {
    type Item = R;
}

impl<R: Record> Collection for Option<Vec<R>> {
    type Item = R;
}

/// A record type mapped to a table.
pub trait Record: Sized + 'static {
    const TABLE_NAME: &'static str;

    /// Field table in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Encode the column fields of this instance. Collection fields are
    /// never included.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Decode an instance from the reader's current row.
    fn from_reader(reader: &RecordReader<'_>) -> Result<Self>;

    fn record_type() -> RecordType {
        RecordType::of::<Self>()
    }
}

/// Supplies related rows for collection fields while a root row decodes.
pub trait CollectionSource {
    /// Rows related to `root` through the join feeding `field` of `record`.
    ///
    /// `Ok(None)` means no join populates that field.
    fn related_rows<'s>(
        &'s self,
        record: RecordType,
        field: &str,
        root: &Row,
    ) -> Result<Option<Vec<&'s Row>>>;
}

/// Decoding view over one row, handed to [`Record::from_reader`].
pub struct RecordReader<'a> {
    record: RecordType,
    row: &'a Row,
    collections: Option<&'a dyn CollectionSource>,
}

impl<'a> RecordReader<'a> {
    pub fn new(record: RecordType, row: &'a Row) -> Self {
        Self {
            record,
            row,
            collections: None,
        }
    }

    pub fn with_collections(
        record: RecordType,
        row: &'a Row,
        collections: &'a dyn CollectionSource,
    ) -> Self {
        Self {
            record,
            row,
            collections: Some(collections),
        }
    }

    pub fn row(&self) -> &Row {
        self.row
    }

    /// Decode a column field.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.row.get_by_name(name) else {
            return Err(Error::decode(
                DecodeErrorKind::MissingColumn,
                self.record.table_name(),
                name,
                "row has no such column",
            ));
        };
        T::from_value(value).map_err(|e| match e {
            Error::Type(te) => Error::Type(TypeError {
                column: Some(name.to_string()),
                rust_type: Some(std::any::type_name::<T>()),
                ..te
            }),
            e => e,
        })
    }

    /// Decode a required collection field. Fails when no join populates it.
    pub fn collection<C: Record>(&self, name: &str) -> Result<Vec<C>> {
        self.optional_collection(name)?.ok_or_else(|| {
            Error::decode(
                DecodeErrorKind::MissingJoin,
                self.record.table_name(),
                name,
                "collection field has no matching join",
            )
        })
    }

    /// Decode an optional collection field: `None` when no join populates it.
    pub fn optional_collection<C: Record>(&self, name: &str) -> Result<Option<Vec<C>>> {
        let Some(source) = self.collections else {
            return Ok(None);
        };
        let Some(rows) = source.related_rows(self.record, name, self.row)? else {
            return Ok(None);
        };
        let related = RecordType::of::<C>();
        rows.into_iter()
            .map(|row| C::from_reader(&RecordReader::new(related, row)))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Decode a record from a row that carries no joined collections.
pub fn decode_row<R: Record>(row: &Row) -> Result<R> {
    R::from_reader(&RecordReader::new(RecordType::of::<R>(), row))
}
