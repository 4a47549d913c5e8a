//! Hand-written records shared by the unit tests.

use sqlcrud_core::{Field, FieldInfo, FieldKind, Record, RecordReader, Result, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Parent {
    pub id: i64,
    pub name: String,
    pub children: Vec<Child>,
    pub tags: Option<Vec<Tag>>,
}

impl Parent {
    pub const ID: Field<Parent, i64> = Field::new("id");
    pub const NAME: Field<Parent, String> = Field::new("name");
    pub const CHILDREN: Field<Parent, Vec<Child>> = Field::new("children");
    pub const TAGS: Field<Parent, Option<Vec<Tag>>> = Field::new("tags");
}

impl Record for Parent {
    const TABLE_NAME: &'static str = "parent";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 4] = [
            FieldInfo::new("id", FieldKind::Int64),
            FieldInfo::new("name", FieldKind::Text),
            FieldInfo::new("children", FieldKind::Collection(Child::record_type)),
            FieldInfo::new("tags", FieldKind::Collection(Tag::record_type)).optional(true),
        ];
        &FIELDS
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_reader(reader: &RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            id: reader.get("id")?,
            name: reader.get("name")?,
            children: reader.collection("children")?,
            tags: reader.optional_collection("tags")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub parent_id: i64,
    pub name: String,
}

impl Child {
    pub const PARENT_ID: Field<Child, i64> = Field::new("parent_id");
    pub const NAME: Field<Child, String> = Field::new("name");
}

impl Record for Child {
    const TABLE_NAME: &'static str = "child";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 2] = [
            FieldInfo::new("parent_id", FieldKind::Int64),
            FieldInfo::new("name", FieldKind::Text),
        ];
        &FIELDS
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("parent_id", self.parent_id.into()),
            ("name", self.name.clone().into()),
        ]
    }

    fn from_reader(reader: &RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            parent_id: reader.get("parent_id")?,
            name: reader.get("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Tag {
    pub const ID: Field<Tag, i64> = Field::new("id");
    pub const LABEL: Field<Tag, String> = Field::new("label");
}

impl Record for Tag {
    const TABLE_NAME: &'static str = "tag";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 2] = [
            FieldInfo::new("id", FieldKind::Int64),
            FieldInfo::new("label", FieldKind::Text),
        ];
        &FIELDS
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("label", self.label.clone().into())]
    }

    fn from_reader(reader: &RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            id: reader.get("id")?,
            label: reader.get("label")?,
        })
    }
}

/// Junction between [`Parent`] and [`Tag`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParentTag {
    pub parent_id: i64,
    pub tag_id: i64,
}

impl ParentTag {
    pub const PARENT_ID: Field<ParentTag, i64> = Field::new("parent_id");
    pub const TAG_ID: Field<ParentTag, i64> = Field::new("tag_id");
}

impl Record for ParentTag {
    const TABLE_NAME: &'static str = "parent_tag";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: [FieldInfo; 2] = [
            FieldInfo::new("parent_id", FieldKind::Int64),
            FieldInfo::new("tag_id", FieldKind::Int64),
        ];
        &FIELDS
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("parent_id", self.parent_id.into()),
            ("tag_id", self.tag_id.into()),
        ]
    }

    fn from_reader(reader: &RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            parent_id: reader.get("parent_id")?,
            tag_id: reader.get("tag_id")?,
        })
    }
}
