//! Parsing logic for the Record derive macro.
//!
//! Extracts the struct-level `#[crud(table = "...")]` attribute and the
//! field-level `#[crud(primary_key)]` flag into [`RecordDef`].

use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, Lit, Result, Type};

use crate::infer::{FieldShape, classify};

/// Parsed record definition from a struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    pub name: Ident,
    /// Defaults to the snake_case struct name.
    pub table_name: String,
    pub fields: Vec<FieldDef>,
}

/// Parsed field definition.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    /// Column name, with any `r#` prefix removed.
    pub column_name: String,
    pub ty: Type,
    pub shape: FieldShape,
    pub primary_key: bool,
}

impl RecordDef {
    pub fn columns(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.shape.is_column())
    }
}

pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    let name = input.ident.clone();
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let table_name =
        parse_struct_attrs(&input.attrs)?.unwrap_or_else(|| to_snake_case(&name.to_string()));

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not unions",
            ));
        }
    };

    Ok(RecordDef {
        name,
        table_name,
        fields,
    })
}

fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table_name: Option<String> = None;
    for attr in attrs {
        if !attr.path().is_ident("crud") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table_name.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate crud attribute: table",
                    ));
                }
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    table_name = Some(lit_str.value());
                    Ok(())
                } else {
                    Err(Error::new_spanned(
                        value,
                        "expected string literal for table name",
                    ))
                }
            } else {
                Err(meta.error("unknown crud attribute on struct"))
            }
        })?;
    }
    Ok(table_name)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                // word boundary, or the last capital of an acronym
                let should_underscore = prev.is_lowercase()
                    || (prev.is_uppercase() && next.is_some_and(|n| n.is_lowercase()));
                if should_underscore {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Record requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Record requires a struct with fields, not a unit struct",
        )),
    }
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let ty = field.ty.clone();
    let shape = classify(&ty)?;

    let mut primary_key = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("crud") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                primary_key = true;
                Ok(())
            } else {
                Err(meta.error("unknown crud attribute on field"))
            }
        })?;
    }

    if primary_key && !shape.is_column() {
        return Err(Error::new_spanned(
            &field.ty,
            "a collection field cannot be the primary key",
        ));
    }

    Ok(FieldDef {
        column_name: name.unraw().to_string(),
        name,
        ty,
        shape,
        primary_key,
    })
}
