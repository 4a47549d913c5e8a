//! Field kind inference from Rust types.
//!
//! The mapping is closed: every column type must have a `FromValue` and an
//! `Into<Value>` implementation in `sqlcrud-core`.

use syn::{Error, Expr, GenericArgument, Lit, PathArguments, Result, Type};

/// How a struct field maps onto the table.
#[derive(Debug, Clone)]
pub enum FieldShape {
    /// A stored column. `kind` names a `FieldKind` variant.
    Column { kind: &'static str, optional: bool },
    /// Related records filled by a join.
    Collection { item: Type, optional: bool },
}

impl FieldShape {
    pub fn is_column(&self) -> bool {
        matches!(self, FieldShape::Column { .. })
    }

    pub fn optional(&self) -> bool {
        match self {
            FieldShape::Column { optional, .. } | FieldShape::Collection { optional, .. } => {
                *optional
            }
        }
    }
}

/// Classify a field type.
///
/// `Option<T>` marks the field optional; `Vec<R>` (for any `R` other than
/// `u8`) is a collection of records.
pub fn classify(ty: &Type) -> Result<FieldShape> {
    if let Some(inner) = generic_argument(ty, "Option") {
        if generic_argument(inner, "Option").is_some() {
            return Err(Error::new_spanned(ty, "nested Option fields are not supported"));
        }
        return Ok(match classify(inner)? {
            FieldShape::Column { kind, .. } => FieldShape::Column {
                kind,
                optional: true,
            },
            FieldShape::Collection { item, .. } => FieldShape::Collection {
                item,
                optional: true,
            },
        });
    }

    if let Some(item) = generic_argument(ty, "Vec") {
        if last_ident(item).as_deref() == Some("u8") {
            return Ok(column("Blob"));
        }
        return Ok(FieldShape::Collection {
            item: item.clone(),
            optional: false,
        });
    }

    if is_uuid_array(ty) {
        return Ok(column("Uuid"));
    }

    let kind = match last_ident(ty).as_deref() {
        Some("bool") => "Bool",
        Some("i8") => "Int8",
        Some("i16") => "Int16",
        Some("i32") => "Int32",
        Some("i64") => "Int64",
        Some("u8") => "UInt8",
        Some("u16") => "UInt16",
        Some("u32") => "UInt32",
        Some("u64") => "UInt64",
        Some("f32") => "Float",
        Some("f64") => "Double",
        Some("String") => "Text",
        Some("Timestamp") => "Timestamp",
        Some("Decimal") => "Decimal",
        _ => {
            return Err(Error::new_spanned(
                ty,
                "unsupported field type; expected a scalar, String, Vec<u8>, [u8; 16], \
                 Timestamp, Decimal, Vec<Record> or an Option of one of these",
            ));
        }
    };
    Ok(column(kind))
}

fn column(kind: &'static str) -> FieldShape {
    FieldShape::Column {
        kind,
        optional: false,
    }
}

/// The single type argument of `wrapper<T>`, if `ty` is that wrapper.
fn generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn last_ident(ty: &Type) -> Option<String> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if !segment.arguments.is_none() {
        return None;
    }
    Some(segment.ident.to_string())
}

fn is_uuid_array(ty: &Type) -> bool {
    let Type::Array(array) = ty else {
        return false;
    };
    let Expr::Lit(len) = &array.len else {
        return false;
    };
    let Lit::Int(len) = &len.lit else {
        return false;
    };
    last_ident(&array.elem).as_deref() == Some("u8")
        && len.base10_parse::<usize>().is_ok_and(|n| n == 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn kind_of(ty: Type) -> (&'static str, bool) {
        match classify(&ty).unwrap() {
            FieldShape::Column { kind, optional } => (kind, optional),
            FieldShape::Collection { .. } => panic!("expected a column"),
        }
    }

    #[test]
    fn test_infer_primitives() {
        assert_eq!(kind_of(parse_quote!(i32)), ("Int32", false));
        assert_eq!(kind_of(parse_quote!(u64)), ("UInt64", false));
        assert_eq!(kind_of(parse_quote!(bool)), ("Bool", false));
        assert_eq!(kind_of(parse_quote!(f64)), ("Double", false));
    }

    #[test]
    fn test_infer_text_blob_uuid_timestamp() {
        assert_eq!(kind_of(parse_quote!(String)), ("Text", false));
        assert_eq!(kind_of(parse_quote!(Vec<u8>)), ("Blob", false));
        assert_eq!(kind_of(parse_quote!([u8; 16])), ("Uuid", false));
        assert_eq!(
            kind_of(parse_quote!(sqlcrud::Timestamp)),
            ("Timestamp", false)
        );
        assert_eq!(kind_of(parse_quote!(Decimal)), ("Decimal", false));
        assert_eq!(
            kind_of(parse_quote!(Option<sqlcrud::Decimal>)),
            ("Decimal", true)
        );
    }

    #[test]
    fn test_infer_option() {
        assert_eq!(kind_of(parse_quote!(Option<i64>)), ("Int64", true));
        assert_eq!(
            kind_of(parse_quote!(std::option::Option<String>)),
            ("Text", true)
        );
    }

    #[test]
    fn test_infer_collections() {
        let required = classify(&parse_quote!(Vec<Child>)).unwrap();
        assert!(!required.is_column());
        assert!(!required.optional());

        let optional = classify(&parse_quote!(Option<Vec<Tag>>)).unwrap();
        assert!(!optional.is_column());
        assert!(optional.optional());
    }

    #[test]
    fn test_rejects_unknown_types() {
        assert!(classify(&parse_quote!(char)).is_err());
        assert!(classify(&parse_quote!(HashMap<String, i64>)).is_err());
        assert!(classify(&parse_quote!(Option<Option<i64>>)).is_err());
        assert!(classify(&parse_quote!([u8; 8])).is_err());
    }
}
