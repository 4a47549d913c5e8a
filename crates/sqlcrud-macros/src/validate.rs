//! Compile-time validation for the Record derive macro.
//!
//! All problems are collected and reported together.

use proc_macro2::Span;
use syn::Error;

use crate::parse::RecordDef;

pub fn validate_record(record: &RecordDef) -> Result<(), Error> {
    let mut errors = Vec::new();

    if record.columns().next().is_none() {
        errors.push(Error::new(
            record.name.span(),
            "Record struct must have at least one column field",
        ));
    }
    validate_identifier(&record.table_name, "table", record.name.span(), &mut errors);
    for field in &record.fields {
        validate_identifier(&field.column_name, "column", field.name.span(), &mut errors);
    }
    let keys: Vec<_> = record.fields.iter().filter(|f| f.primary_key).collect();
    for extra in keys.iter().skip(1) {
        errors.push(Error::new(
            extra.name.span(),
            "only one field can be marked #[crud(primary_key)]",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

/// Same rule as `sqlcrud_core::is_valid_identifier`.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_identifier(name: &str, what: &str, span: Span, errors: &mut Vec<Error>) {
    if !is_valid_identifier(name) {
        errors.push(Error::new(
            span,
            format!("invalid {} name '{}': use letters, digits and underscores", what, name),
        ));
    }
}
