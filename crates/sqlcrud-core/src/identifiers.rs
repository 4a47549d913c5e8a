//! SQL identifier quoting and validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::Result;
use crate::error::{Error, SchemaErrorKind};

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use sqlcrud_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| {
            unreachable!("identifier pattern is a valid regex: {e}")
        })
    })
}

/// Whether `name` is a plain identifier (letters, digits, underscores, not
/// starting with a digit).
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Reject table and column names that are not plain identifiers.
///
/// Quoting would make any string safe, but record tables feed index names
/// and DDL where odd characters are almost always a declaration mistake.
pub fn validate_identifier(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::schema(
            SchemaErrorKind::InvalidIdentifier,
            format!("'{}' is not a valid table or column name", name),
        ))
    }
}
