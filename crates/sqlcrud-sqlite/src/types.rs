//! Conversion between [`Value`] and SQLite's storage classes.
//!
//! SQLite has five storage classes (NULL, INTEGER, REAL, TEXT, BLOB).
//! Booleans, timestamps and every integer width bind as INTEGER, decimals
//! bind as TEXT and UUIDs as a 16-byte BLOB. INTEGER is a signed 64-bit
//! type, so unsigned values above `i64::MAX` are refused rather than bound.

use crate::ffi;
use sqlcrud_core::Value;
use std::ffi::{CStr, c_int};
use std::string::FromUtf8Error;

/// Returns the unsigned value when it cannot be stored as a SQLite INTEGER.
pub fn unsigned_overflow(value: &Value) -> Option<u64> {
    match value {
        Value::Unsigned(v) if i64::try_from(*v).is_err() => Some(*v),
        _ => None,
    }
}

/// Bind `value` to parameter `index` (1-based) of `stmt`.
///
/// # Safety
///
/// `stmt` must be a valid, non-finalized prepared statement. Values for
/// which [`unsigned_overflow`] is `Some` are rejected with `SQLITE_RANGE`.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: the caller guarantees `stmt` is live; text and blob data is
    // copied by SQLite because of the transient destructor.
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) | Value::Timestamp(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Unsigned(v) => match i64::try_from(*v) {
                Ok(signed) => ffi::sqlite3_bind_int64(stmt, index, signed),
                Err(_) => ffi::SQLITE_RANGE,
            },
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Decimal(s) | Value::Text(s) => ffi::sqlite3_bind_text(
                stmt,
                index,
                s.as_ptr().cast(),
                s.len() as c_int,
                ffi::transient(),
            ),
            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::transient(),
            ),
            Value::Uuid(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::transient(),
            ),
        }
    }
}

/// Read column `index` (0-based) of the current row.
///
/// INTEGER columns come back as the narrowest of `Int`/`BigInt` that fits.
/// TEXT that is not valid UTF-8 is an error, never a lossy rewrite.
///
/// # Safety
///
/// `stmt` must be a valid statement positioned on a row.
pub unsafe fn read_column(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
) -> Result<Value, FromUtf8Error> {
    // SAFETY: the caller guarantees `stmt` is live and on a row. Pointers
    // returned by sqlite3_column_* stay valid until the next step, and the
    // data is copied out before returning.
    unsafe {
        let value = match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
            }
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Text(String::new())
                } else {
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Text(String::from_utf8(bytes.to_vec())?)
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(bytes.to_vec())
                }
            }
            _ => Value::Null,
        };
        Ok(value)
    }
}

/// Name of result column `index` (0-based).
///
/// # Safety
///
/// `stmt` must be a valid prepared statement.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: the caller guarantees `stmt` is live; the name is copied.
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}

/// Declared SQLite storage class for a value, used in log output.
pub fn storage_class(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_)
        | Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::BigInt(_)
        | Value::Unsigned(_)
        | Value::Timestamp(_) => "INTEGER",
        Value::Float(_) | Value::Double(_) => "REAL",
        Value::Decimal(_) | Value::Text(_) => "TEXT",
        Value::Bytes(_) | Value::Uuid(_) => "BLOB",
    }
}
