//! Value encoding and decoding between tusk and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL). Values
//! bind to the closest one; timestamps bind as text in the same format the
//! DateTime property serializes to.

use libsqlite3_sys as ffi;
use std::ffi::{CStr, c_int};
use tusk_core::{Value, timestamp};

fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let bytes = text.as_bytes();
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind a Value to a prepared statement parameter.
///
/// Arrays have no SQLite form and report `SQLITE_MISMATCH`.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    match value {
        // SAFETY: caller guarantees stmt and index
        Value::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },
        Value::Bool(b) => unsafe { ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)) },
        Value::Int(v) => unsafe { ffi::sqlite3_bind_int(stmt, index, *v) },
        Value::BigInt(v) => unsafe { ffi::sqlite3_bind_int64(stmt, index, *v) },
        Value::Double(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, *v) },
        Value::Text(s) => bind_text(stmt, index, s),
        Value::Bytes(b) => unsafe {
            ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        },
        Value::Timestamp(micros) => bind_text(stmt, index, &timestamp::format(*micros)),
        Value::Array(_) => ffi::SQLITE_MISMATCH,
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees a current row
    let col_type = unsafe { ffi::sqlite3_column_type(stmt, index) };

    match col_type {
        ffi::SQLITE_INTEGER => {
            let v = unsafe { ffi::sqlite3_column_int64(stmt, index) };
            i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
        }

        ffi::SQLITE_FLOAT => Value::Double(unsafe { ffi::sqlite3_column_double(stmt, index) }),

        ffi::SQLITE_TEXT => {
            let ptr = unsafe { ffi::sqlite3_column_text(stmt, index) };
            let len = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
            if ptr.is_null() {
                Value::Null
            } else {
                // SAFETY: SQLite guarantees `len` readable bytes at `ptr`
                let slice = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize) };
                Value::Text(String::from_utf8_lossy(slice).into_owned())
            }
        }

        ffi::SQLITE_BLOB => {
            let ptr = unsafe { ffi::sqlite3_column_blob(stmt, index) };
            let len = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
            if ptr.is_null() || len == 0 {
                Value::Bytes(Vec::new())
            } else {
                // SAFETY: SQLite guarantees `len` readable bytes at `ptr`
                let slice = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize) };
                Value::Bytes(slice.to_vec())
            }
        }

        _ => Value::Null,
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null names are NUL-terminated and live until finalize
        unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
    }
}
