//! SQLite connection for tusk.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! [`SqliteConnection`] implements the synchronous [`tusk_core::Connection`]
//! trait over `libsqlite3-sys` with a bundled SQLite.
//!
//! ```rust,ignore
//! use tusk_core::{Connection, Value};
//! use tusk_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! let id = conn.insert("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")])?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage class |
//! |-------|----------------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Timestamp` | TEXT (`YYYY-MM-DD HH:MM:SS[.ffffff]`) |
//! | `Null` | NULL |
//!
//! Integers read back as `Int` when they fit in 32 bits and `BigInt`
//! otherwise; properties widen them on deserialize.

pub mod connection;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection};

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> String {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    #[test]
    fn reports_version() {
        assert!(super::sqlite_version().starts_with('3'));
    }
}
