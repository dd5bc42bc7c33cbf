//! The storage connection seam.
//!
//! A [`Connection`] executes already-rendered SQL with positional
//! parameters. Calls are synchronous and block until the driver returns.
//! The trait is object safe so a data source can hold any driver behind a
//! `Box<dyn Connection>`.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A synchronous database connection.
pub trait Connection {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the last inserted row id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Execute one or more statements without parameters (DDL, pragmas).
    fn execute_raw(&self, sql: &str) -> Result<()>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        (**self).insert(sql, params)
    }

    fn execute_raw(&self, sql: &str) -> Result<()> {
        (**self).execute_raw(sql)
    }
}
