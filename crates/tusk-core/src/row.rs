//! Rows returned by a data source.
//!
//! Selected columns are aliased to property names (or aggregate aliases), so
//! a row is looked up by member name rather than by storage field name.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column names shared by every row of one result set.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    positions: HashMap<String, usize>,
    order: Vec<String>,
}

impl ColumnInfo {
    pub fn new(order: Vec<String>) -> Self {
        let positions = order
            .iter()
            .cloned()
            .zip(0..)
            .collect();
        Self { positions, order }
    }

    pub fn position(&self, member: &str) -> Option<usize> {
        self.positions.get(member).copied()
    }
}

/// A single result row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// A row that owns its column names. Drivers reading a result set share
    /// one [`ColumnInfo`] through [`Row::with_columns`].
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(names)), values)
    }

    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// The value selected under `member`, if the row has that column.
    pub fn get_by_name(&self, member: &str) -> Option<&Value> {
        let at = self.columns.position(member)?;
        self.values.get(at)
    }

    /// Typed lookup. A missing column or a mismatched type names the column
    /// in the returned [`TypeError`].
    pub fn get_named<T: FromValue>(&self, member: &str) -> Result<T> {
        let Some(value) = self.get_by_name(member) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "missing column".to_string(),
                column: Some(member.to_string()),
            }));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(inner) => Error::Type(TypeError {
                column: Some(member.to_string()),
                ..inner
            }),
            other => other,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.order.iter().map(String::as_str).zip(&self.values)
    }
}

/// Conversion from a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            vec!["id".into(), "nickname".into(), "group_id".into()],
            vec![Value::Int(1), Value::from("Lenny"), Value::Null],
        )
    }

    #[test]
    fn lookup_by_name() {
        let row = sample();
        assert_eq!(row.get_by_name("nickname"), Some(&Value::from("Lenny")));
        assert_eq!(row.get_by_name("name"), None);
        let members: Vec<&str> = row.iter().map(|(member, _)| member).collect();
        assert_eq!(members, ["id", "nickname", "group_id"]);
    }

    #[test]
    fn typed_access_names_the_column() {
        let row = sample();
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_named::<Option<i64>>("group_id").unwrap(), None);
        for member in ["nickname", "missing"] {
            match row.get_named::<i64>(member).unwrap_err() {
                Error::Type(err) => assert_eq!(err.column.as_deref(), Some(member)),
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
