//! Sort orders.

use std::cmp::Ordering;
use std::sync::Arc;
use tusk_core::{ConfigErrorKind, Error, Property, Result, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Parse `asc`/`desc`, case-insensitively.
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(Error::config(
                ConfigErrorKind::InvalidDirection,
                None,
                format!("unknown sort direction '{other}'"),
            )),
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone)]
pub struct Order {
    pub property: Arc<Property>,
    pub direction: Direction,
}

impl Order {
    pub fn new(property: Arc<Property>, direction: Direction) -> Self {
        Self {
            property,
            direction,
        }
    }

    /// Compare two values under this order. NULL sorts first ascending.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = a.sort_cmp(b);
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }

    pub fn same_as(&self, other: &Order) -> bool {
        self.direction == other.direction
            && self.property.name == other.property.name
            && self.property.entity == other.property.entity
    }
}

/// Order builders for properties.
pub trait Sortable {
    fn asc(&self) -> Order;
    fn desc(&self) -> Order;
}

impl Sortable for Arc<Property> {
    fn asc(&self) -> Order {
        Order::new(Arc::clone(self), Direction::Asc)
    }

    fn desc(&self) -> Order {
        Order::new(Arc::clone(self), Direction::Desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions() {
        let name = Arc::new(Property::string("name"));
        assert_eq!(name.asc().direction, Direction::Asc);
        assert_eq!(name.desc().direction, Direction::Desc);
        assert_eq!(Direction::parse("DESC").unwrap(), Direction::Desc);
        assert_eq!(
            Direction::parse("sideways").unwrap_err().config_kind(),
            Some(ConfigErrorKind::InvalidDirection)
        );
    }

    #[test]
    fn nulls_first_ascending() {
        let age = Arc::new(Property::integer("age"));
        let mut values = vec![Value::BigInt(3), Value::Null, Value::Int(1)];
        values.sort_by(|a, b| age.asc().compare(a, b));
        assert_eq!(values, [Value::Null, Value::Int(1), Value::BigInt(3)]);
        values.sort_by(|a, b| age.desc().compare(a, b));
        assert_eq!(values, [Value::BigInt(3), Value::Int(1), Value::Null]);
    }
}
