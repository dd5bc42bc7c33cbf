//! Aggregate functions.
//!
//! An [`Aggregator`] is a query field computing COUNT, SUM, AVG, MIN or MAX.
//! Each one owns a result alias (`count`, `sum_age`, `average_age`, ...)
//! used both as the SQL column alias and as the cache key on collections.
//! Aggregators also compute over values already in memory, which is how a
//! loaded collection answers without a round trip.

use std::sync::Arc;
use tusk_core::{Error, Property, QueryError, QueryErrorKind, Result, Value};

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub const fn as_sql(self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }

    const fn alias_prefix(self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "average",
            AggregateKind::Min => "minimum",
            AggregateKind::Max => "maximum",
        }
    }
}

/// An aggregate over a property, or over rows for `COUNT(*)`.
#[derive(Debug, Clone)]
pub struct Aggregator {
    pub kind: AggregateKind,
    pub property: Option<Arc<Property>>,
}

impl Aggregator {
    pub fn new(kind: AggregateKind, property: Option<Arc<Property>>) -> Self {
        Self { kind, property }
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Self::new(AggregateKind::Count, None)
    }

    pub fn alias(&self) -> String {
        match &self.property {
            Some(p) => format!("{}_{}", self.kind.alias_prefix(), p.name),
            None => self.kind.alias_prefix().to_string(),
        }
    }

    /// Value of the aggregate over an empty set.
    pub fn empty_value(&self) -> Value {
        match self.kind {
            AggregateKind::Count | AggregateKind::Sum => Value::BigInt(0),
            _ => Value::Null,
        }
    }

    /// Normalize a storage result: NULL counts and sums become zero.
    pub fn normalize(&self, value: Value) -> Value {
        if value.is_null() {
            return self.empty_value();
        }
        match self.kind {
            AggregateKind::Count => value.as_i64().map_or(value, Value::BigInt),
            AggregateKind::Avg => value.as_f64().map_or(value, Value::Double),
            _ => match &self.property {
                Some(p) => p.deserialize(&value).unwrap_or(value),
                None => value,
            },
        }
    }

    /// Compute over in-memory values, one per record.
    ///
    /// NULLs are ignored except by `COUNT(*)`, which counts records. An
    /// integer sum that leaves the `i64` range fails the way storage does.
    pub fn calculate(&self, values: &[Value]) -> Result<Value> {
        if self.kind == AggregateKind::Count && self.property.is_none() {
            return Ok(Value::BigInt(values.len() as i64));
        }
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
        Ok(match self.kind {
            AggregateKind::Count => Value::BigInt(present.len() as i64),
            AggregateKind::Sum => sum(&present).ok_or_else(|| {
                Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: None,
                    message: format!("integer overflow in {}", self.alias()),
                    source: None,
                })
            })?,
            AggregateKind::Avg => {
                if present.is_empty() {
                    return Ok(Value::Null);
                }
                let total: f64 = present.iter().filter_map(|v| v.as_f64()).sum();
                Value::Double(total / present.len() as f64)
            }
            AggregateKind::Min => present
                .iter()
                .copied()
                .min_by(|a, b| a.sort_cmp(b))
                .cloned()
                .unwrap_or(Value::Null),
            AggregateKind::Max => present
                .iter()
                .copied()
                .max_by(|a, b| a.sort_cmp(b))
                .cloned()
                .unwrap_or(Value::Null),
        })
    }
}

/// `None` on integer overflow.
fn sum(values: &[&Value]) -> Option<Value> {
    if values.iter().any(|v| matches!(v, Value::Double(_))) {
        return Some(Value::Double(values.iter().filter_map(|v| v.as_f64()).sum()));
    }
    values
        .iter()
        .filter_map(|v| v.as_i64())
        .try_fold(0_i64, i64::checked_add)
        .map(Value::BigInt)
}

/// Aggregator builders for properties.
pub trait Aggregatable {
    fn aggregate(&self, kind: AggregateKind) -> Aggregator;

    fn count(&self) -> Aggregator {
        self.aggregate(AggregateKind::Count)
    }

    fn sum(&self) -> Aggregator {
        self.aggregate(AggregateKind::Sum)
    }

    fn avg(&self) -> Aggregator {
        self.aggregate(AggregateKind::Avg)
    }

    fn min(&self) -> Aggregator {
        self.aggregate(AggregateKind::Min)
    }

    fn max(&self) -> Aggregator {
        self.aggregate(AggregateKind::Max)
    }
}

impl Aggregatable for Arc<Property> {
    fn aggregate(&self, kind: AggregateKind) -> Aggregator {
        Aggregator::new(kind, Some(Arc::clone(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases() {
        let age = Arc::new(Property::integer("age"));
        assert_eq!(Aggregator::count_all().alias(), "count");
        assert_eq!(age.count().alias(), "count_age");
        assert_eq!(age.avg().alias(), "average_age");
        assert_eq!(age.min().alias(), "minimum_age");
        assert_eq!(age.max().alias(), "maximum_age");
        assert_eq!(age.sum().alias(), "sum_age");
    }

    #[test]
    fn in_memory() {
        let age = Arc::new(Property::integer("age"));
        let values = [Value::BigInt(2), Value::Null, Value::BigInt(4)];
        assert_eq!(Aggregator::count_all().calculate(&values).unwrap(), Value::BigInt(3));
        assert_eq!(age.count().calculate(&values).unwrap(), Value::BigInt(2));
        assert_eq!(age.sum().calculate(&values).unwrap(), Value::BigInt(6));
        assert_eq!(age.avg().calculate(&values).unwrap(), Value::Double(3.0));
        assert_eq!(age.min().calculate(&values).unwrap(), Value::BigInt(2));
        assert_eq!(age.max().calculate(&values).unwrap(), Value::BigInt(4));
        assert_eq!(age.max().calculate(&[]).unwrap(), Value::Null);
        assert_eq!(age.sum().calculate(&[]).unwrap(), Value::BigInt(0));
    }

    #[test]
    fn integer_sum_overflow_is_an_error() {
        let amount = Arc::new(Property::integer("amount"));
        let values = [Value::BigInt(i64::MAX), Value::BigInt(1)];
        let err = amount.sum().calculate(&values).unwrap_err();
        assert!(err.to_string().contains("integer overflow"), "{err}");
        assert_eq!(
            amount.sum().calculate(&[Value::BigInt(i64::MAX), Value::BigInt(-1)]).unwrap(),
            Value::BigInt(i64::MAX - 1)
        );
        assert_eq!(
            amount.sum().calculate(&[Value::BigInt(i64::MAX), Value::Double(1.0)]).unwrap(),
            Value::Double(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn normalizes_storage_results() {
        let age = Arc::new(Property::integer("age"));
        assert_eq!(age.sum().normalize(Value::Null), Value::BigInt(0));
        assert_eq!(age.max().normalize(Value::Int(9)), Value::BigInt(9));
        assert_eq!(age.avg().normalize(Value::BigInt(2)), Value::Double(2.0));
    }
}
