//! The condition tree.
//!
//! Conditions filter queries. They render to SQL through the translator and
//! evaluate in memory against anything implementing [`RecordAccess`], so a
//! loaded collection can be narrowed without another round trip.
//!
//! ```ignore
//! let lenny = nickname.eq("Lenny").and(group_id.in_list([1, 2]));
//! assert!(lenny.matches(&record)?);
//! ```
//!
//! [`Condition::Null`] is the always-true condition every query starts from.
//! It is the identity of AND and absorbs OR.

use crate::path::{Hop, Path};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tusk_core::{Error, Property, Registry, Relationship, Result, Value};

/// What a condition needs from a record to evaluate against it.
pub trait RecordAccess {
    /// Current value of `property`, loading it first if needed.
    fn value_of(&self, property: &Property) -> Result<Value>;

    /// Values reached by following `path`; one per record at the far end.
    fn path_values(&self, path: &Path) -> Result<Vec<Value>>;

    /// Whether `property` belongs to the record's entity.
    fn has_property(&self, property: &Property) -> bool;

    /// Write `value` into `property`.
    fn assign(&mut self, property: &Property, value: Value) -> Result<()>;
}

// ==================== Comparisons ====================

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// SQL LIKE with `%`, `_` and `\` escapes
    Like,
    /// Membership in a value list
    In,
}

impl Operator {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

/// Left-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Subject {
    Property(Arc<Property>),
    Path(Path),
    Value(Value),
}

impl Subject {
    /// The property compared, directly or at the end of a path.
    pub fn property(&self) -> Option<&Arc<Property>> {
        match self {
            Subject::Property(p) => Some(p),
            Subject::Path(path) => Some(&path.property),
            Subject::Value(_) => None,
        }
    }

    fn equivalent(&self, other: &Subject) -> bool {
        match (self, other) {
            (Subject::Property(a), Subject::Property(b)) => same_property(a, b),
            (Subject::Path(a), Subject::Path(b)) => a.equivalent(b),
            (Subject::Value(a), Subject::Value(b)) => a == b,
            _ => false,
        }
    }

    fn values(&self, record: &dyn RecordAccess) -> Result<Vec<Value>> {
        match self {
            Subject::Property(p) => Ok(vec![record.value_of(p)?]),
            Subject::Path(path) => record.path_values(path),
            Subject::Value(v) => Ok(vec![v.clone()]),
        }
    }
}

fn same_property(a: &Property, b: &Property) -> bool {
    a.name == b.name && a.entity == b.entity
}

/// A single `subject <op> value` test.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub operator: Operator,
    pub subject: Subject,
    /// Right-hand value; an `Array` for `In`
    pub value: Value,
}

impl Comparison {
    /// Build a comparison, typecasting the value through the subject's
    /// property when it converts cleanly.
    pub fn new(operator: Operator, subject: Subject, value: Value) -> Self {
        let value = match (subject.property(), operator) {
            (_, Operator::Like) | (None, _) => value,
            (Some(p), Operator::In) => match value {
                Value::Array(items) => {
                    Value::Array(items.iter().map(|v| typecast(p, v)).collect())
                }
                single => Value::Array(vec![typecast(p, &single)]),
            },
            (Some(p), _) => typecast(p, &value),
        };
        Self {
            operator,
            subject,
            value,
        }
    }

    /// Test one left-hand value with SQL's three-valued logic: `None` is
    /// unknown, which is what comparing against NULL yields outside
    /// `IS [NOT] NULL`.
    pub fn test(&self, left: &Value) -> Result<Option<bool>> {
        let value = &self.value;
        Ok(match self.operator {
            Operator::Eq if value.is_null() => Some(left.is_null()),
            Operator::NotEq if value.is_null() => Some(!left.is_null()),
            _ if left.is_null() => None,
            Operator::Eq => Some(left.loose_eq(value)),
            Operator::NotEq => Some(!left.loose_eq(value)),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte if value.is_null() => None,
            Operator::Gt => Some(left.compare(value).is_some_and(|o| o.is_gt())),
            Operator::Gte => Some(left.compare(value).is_some_and(|o| o.is_ge())),
            Operator::Lt => Some(left.compare(value).is_some_and(|o| o.is_lt())),
            Operator::Lte => Some(left.compare(value).is_some_and(|o| o.is_le())),
            Operator::Like => match value {
                Value::Text(pattern) => Some(like_regex(pattern)?.is_match(&left.key_fragment())),
                Value::Null => None,
                _ => Some(false),
            },
            Operator::In => match value {
                Value::Array(items) if items.iter().any(|item| left.loose_eq(item)) => Some(true),
                Value::Array(items) if items.iter().any(Value::is_null) => None,
                Value::Array(_) => Some(false),
                other => Some(left.loose_eq(other)),
            },
        })
    }

    fn is_valid(&self) -> bool {
        match (self.subject.property(), self.operator) {
            (_, Operator::Like) => matches!(self.value, Value::Text(_)),
            (Some(p), Operator::In) => match &self.value {
                Value::Array(items) => items.iter().all(|v| !v.is_null() && p.is_valid(v)),
                _ => false,
            },
            (Some(p), Operator::Eq | Operator::NotEq) => {
                self.value.is_null() || p.is_valid(&self.value)
            }
            (Some(p), _) => !self.value.is_null() && p.is_valid(&self.value),
            (None, _) => true,
        }
    }
}

fn typecast(property: &Property, value: &Value) -> Value {
    property
        .deserialize(value)
        .unwrap_or_else(|_| value.clone())
}

/// Translate a LIKE pattern into an anchored, case-insensitive regex.
pub fn like_regex(pattern: &str) -> Result<Regex> {
    let mut body = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => body.push_str(".*"),
            '_' => body.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    body.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => body.push_str(&regex::escape(&other.to_string())),
        }
    }
    Regex::new(&format!("(?is)^{body}$"))
        .map_err(|e| Error::Custom(format!("invalid LIKE pattern '{pattern}': {e}")))
}

// ==================== Condition tree ====================

/// A filter condition.
#[derive(Debug, Clone, Default)]
pub enum Condition {
    /// Always true
    #[default]
    Null,
    Comparison(Comparison),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(operator: Operator, subject: Subject, value: Value) -> Self {
        Condition::Comparison(Comparison::new(operator, subject, value))
    }

    /// A condition no record satisfies.
    pub fn never(subject: Subject) -> Self {
        Condition::Comparison(Comparison {
            operator: Operator::In,
            subject,
            value: Value::Array(Vec::new()),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Condition::Null)
    }

    /// Conjunction. `Null` is the identity.
    #[must_use]
    pub fn and(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Null, other) => other,
            (this, Condition::Null) => this,
            (Condition::And(mut operands), other) => {
                operands.push(other);
                Condition::And(operands)
            }
            (this, other) => Condition::And(vec![this, other]),
        }
    }

    /// Disjunction. `Null` absorbs.
    #[must_use]
    pub fn or(self, other: Condition) -> Condition {
        match (self, other) {
            (Condition::Null, _) | (_, Condition::Null) => Condition::Null,
            (Condition::Or(mut operands), other) => {
                operands.push(other);
                Condition::Or(operands)
            }
            (this, other) => Condition::Or(vec![this, other]),
        }
    }

    #[must_use]
    pub fn and_not(self, other: Condition) -> Condition {
        self.and(other.not())
    }

    #[must_use]
    pub fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Whether the tree is well formed: AND needs two operands, OR at
    /// least one, and every comparison value must suit its property.
    pub fn is_valid(&self) -> bool {
        match self {
            Condition::Null => true,
            Condition::Comparison(c) => c.is_valid(),
            Condition::And(operands) => {
                operands.len() >= 2 && operands.iter().all(Condition::is_valid)
            }
            Condition::Or(operands) => {
                !operands.is_empty() && operands.iter().all(Condition::is_valid)
            }
            Condition::Not(inner) => inner.is_valid(),
        }
    }

    /// Evaluate against a record without touching storage. Only a
    /// condition that holds matches; unknown counts as a miss, as in a
    /// WHERE clause.
    pub fn matches(&self, record: &dyn RecordAccess) -> Result<bool> {
        Ok(self.evaluate(record)? == Some(true))
    }

    /// Three-valued evaluation. `None` is SQL's unknown.
    pub fn evaluate(&self, record: &dyn RecordAccess) -> Result<Option<bool>> {
        match self {
            Condition::Null => Ok(Some(true)),
            Condition::Comparison(c) => {
                let mut outcome = Some(false);
                for left in c.subject.values(record)? {
                    match c.test(&left)? {
                        Some(true) => return Ok(Some(true)),
                        None => outcome = None,
                        Some(false) => {}
                    }
                }
                Ok(outcome)
            }
            Condition::And(operands) => {
                let mut outcome = Some(true);
                for operand in operands {
                    match operand.evaluate(record)? {
                        Some(false) => return Ok(Some(false)),
                        None => outcome = None,
                        Some(true) => {}
                    }
                }
                Ok(outcome)
            }
            Condition::Or(operands) => {
                let mut outcome = Some(false);
                for operand in operands {
                    match operand.evaluate(record)? {
                        Some(true) => return Ok(Some(true)),
                        None => outcome = None,
                        Some(false) => {}
                    }
                }
                Ok(outcome)
            }
            Condition::Not(inner) => Ok(inner.evaluate(record)?.map(|holds| !holds)),
        }
    }

    /// Push the values this condition requires onto `record`.
    ///
    /// Only equality comparisons on the record's own properties write
    /// anything. OR applies its first operand alone.
    pub fn apply_to_record(&self, record: &mut dyn RecordAccess) -> Result<()> {
        match self {
            Condition::Comparison(Comparison {
                operator: Operator::Eq,
                subject: Subject::Property(property),
                value,
            }) if record.has_property(property) => record.assign(property, value.clone()),
            Condition::And(operands) => {
                for operand in operands {
                    operand.apply_to_record(record)?;
                }
                Ok(())
            }
            Condition::Or(operands) => match operands.first() {
                Some(first) => first.apply_to_record(record),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Paths this condition compares against, in tree order.
    pub fn paths(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Condition::Comparison(Comparison {
                subject: Subject::Path(path),
                ..
            }) => out.push(path),
            Condition::And(operands) | Condition::Or(operands) => {
                for operand in operands {
                    operand.collect_paths(out);
                }
            }
            Condition::Not(inner) => inner.collect_paths(out),
            _ => {}
        }
    }

    /// Structural equality: same shape, same subjects, same values.
    pub fn equivalent(&self, other: &Condition) -> bool {
        match (self, other) {
            (Condition::Null, Condition::Null) => true,
            (Condition::Comparison(a), Condition::Comparison(b)) => {
                a.operator == b.operator && a.subject.equivalent(&b.subject) && a.value == b.value
            }
            (Condition::And(a), Condition::And(b)) | (Condition::Or(a), Condition::Or(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
            }
            (Condition::Not(a), Condition::Not(b)) => a.equivalent(b),
            _ => false,
        }
    }

    // ==================== Relationship scoping ====================

    /// Select the rows whose `subjects` match any of the key `tuples`.
    ///
    /// One subject yields `=` for a single distinct value and `IN` for
    /// several; composite keys yield an OR of ANDs. Tuples holding NULL or
    /// a value the key property rejects are skipped, and when none remain
    /// the condition matches nothing.
    pub fn target_conditions(subjects: &[Subject], tuples: &[Vec<Value>]) -> Condition {
        let mut seen = HashSet::new();
        let usable: Vec<&Vec<Value>> = tuples
            .iter()
            .filter(|tuple| {
                tuple.len() == subjects.len()
                    && tuple.iter().zip(subjects).all(|(value, subject)| {
                        !value.is_null() && subject.property().is_none_or(|p| p.is_valid(value))
                    })
            })
            .filter(|tuple| seen.insert(signature(tuple)))
            .collect();

        let Some(first_subject) = subjects.first() else {
            return Condition::Null;
        };
        if usable.is_empty() {
            return Condition::never(first_subject.clone());
        }

        if subjects.len() == 1 {
            let mut values: Vec<Value> = usable.iter().map(|t| t[0].clone()).collect();
            return if values.len() == 1 {
                Condition::compare(Operator::Eq, first_subject.clone(), values.remove(0))
            } else {
                Condition::compare(Operator::In, first_subject.clone(), Value::Array(values))
            };
        }

        let clauses: Vec<Condition> = usable
            .iter()
            .map(|tuple| {
                Condition::And(
                    subjects
                        .iter()
                        .zip(tuple.iter())
                        .map(|(s, v)| Condition::compare(Operator::Eq, s.clone(), v.clone()))
                        .collect(),
                )
            })
            .collect();
        match <[Condition; 1]>::try_from(clauses) {
            Ok([single]) => single,
            Err(clauses) => Condition::Or(clauses),
        }
    }

    /// Rows of `relationship.target` related to the given source key
    /// tuples (values of `relationship.source_keys`).
    ///
    /// Many-to-many relationships compare through the join entity by
    /// walking their links backwards from the target.
    pub fn related_to(
        registry: &Registry,
        relationship: &Arc<Relationship>,
        tuples: &[Vec<Value>],
    ) -> Result<Condition> {
        let links = relationship.links();
        let subjects: Vec<Subject> = match links.split_first() {
            Some((first, rest)) if !rest.is_empty() => {
                let mut hops = Vec::with_capacity(rest.len());
                for link in rest.iter().rev() {
                    hops.push(Hop::backward(registry, link)?);
                }
                first
                    .target_keys
                    .iter()
                    .map(|key| {
                        Subject::Path(Path::from_hops(
                            relationship.target.clone(),
                            hops.clone(),
                            Arc::clone(key),
                        ))
                    })
                    .collect()
            }
            _ => relationship
                .target_keys
                .iter()
                .map(|key| Subject::Property(Arc::clone(key)))
                .collect(),
        };
        Ok(Condition::target_conditions(&subjects, tuples))
    }
}

/// Signature of a key tuple, as used for identity keys and buckets.
pub fn signature(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::key_token)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Property(p) => write!(f, "{}", p.name),
            Subject::Path(path) => write!(f, "{}.{}", path.alias(), path.property.name),
            Subject::Value(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, operands: &[Condition], op: &str| {
            write!(f, "(")?;
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{operand}")?;
            }
            write!(f, ")")
        };
        match self {
            Condition::Null => write!(f, "TRUE"),
            Condition::Comparison(c) => {
                write!(f, "{} {} {}", c.subject, c.operator.as_sql(), c.value)
            }
            Condition::And(operands) => join(f, operands, "AND"),
            Condition::Or(operands) => join(f, operands, "OR"),
            Condition::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

// ==================== Builders ====================

/// Comparison builders for properties and paths.
pub trait Comparable {
    fn subject(&self) -> Subject;

    fn eq(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::Eq, self.subject(), value.into())
    }

    fn not_eq(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::NotEq, self.subject(), value.into())
    }

    fn gt(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::Gt, self.subject(), value.into())
    }

    fn gte(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::Gte, self.subject(), value.into())
    }

    fn lt(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::Lt, self.subject(), value.into())
    }

    fn lte(&self, value: impl Into<Value>) -> Condition {
        Condition::compare(Operator::Lte, self.subject(), value.into())
    }

    fn like(&self, pattern: impl Into<String>) -> Condition {
        Condition::compare(Operator::Like, self.subject(), Value::Text(pattern.into()))
    }

    fn in_list<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Condition::compare(Operator::In, self.subject(), Value::Array(values))
    }
}

impl Comparable for Arc<Property> {
    fn subject(&self) -> Subject {
        Subject::Property(Arc::clone(self))
    }
}

impl Comparable for Path {
    fn subject(&self) -> Subject {
        Subject::Path(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fake {
        values: HashMap<String, Value>,
    }

    impl Fake {
        fn new(pairs: &[(&str, Value)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    impl RecordAccess for Fake {
        fn value_of(&self, property: &Property) -> Result<Value> {
            Ok(self.values.get(&property.name).cloned().unwrap_or(Value::Null))
        }

        fn path_values(&self, _path: &Path) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }

        fn has_property(&self, property: &Property) -> bool {
            property.entity == "User"
        }

        fn assign(&mut self, property: &Property, value: Value) -> Result<()> {
            self.values.insert(property.name.clone(), value);
            Ok(())
        }
    }

    fn prop(p: Property) -> Arc<Property> {
        let mut p = p;
        p.entity = "User".to_string();
        Arc::new(p)
    }

    #[test]
    fn null_algebra() {
        let id = prop(Property::integer("id"));
        let c = id.eq(1);
        assert!(Condition::Null.and(c.clone()).equivalent(&c));
        assert!(c.clone().and(Condition::Null).equivalent(&c));
        assert!(Condition::Null.or(c.clone()).is_null());
        assert!(
            Condition::Null
                .and_not(c.clone())
                .equivalent(&Condition::Not(Box::new(c)))
        );
    }

    #[test]
    fn and_flattens_and_validates() {
        let id = prop(Property::integer("id"));
        let c = id.gt(1).and(id.lt(5)).and(id.not_eq(3));
        match &c {
            Condition::And(ops) => assert_eq!(ops.len(), 3),
            other => panic!("unexpected {other}"),
        }
        assert!(c.is_valid());
        assert!(!Condition::And(vec![id.eq(1)]).is_valid());
        assert!(!id.gt("many").is_valid());
    }

    #[test]
    fn matches_in_memory() {
        let nickname = prop(Property::string("nickname"));
        let age = prop(Property::integer("age"));
        let lenny = Fake::new(&[("nickname", "Lenny".into()), ("age", Value::BigInt(30))]);

        assert!(nickname.eq("Lenny").matches(&lenny).unwrap());
        assert!(age.eq("30").matches(&lenny).unwrap());
        assert!(age.gte(30).and(age.lt(31)).matches(&lenny).unwrap());
        assert!(!age.gt(30).matches(&lenny).unwrap());
        assert!(nickname.like("le%").matches(&lenny).unwrap());
        assert!(nickname.like("L_nny").matches(&lenny).unwrap());
        assert!(!nickname.like("Len").matches(&lenny).unwrap());
        assert!(age.in_list([1, 30]).matches(&lenny).unwrap());
        assert!(!age.in_list(Vec::<i64>::new()).matches(&lenny).unwrap());
        assert!(age.eq(1).or(age.eq(30)).matches(&lenny).unwrap());
        assert!(age.eq(1).not().matches(&lenny).unwrap());
    }

    #[test]
    fn null_comparisons() {
        let group_id = prop(Property::integer("group_id"));
        let orphan = Fake::new(&[("group_id", Value::Null)]);
        assert!(group_id.eq(Value::Null).matches(&orphan).unwrap());
        assert!(!group_id.not_eq(Value::Null).matches(&orphan).unwrap());
        assert!(!group_id.not_eq(1).matches(&orphan).unwrap());
        assert!(!group_id.gt(0).matches(&orphan).unwrap());
    }

    #[test]
    fn negation_keeps_null_unknown() {
        let group_id = prop(Property::integer("group_id"));
        let orphan = Fake::new(&[("group_id", Value::Null)]);
        let admin = Fake::new(&[("group_id", Value::BigInt(1))]);

        assert_eq!(group_id.eq(1).evaluate(&orphan).unwrap(), None);
        assert!(!group_id.eq(1).not().matches(&orphan).unwrap());
        assert!(!group_id.not_eq(1).not().matches(&orphan).unwrap());
        assert!(!group_id.in_list([1, 2]).not().matches(&orphan).unwrap());
        assert!(group_id.eq(Value::Null).not().matches(&admin).unwrap());
        assert!(!group_id.eq(2).not().not().matches(&admin).unwrap());

        // unknown OR true holds, and NOT (unknown AND false) holds
        assert!(group_id.eq(1).or(group_id.eq(Value::Null)).matches(&orphan).unwrap());
        assert!(group_id.eq(1).and(group_id.eq(Value::Null).not()).not().matches(&orphan).unwrap());
    }

    #[test]
    fn like_escapes() {
        let re = like_regex("100\\%").unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));
        assert!(like_regex("a.c").unwrap().is_match("A.C"));
        assert!(!like_regex("a.c").unwrap().is_match("abc"));
    }

    #[test]
    fn apply_pushes_equalities() {
        let group_id = prop(Property::integer("group_id"));
        let age = prop(Property::integer("age"));
        let mut record = Fake::new(&[]);
        group_id
            .eq(7)
            .and(age.gt(3))
            .apply_to_record(&mut record)
            .unwrap();
        assert_eq!(record.values.get("group_id"), Some(&Value::BigInt(7)));
        assert!(!record.values.contains_key("age"));

        let mut record = Fake::new(&[]);
        age.eq(1).or(age.eq(2)).apply_to_record(&mut record).unwrap();
        assert_eq!(record.values.get("age"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn target_conditions_shapes() {
        let id = prop(Property::integer("id"));
        let subjects = [Subject::Property(Arc::clone(&id))];

        let one = Condition::target_conditions(&subjects, &[vec![Value::BigInt(1)]]);
        assert!(one.equivalent(&id.eq(1)));

        let many = Condition::target_conditions(
            &subjects,
            &[
                vec![Value::BigInt(1)],
                vec![Value::Int(1)],
                vec![Value::BigInt(2)],
                vec![Value::Null],
            ],
        );
        assert!(many.equivalent(&id.in_list([1_i64, 2])));

        let none = Condition::target_conditions(&subjects, &[vec![Value::Null]]);
        let nobody = Fake::new(&[("id", Value::BigInt(1))]);
        assert!(!none.matches(&nobody).unwrap());
    }

    #[test]
    fn composite_target_conditions() {
        let a = prop(Property::integer("a"));
        let b = prop(Property::integer("b"));
        let subjects = [
            Subject::Property(Arc::clone(&a)),
            Subject::Property(Arc::clone(&b)),
        ];
        let single = Condition::target_conditions(&subjects, &[vec![1.into(), 2.into()]]);
        assert!(single.equivalent(&Condition::And(vec![a.eq(1), b.eq(2)])));

        let both = Condition::target_conditions(
            &subjects,
            &[vec![1.into(), 2.into()], vec![3.into(), 4.into()]],
        );
        let row = Fake::new(&[("a", Value::BigInt(3)), ("b", Value::BigInt(4))]);
        assert!(matches!(both, Condition::Or(ref ops) if ops.len() == 2));
        assert!(both.matches(&row).unwrap());
    }

    proptest::proptest! {
        #[test]
        fn target_conditions_select_exactly_the_sources(
            ids in proptest::collection::vec(0_i64..20, 0..8),
            candidate in 0_i64..20,
        ) {
            let id = prop(Property::integer("id"));
            let tuples: Vec<Vec<Value>> = ids.iter().map(|i| vec![Value::BigInt(*i)]).collect();
            let condition = Condition::target_conditions(&[Subject::Property(id)], &tuples);
            let row = Fake::new(&[("id", Value::BigInt(candidate))]);
            proptest::prop_assert_eq!(condition.matches(&row).unwrap(), ids.contains(&candidate));
        }

        #[test]
        fn like_without_wildcards_is_case_insensitive_equality(text in "[a-zA-Z0-9 .]{0,12}") {
            let re = like_regex(&text).unwrap();
            proptest::prop_assert!(re.is_match(&text.to_uppercase()));
            let longer = format!("{text}x");
            proptest::prop_assert!(!re.is_match(&longer));
        }
    }

    #[test]
    fn display_is_readable() {
        let id = prop(Property::integer("id"));
        assert_eq!(id.eq(1).and(id.lt(9)).to_string(), "(id = 1 AND id < 9)");
    }
}
