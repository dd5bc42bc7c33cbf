//! Property descriptors.
//!
//! A [`Property`] describes one attribute of an entity: its name, the storage
//! field it maps to, a [`PropertyKind`] tag driving (de)serialization and a
//! set of access flags. Properties are declared with the constructor for
//! their kind and refined with builder methods:
//!
//! ```ignore
//! Property::string("nickname").required().length(30)
//! Property::serial("id")
//! Property::text("biography") // lazy unless `.eager()` is called
//! ```
//!
//! Once registered, properties are shared as `Arc<Property>` and never
//! change.

use crate::error::{Error, Result, TypeError};
use crate::timestamp;
use crate::value::Value;

/// Default length for `String` properties.
pub const DEFAULT_STRING_LENGTH: usize = 50;

/// Length of discriminator columns.
pub const DISCRIMINATOR_LENGTH: usize = 250;

/// The semantic type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Bounded text (`VARCHAR(length)`)
    String,
    /// Unbounded text
    Text,
    /// 64-bit integer
    Integer,
    /// Floating point
    Float,
    /// Boolean, stored as 0/1
    Boolean,
    /// Timestamp, stored as `YYYY-MM-DD HH:MM:SS[.ffffff]`
    DateTime,
    /// Raw bytes
    Binary,
    /// Entity name for single-table inheritance
    Discriminator,
}

impl PropertyKind {
    /// Name used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            PropertyKind::String => "String",
            PropertyKind::Text => "Text",
            PropertyKind::Integer => "Integer",
            PropertyKind::Float => "Float",
            PropertyKind::Boolean => "Boolean",
            PropertyKind::DateTime => "DateTime",
            PropertyKind::Binary => "Binary",
            PropertyKind::Discriminator => "Discriminator",
        }
    }
}

/// A typed attribute descriptor.
#[derive(Debug, Clone)]
pub struct Property {
    /// Member name used on records
    pub name: String,
    /// Storage column name
    pub field_name: String,
    /// Semantic type
    pub kind: PropertyKind,
    /// Entity that declared this property (set on registration)
    pub entity: String,
    /// Maximum length for bounded text
    pub length: Option<usize>,
    /// Value assigned to new records
    pub default: Option<Value>,
    /// Part of the record identity
    pub key: bool,
    /// Assigned by storage on insert
    pub serial: bool,
    /// NULL is invalid on commit
    pub required: bool,
    pub unique: bool,
    /// Excluded from the default field set and loaded on first read
    pub lazy: bool,
    pub readable: bool,
    pub writable: bool,
    /// Accepted by `set_attributes`
    pub mass_assignable: bool,
}

impl Property {
    /// Create a property of the given kind with default flags.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        let name = name.into();
        Self {
            field_name: name.clone(),
            name,
            kind,
            entity: String::new(),
            length: match kind {
                PropertyKind::String => Some(DEFAULT_STRING_LENGTH),
                PropertyKind::Discriminator => Some(DISCRIMINATOR_LENGTH),
                _ => None,
            },
            default: None,
            key: false,
            serial: false,
            required: false,
            unique: false,
            lazy: kind == PropertyKind::Text,
            readable: true,
            writable: kind != PropertyKind::Discriminator,
            mass_assignable: true,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::String)
    }

    /// Unbounded text; lazy by default.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Integer)
    }

    /// Auto-incremented integer key.
    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Integer)
            .auto_increment()
            .key()
            .unique()
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::DateTime)
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Binary)
    }

    /// Single-table inheritance discriminator. Never lazy, never writable.
    pub fn discriminator(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Discriminator)
    }

    // ==================== Builder ====================

    /// Mark as part of the record identity. Keys are required.
    #[must_use]
    pub fn key(mut self) -> Self {
        self.key = true;
        self.required = true;
        self
    }

    /// Let storage assign the value on insert.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.serial = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = self.kind != PropertyKind::Discriminator;
        self
    }

    /// Load with the default field set even if the kind is lazy.
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.lazy = false;
        self
    }

    #[must_use]
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Map to a storage column with a different name.
    #[must_use]
    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    #[must_use]
    pub fn readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    #[must_use]
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable && self.kind != PropertyKind::Discriminator;
        self
    }

    /// Shorthand for `readable(flag).writable(flag)`.
    #[must_use]
    pub fn accessible(self, accessible: bool) -> Self {
        self.readable(accessible).writable(accessible)
    }

    #[must_use]
    pub fn mass_assignable(mut self, mass_assignable: bool) -> Self {
        self.mass_assignable = mass_assignable;
        self
    }

    // ==================== Values ====================

    /// Convert an in-memory value to its storage form.
    pub fn serialize(&self, value: &Value) -> Value {
        match (self.kind, value) {
            (_, Value::Null) => Value::Null,
            (PropertyKind::DateTime, Value::Timestamp(micros)) => {
                Value::Text(timestamp::format(*micros))
            }
            (PropertyKind::Boolean, v) => match v.as_bool() {
                Some(b) => Value::BigInt(i64::from(b)),
                None => v.clone(),
            },
            _ => value.clone(),
        }
    }

    /// Convert a storage value (or a value handed to a setter) to its
    /// in-memory form.
    pub fn deserialize(&self, raw: &Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let converted = match self.kind {
            PropertyKind::Integer => match raw {
                Value::Int(v) => Some(Value::BigInt(i64::from(*v))),
                Value::BigInt(v) => Some(Value::BigInt(*v)),
                Value::Bool(b) => Some(Value::BigInt(i64::from(*b))),
                Value::Double(d) if d.is_finite() => Some(Value::BigInt(d.trunc() as i64)),
                Value::Text(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| {
                            s.parse::<f64>()
                                .ok()
                                .filter(|d| d.is_finite())
                                .map(|d| d.trunc() as i64)
                        })
                        .map(Value::BigInt)
                }
                _ => None,
            },
            PropertyKind::Float => match raw {
                Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::Double),
                other => other.as_f64().map(Value::Double),
            },
            PropertyKind::Boolean => match raw {
                Value::Text(s) => match s.trim() {
                    "1" | "true" | "t" => Some(Value::Bool(true)),
                    "0" | "false" | "f" | "" => Some(Value::Bool(false)),
                    _ => None,
                },
                Value::Double(d) => Some(Value::Bool(*d != 0.0)),
                other => other.as_bool().map(Value::Bool),
            },
            PropertyKind::DateTime => match raw {
                Value::Timestamp(micros) => Some(Value::Timestamp(*micros)),
                Value::Text(s) => timestamp::parse(s).map(Value::Timestamp),
                _ => None,
            },
            PropertyKind::String | PropertyKind::Text | PropertyKind::Discriminator => {
                match raw {
                    Value::Text(_) => Some(raw.clone()),
                    Value::Bytes(b) => String::from_utf8(b.clone()).ok().map(Value::Text),
                    Value::Array(_) => None,
                    other => Some(Value::Text(other.key_fragment())),
                }
            }
            PropertyKind::Binary => match raw {
                Value::Bytes(_) => Some(raw.clone()),
                Value::Text(s) => Some(Value::Bytes(s.clone().into_bytes())),
                _ => None,
            },
        };
        converted.ok_or_else(|| {
            Error::Type(TypeError {
                expected: self.kind.as_str(),
                actual: format!("{} {}", raw.type_name(), raw),
                column: Some(format!("{}.{}", self.entity, self.name)),
            })
        })
    }

    /// Whether a value may be committed for this property.
    ///
    /// NULL is invalid for required properties, except serial keys which
    /// storage assigns on insert. Discriminator names are checked by the
    /// session, which knows the entity hierarchy.
    pub fn is_valid(&self, value: &Value) -> bool {
        match value {
            Value::Null => !self.required || self.serial,
            Value::Text(s) => match self.kind {
                PropertyKind::String | PropertyKind::Discriminator => {
                    self.length.is_none_or(|max| s.chars().count() <= max)
                }
                PropertyKind::Text => true,
                _ => false,
            },
            Value::Timestamp(_) => self.kind == PropertyKind::DateTime,
            Value::Bool(_) => self.kind == PropertyKind::Boolean,
            Value::Int(_) | Value::BigInt(_) => {
                matches!(self.kind, PropertyKind::Integer | PropertyKind::Float)
            }
            Value::Double(_) => self.kind == PropertyKind::Float,
            Value::Bytes(_) => self.kind == PropertyKind::Binary,
            Value::Array(_) => false,
        }
    }
}
