//! Core types for the tusk object-relational mapper.
//!
//! - [`Value`] and [`Row`] for attribute values and result rows
//! - [`Error`] and [`Result`] shared by every tusk crate
//! - [`Connection`], the synchronous storage seam
//! - The schema: [`Property`], [`Relationship`], [`EntityType`] and the
//!   [`Registry`] that resolves them
//! - [`Inflector`] naming conventions

pub mod connection;
pub mod entity;
pub mod error;
pub mod inflect;
pub mod property;
pub mod registry;
pub mod relationship;
pub mod row;
pub mod timestamp;
pub mod value;

pub use connection::Connection;
pub use entity::{DEFAULT_DATA_SOURCE, EntityDef, EntityType, Member};
pub use error::{
    AccessError, AccessErrorKind, ConfigError, ConfigErrorKind, ConnectionError,
    ConnectionErrorKind, CrossModelError, Error, QueryError, QueryErrorKind, Result, ResultError,
    TypeError,
};
pub use inflect::{EnglishInflector, Inflector};
pub use property::{Property, PropertyKind};
pub use registry::{Registry, RegistryBuilder};
pub use relationship::{Cardinality, Relationship, RelationshipDef};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
