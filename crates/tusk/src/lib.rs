//! tusk: a lazy, identity-mapped object-relational mapper.
//!
//! Records are read through [`Collection`]s that describe a query without
//! running it. The first time a collection's records are needed it loads
//! them, and every record a [`Session`] returns for the same row is the
//! same [`Record`]. Relationships, lazy properties and aggregates reached
//! from a record load for every record of its collection at once, so
//! walking a relationship across N records costs one query, not N.
//!
//! # Quick Start
//!
//! ```ignore
//! use tusk::prelude::*;
//!
//! let registry = Registry::builder()
//!     .entity(
//!         EntityDef::new("Group")
//!             .property(Property::string("name"))
//!             .has_many("users", "User"),
//!     )
//!     .entity(
//!         EntityDef::new("User")
//!             .property(Property::string("nickname").required())
//!             .property(Property::integer("group_id"))
//!             .belongs_to("group", "Group"),
//!     )
//!     .build()?;
//!
//! let session = SessionBuilder::new(registry)
//!     .sqlite_memory()
//!     .create_schema(true)
//!     .build()?;
//!
//! let admin = session.create("Group", &[("name", "Admin".into())])?;
//! let mut lenny = session.build("User")?;
//! lenny.set("nickname", "Lenny")?;
//! lenny.set_one("group", Some(&admin))?;
//! lenny.save()?;
//!
//! let nickname = session.property("User", "nickname")?;
//! for user in session.find("User")?.filter(nickname.like("L%"))?.iter()? {
//!     // one Group query for the whole collection
//!     println!("{:?}", user.one("group")?);
//! }
//! ```
//!
//! # Crates
//!
//! - `tusk-core`: values, errors, the schema registry and the `Connection` seam
//! - `tusk-query`: conditions, paths, queries and SQL translation
//! - `tusk-session`: sessions, records, collections and batched loading
//! - `tusk-sqlite`: the SQLite connection (feature `sqlite`, on by default)

pub use tusk_core::{
    AccessError, AccessErrorKind, Cardinality, ConfigError, ConfigErrorKind, Connection,
    ConnectionError, ConnectionErrorKind, CrossModelError, EntityDef, EntityType, Error,
    FromValue, Member, Property, PropertyKind, QueryError, QueryErrorKind, Registry,
    RegistryBuilder, Relationship, RelationshipDef, Result, ResultError, Row, TypeError, Value,
};

pub use tusk_query::{
    AggregateKind, Aggregatable, Aggregator, Comparable, Condition, Dialect, Direction, Field,
    Operator, Order, Path, Query, QueryOptions, Sortable, SqlTranslator, Statement, Subject,
};

pub use tusk_session::{
    Collection, DataSource, LoadStats, Record, RecordState, Session, SessionConfig,
};

#[cfg(feature = "sqlite")]
pub use tusk_sqlite::{SqliteConfig, SqliteConnection};

mod builder;
pub use builder::SessionBuilder;

// ==================== Prelude ====================

/// The types most programs need.
///
/// ```ignore
/// use tusk::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Schema
        EntityDef,
        Property,
        Registry,
        // Queries
        Aggregatable,
        Comparable,
        Condition,
        QueryOptions,
        Sortable,
        // Sessions
        Collection,
        Record,
        RecordState,
        Session,
        SessionBuilder,
        SessionConfig,
        // Values and errors
        Error,
        Result,
        Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{SqliteConfig, SqliteConnection};
}
