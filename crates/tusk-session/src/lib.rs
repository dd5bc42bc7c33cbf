//! Sessions for tusk.
//!
//! `tusk-session` is the **unit-of-work layer**. It turns query descriptors
//! from `tusk-query` into records, keeps one record per row, and loads what
//! those records reach in batches.
//!
//! # Role In The Architecture
//!
//! - **Identity map**: one in-memory [`Record`] per row within a
//!   [`Session`], however many queries return it.
//! - **Lazy collections**: [`Collection`]s derive without I/O and load on
//!   first materialization, reusing loaded parents when they can.
//! - **Batched loading**: relationships, lazy properties and aggregates
//!   load for every record of a collection with one query per hop.
//! - **State machine**: records move between the [`RecordState`]s as they
//!   are changed, committed, deleted and rolled back.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(registry);
//! session.add_data_source(DataSource::new(
//!     "default",
//!     SqlTranslator::new(Dialect::Sqlite),
//!     SqliteConnection::open_memory()?,
//! ));
//!
//! let users = session.find("User")?;
//! for user in users.iter()? {
//!     // one query for every user's group
//!     let group = user.one("group")?;
//! }
//! ```

pub mod calculate;
pub mod collection;
pub mod config;
pub mod data_source;
pub mod identity_map;
mod loading;
pub mod record;
pub mod session;
pub mod state;
mod store;
pub mod tracker;

pub use collection::{Collection, CollectionIter};
pub use config::SessionConfig;
pub use data_source::{Assignments, DataSource};
pub use identity_map::{IdentityMap, identity_key};
pub use record::Record;
pub use session::Session;
pub use state::RecordState;
pub use store::{CollectionId, RecordId};
pub use tracker::{LoadEvent, LoadStats, LoadTracker};
