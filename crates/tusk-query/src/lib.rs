//! Query algebra for tusk.
//!
//! `tusk-query` is the **query description layer**. Nothing here performs
//! I/O: it describes reads and renders them.
//!
//! # Role In The Architecture
//!
//! - **Conditions**: [`Condition`] trees built with [`Comparable`] on
//!   properties and [`Path`]s, evaluated in memory or rendered to SQL.
//! - **Queries**: [`Query`] and [`QueryOptions`], merged by collections and
//!   compared with [`Query::is_subset_of`] to decide cache reuse.
//! - **Translation**: [`SqlTranslator`] turns queries and writes into
//!   [`Statement`]s for a [`Dialect`].
//!
//! Sessions in `tusk-session` drive these descriptors against storage.

pub mod aggregate;
pub mod condition;
pub mod order;
pub mod path;
pub mod query;
pub mod translate;

pub use aggregate::{AggregateKind, Aggregatable, Aggregator};
pub use condition::{
    Comparable, Comparison, Condition, Operator, RecordAccess, Subject, like_regex, signature,
};
pub use order::{Direction, Order, Sortable};
pub use path::{Hop, Link, Path};
pub use query::{Field, Query, QueryOptions};
pub use translate::{Dialect, SqlTranslator, Statement};
