//! Error types for tusk operations.
//!
//! Failures fall into a handful of families. Configuration errors surface
//! while the schema is being declared and are never recovered. Access errors
//! are raised when a record member is read or written against its flags or
//! lifecycle state. Cross-model errors reject records of the wrong entity.
//! Storage failures carry the statement that caused them.
//!
//! A record that fails validation is *not* an error: `commit` and `save`
//! report it as `Ok(false)` and leave the record in its current state.

use std::fmt;

/// The primary error type for all tusk operations.
#[derive(Debug)]
pub enum Error {
    /// Schema declaration errors
    Config(ConfigError),
    /// Member access errors on a record
    Access(AccessError),
    /// A record or row of the wrong entity type
    CrossModel(CrossModelError),
    /// A query returned a different number of records than required
    UnexpectedResult(ResultError),
    /// Statement execution errors
    Query(QueryError),
    /// Connection-related errors
    Connection(ConnectionError),
    /// Value conversion errors
    Type(TypeError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// Entity the failing declaration belongs to, when known
    pub entity: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Two properties with the same name on one entity
    DuplicateProperty,
    /// Two relationships with the same name on one entity
    DuplicateRelationship,
    /// Entity name not registered
    UnknownEntity,
    /// Property or relationship name not declared
    UnknownMember,
    /// Foreign keys could not be derived for a relationship
    UnresolvedKeys,
    /// No inverse relationship on the target entity
    MissingInverse,
    /// More than one candidate inverse relationship
    AmbiguousInverse,
    /// Sort direction other than asc/desc
    InvalidDirection,
    /// Relationship path that cannot be followed
    InvalidPath,
    /// Named scope not declared
    InvalidScope,
    /// Declaration the mapper cannot honour
    Unsupported,
}

#[derive(Debug)]
pub struct AccessError {
    pub kind: AccessErrorKind,
    pub entity: String,
    pub member: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessErrorKind {
    /// Member does not exist on the entity
    Unknown,
    /// Member is declared unreadable
    NotReadable,
    /// Member is declared unwritable
    NotWritable,
    /// Value was never loaded and cannot be loaded
    NotLoaded,
    /// Record is immutable
    Immutable,
    /// Record is deleted and awaiting commit
    DeletedImmutable,
}

#[derive(Debug)]
pub struct CrossModelError {
    pub expected: String,
    pub actual: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ResultError {
    pub expected: usize,
    pub found: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// No data source registered under the requested name
    UnknownDataSource,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(
        kind: ConfigErrorKind,
        entity: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Config(ConfigError {
            kind,
            entity: entity.map(str::to_string),
            message: message.into(),
        })
    }

    /// Shorthand for an access error.
    pub fn access(
        kind: AccessErrorKind,
        entity: &str,
        member: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Access(AccessError {
            kind,
            entity: entity.to_string(),
            member: member.map(str::to_string),
            message: message.into(),
        })
    }

    /// Shorthand for a cross-model error.
    pub fn cross_model(expected: &str, actual: &str) -> Self {
        Error::CrossModel(CrossModelError {
            expected: expected.to_string(),
            actual: actual.to_string(),
            message: format!("expected a {expected} record, got {actual}"),
        })
    }

    /// The configuration error kind, if this is one.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The access error kind, if this is one.
    pub fn access_kind(&self) -> Option<AccessErrorKind> {
        match self {
            Error::Access(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Access(e) => write!(f, "Access error: {}", e),
            Error::CrossModel(e) => write!(f, "Cross-model error: {}", e.message),
            Error::UnexpectedResult(e) => write!(f, "Unexpected result: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "{}: {}", entity, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}.{}: {}", self.entity, member, self.message),
            None => write!(f, "{}: {}", self.entity, self.message),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (in `{}`)", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<AccessError> for Error {
    fn from(err: AccessError) -> Self {
        Error::Access(err)
    }
}

impl From<CrossModelError> for Error {
    fn from(err: CrossModelError) -> Self {
        Error::CrossModel(err)
    }
}

impl From<ResultError> for Error {
    fn from(err: ResultError) -> Self {
        Error::UnexpectedResult(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for tusk operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_exposed() {
        let err = Error::config(
            ConfigErrorKind::MissingInverse,
            Some("User"),
            "no inverse for 'group'",
        );
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingInverse));
        assert_eq!(err.access_kind(), None);
        assert_eq!(
            err.to_string(),
            "Configuration error: User: no inverse for 'group'"
        );

        let err = Error::access(
            AccessErrorKind::DeletedImmutable,
            "User",
            Some("nickname"),
            "record is deleted",
        );
        assert_eq!(err.access_kind(), Some(AccessErrorKind::DeletedImmutable));
        assert_eq!(
            err.to_string(),
            "Access error: User.nickname: record is deleted"
        );
    }

    #[test]
    fn query_error_carries_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(std::error::Error::source(&err).is_none());
    }
}
