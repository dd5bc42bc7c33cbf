//! Session assembly.

use std::sync::Arc;
use tusk_core::{Registry, Result};
use tusk_session::{DataSource, Session, SessionConfig};

#[cfg(feature = "sqlite")]
use tusk_core::DEFAULT_DATA_SOURCE;
#[cfg(feature = "sqlite")]
use tusk_query::{Dialect, SqlTranslator};
#[cfg(feature = "sqlite")]
use tusk_sqlite::{SqliteConfig, SqliteConnection};

/// Builder for a [`Session`] with its data sources attached.
///
/// ```ignore
/// let session = SessionBuilder::new(registry)
///     .n1_threshold(5)
///     .sqlite_memory()
///     .create_schema(true)
///     .build()?;
/// ```
#[derive(Debug)]
pub struct SessionBuilder {
    registry: Arc<Registry>,
    config: SessionConfig,
    sources: Vec<PendingSource>,
    create_schema: bool,
    #[cfg(feature = "sqlite")]
    table_prefix: Option<String>,
}

#[derive(Debug)]
enum PendingSource {
    Ready(DataSource),
    #[cfg(feature = "sqlite")]
    Sqlite { name: String, config: SqliteConfig },
}

impl SessionBuilder {
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            registry: registry.into(),
            config: SessionConfig::default(),
            sources: Vec::new(),
            create_schema: false,
            #[cfg(feature = "sqlite")]
            table_prefix: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Warn once a relationship or property loads this many times.
    #[must_use]
    pub fn n1_threshold(mut self, threshold: usize) -> Self {
        self.config = self.config.n1_threshold(threshold);
        self
    }

    /// Attach a data source built elsewhere.
    #[must_use]
    pub fn data_source(mut self, source: DataSource) -> Self {
        self.sources.push(PendingSource::Ready(source));
        self
    }

    /// Create every table once the data sources are attached.
    #[must_use]
    pub fn create_schema(mut self, create: bool) -> Self {
        self.create_schema = create;
        self
    }

    /// Open an in-memory SQLite database as the default data source.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite_memory(self) -> Self {
        self.sqlite(DEFAULT_DATA_SOURCE, SqliteConfig::memory())
    }

    /// Open a SQLite database as the data source `name`.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(mut self, name: impl Into<String>, config: SqliteConfig) -> Self {
        self.sources.push(PendingSource::Sqlite {
            name: name.into(),
            config,
        });
        self
    }

    /// Prefix the table names of SQLite data sources opened by this
    /// builder, joined with `_`.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    pub fn build(self) -> Result<Session> {
        let session = Session::with_config(self.registry, self.config);
        for pending in self.sources {
            let source = match pending {
                PendingSource::Ready(source) => source,
                #[cfg(feature = "sqlite")]
                PendingSource::Sqlite { name, config } => {
                    let mut translator = SqlTranslator::new(Dialect::Sqlite);
                    if let Some(prefix) = &self.table_prefix {
                        translator = translator.with_table_prefix(prefix.clone());
                    }
                    tracing::debug!(data_source = %name, path = %config.path, "Opening SQLite data source");
                    DataSource::new(name, translator, SqliteConnection::open(&config)?)
                }
            };
            session.add_data_source(source);
        }
        if self.create_schema {
            session.create_schema()?;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tusk_core::{EntityDef, Property};

    fn registry() -> Registry {
        Registry::builder()
            .entity(EntityDef::new("Note").property(Property::string("title")))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_without_sources() {
        let session = SessionBuilder::new(registry()).build().unwrap();
        assert!(session.data_source("default").is_err());
        assert_eq!(session.config().n1_threshold, 3);
    }

    #[test]
    fn config_setters_compose() {
        let session = SessionBuilder::new(registry())
            .config(SessionConfig::new().track_loads(false))
            .n1_threshold(7)
            .build()
            .unwrap();
        assert_eq!(session.config().n1_threshold, 7);
        assert!(!session.config().track_loads);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_memory_creates_tables() {
        let session = SessionBuilder::new(registry())
            .sqlite_memory()
            .table_prefix("app")
            .create_schema(true)
            .build()
            .unwrap();
        let note = session.create("Note", &[("title", "hello".into())]).unwrap();
        assert!(note.is_clean());
        assert!(
            session
                .statements()
                .iter()
                .any(|sql| sql.contains("\"app_notes\"")),
            "{:?}",
            session.statements()
        );
    }
}
