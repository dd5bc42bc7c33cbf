//! The session: registry, data sources, identity map and record store.

use crate::collection::Collection;
use crate::config::SessionConfig;
use crate::data_source::DataSource;
use crate::identity_map::{Namespace, identity_key};
use crate::record::Record;
use crate::state::RecordState;
use crate::store::{CollectionId, CollectionSlot, RecordId, RecordSlot, Store};
use crate::tracker::{LoadStats, LoadTracker};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tusk_core::{
    ConfigErrorKind, ConnectionError, ConnectionErrorKind, EntityType, Error, Property, Registry,
    Result, Row, Value,
};
use tusk_query::{Condition, Field, Operator, Path, Query, QueryOptions, Subject};

/// A unit of work over one registry.
///
/// Sessions are cheap to clone; clones share every record. A session is
/// single threaded: records and collections are handles into it.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Rc<SessionInner>,
}

pub(crate) struct SessionInner {
    registry: Arc<Registry>,
    config: SessionConfig,
    sources: RefCell<HashMap<String, Rc<DataSource>>>,
    /// Source names in registration order
    source_order: RefCell<Vec<String>>,
    store: RefCell<Store>,
    scopes: RefCell<HashMap<(String, String), QueryOptions>>,
    tracker: RefCell<LoadTracker>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.inner.store.borrow();
        f.debug_struct("Session")
            .field("data_sources", &self.inner.source_order.borrow())
            .field("records", &store.records.len())
            .field("identity_map", &store.identity.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self::with_config(registry, SessionConfig::default())
    }

    pub fn with_config(registry: impl Into<Arc<Registry>>, config: SessionConfig) -> Self {
        let tracker = {
            let mut tracker = LoadTracker::new().with_threshold(config.n1_threshold);
            if !config.track_loads {
                tracker.disable();
            }
            tracker
        };
        Self {
            inner: Rc::new(SessionInner {
                registry: registry.into(),
                config,
                sources: RefCell::new(HashMap::new()),
                source_order: RefCell::new(Vec::new()),
                store: RefCell::new(Store::default()),
                scopes: RefCell::new(HashMap::new()),
                tracker: RefCell::new(tracker),
            }),
        }
    }

    /// A new session over the same registry, data sources and scopes with
    /// an empty identity map.
    pub fn fresh(&self) -> Session {
        let session = Self::with_config(Arc::clone(&self.inner.registry), self.inner.config.clone());
        session
            .inner
            .sources
            .borrow_mut()
            .clone_from(&self.inner.sources.borrow());
        session
            .inner
            .source_order
            .borrow_mut()
            .clone_from(&self.inner.source_order.borrow());
        session
            .inner
            .scopes
            .borrow_mut()
            .clone_from(&self.inner.scopes.borrow());
        session
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ==================== Data sources ====================

    /// Register a data source under its own name, replacing any previous
    /// one with that name.
    pub fn add_data_source(&self, source: DataSource) {
        let source = source.with_log_limit(self.inner.config.statement_log_limit);
        let name = source.name().to_string();
        tracing::debug!(data_source = %name, dialect = ?source.translator().dialect(), "Registering data source");
        let previous = self
            .inner
            .sources
            .borrow_mut()
            .insert(name.clone(), Rc::new(source));
        if previous.is_none() {
            self.inner.source_order.borrow_mut().push(name);
        }
    }

    pub fn data_source(&self, name: &str) -> Result<Rc<DataSource>> {
        self.inner.sources.borrow().get(name).cloned().ok_or_else(|| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::UnknownDataSource,
                message: format!("no data source named '{name}'"),
                source: None,
            })
        })
    }

    pub(crate) fn source_for(&self, entity: &EntityType) -> Result<Rc<DataSource>> {
        self.data_source(&entity.data_source)
    }

    fn sources(&self) -> Vec<Rc<DataSource>> {
        let sources = self.inner.sources.borrow();
        self.inner
            .source_order
            .borrow()
            .iter()
            .filter_map(|name| sources.get(name).cloned())
            .collect()
    }

    /// SELECT statements run by every data source.
    pub fn reads(&self) -> usize {
        self.sources().iter().map(|s| s.reads()).sum()
    }

    /// Write statements run by every data source.
    pub fn writes(&self) -> usize {
        self.sources().iter().map(|s| s.writes()).sum()
    }

    /// Recent statements of every data source, grouped by source.
    pub fn statements(&self) -> Vec<String> {
        self.sources().iter().flat_map(|s| s.statements()).collect()
    }

    /// Create the table of every root entity.
    pub fn create_schema(&self) -> Result<()> {
        for entity in self.inner.registry.entities().filter(|e| e.is_root()) {
            let source = self.source_for(entity)?;
            source.create_schema(entity, &self.inner.registry.table_properties(&entity.name))?;
        }
        Ok(())
    }

    /// Drop the table of every root entity.
    pub fn drop_schema(&self) -> Result<()> {
        for entity in self.inner.registry.entities().filter(|e| e.is_root()) {
            self.source_for(entity)?.drop_schema(entity)?;
        }
        Ok(())
    }

    // ==================== Schema lookups ====================

    pub fn entity(&self, name: &str) -> Result<Arc<EntityType>> {
        self.inner.registry.entity(name)
    }

    pub fn property(&self, entity: &str, name: &str) -> Result<Arc<Property>> {
        let resolved = self.entity(entity)?;
        resolved.property(name).cloned().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownMember,
                Some(entity),
                format!("{entity} has no property '{name}'"),
            )
        })
    }

    /// Resolve a dotted path such as `group.name` from `entity`.
    pub fn path(&self, entity: &str, dotted: &str) -> Result<Path> {
        Path::parse(&self.inner.registry, entity, dotted)
    }

    // ==================== Scopes ====================

    /// Declare a named query scope for `entity` and its descendants.
    pub fn define_scope(&self, entity: &str, name: &str, options: QueryOptions) -> Result<()> {
        self.entity(entity)?;
        self.inner
            .scopes
            .borrow_mut()
            .insert((entity.to_string(), name.to_string()), options);
        Ok(())
    }

    /// The scope `name` declared on `entity` or its nearest ancestor.
    pub(crate) fn scope(&self, entity: &EntityType, name: &str) -> Result<QueryOptions> {
        let scopes = self.inner.scopes.borrow();
        let mut current = Some(entity.name.clone());
        while let Some(entity_name) = current {
            if let Some(options) = scopes.get(&(entity_name.clone(), name.to_string())) {
                return Ok(options.clone());
            }
            current = self
                .inner
                .registry
                .entity(&entity_name)
                .ok()
                .and_then(|e| e.parent.clone());
        }
        Err(Error::config(
            ConfigErrorKind::InvalidScope,
            Some(&entity.name),
            format!("no scope named '{name}'"),
        ))
    }

    // ==================== Records ====================

    /// All records of `entity`, unloaded.
    pub fn find(&self, entity: &str) -> Result<Collection> {
        let entity = self.entity(entity)?;
        let query = self.base_query(&entity);
        Ok(self.collection(self.add_collection(CollectionSlot::new(query))))
    }

    /// A new transient record with property defaults applied.
    pub fn build(&self, entity: &str) -> Result<Record> {
        let entity = self.entity(entity)?;
        let mut slot = RecordSlot::new(Arc::clone(&entity), RecordState::Transient);
        for property in &entity.properties {
            if let Some(default) = &property.default {
                slot.attributes
                    .insert(property.name.clone(), property.deserialize(default)?);
            }
        }
        if let Some(discriminator) = &entity.discriminator {
            slot.attributes
                .insert(discriminator.name.clone(), Value::Text(entity.name.clone()));
        }
        let id = self.store_mut().add_record(slot);
        Ok(self.record(id))
    }

    /// Build a record, mass-assign `attributes` and save it.
    ///
    /// The record is returned whether or not it passed validation; check
    /// [`Record::is_clean`].
    pub fn create(&self, entity: &str, attributes: &[(&str, Value)]) -> Result<Record> {
        let mut record = self.build(entity)?;
        record.set_attributes(attributes)?;
        record.save()?;
        Ok(record)
    }

    /// The record of `entity` with the given key values, from the identity
    /// map when present, otherwise from storage.
    pub fn get(&self, entity: &str, keys: &[Value]) -> Result<Option<Record>> {
        let entity = self.entity(entity)?;
        if keys.len() != entity.keys.len() {
            return Err(Error::Custom(format!(
                "{} has {} key properties, {} values given",
                entity.name,
                entity.keys.len(),
                keys.len()
            )));
        }
        let typed = entity
            .keys
            .iter()
            .zip(keys)
            .map(|(key, value)| key.deserialize(value))
            .collect::<Result<Vec<_>>>()?;

        if let Some(id) = self.lookup(&entity, &typed) {
            return Ok(Some(self.record(id)));
        }

        let subjects: Vec<Subject> = entity
            .keys
            .iter()
            .map(|k| Subject::Property(Arc::clone(k)))
            .collect();
        let condition = Condition::target_conditions(&subjects, &[typed]);
        let query = self
            .base_query(&entity)
            .merge(&QueryOptions::new().filter(condition));
        Ok(self.fetch(&query)?.first().map(|&id| self.record(id)))
    }

    /// Identity-map lookup by typed key values.
    pub(crate) fn lookup(&self, entity: &EntityType, keys: &[Value]) -> Option<RecordId> {
        if keys.iter().any(Value::is_null) {
            return None;
        }
        let key = identity_key(&entity.keys, keys);
        let store = self.store();
        let id = store.identity.get(&namespace(entity), &key)?;
        self.inner
            .registry
            .is_a(&store.record(id).entity.name, &entity.name)
            .then_some(id)
    }

    /// Number of records in the identity map.
    pub fn identity_map_len(&self) -> usize {
        self.store().identity.len()
    }

    // ==================== Load tracking ====================

    pub fn load_stats(&self) -> LoadStats {
        self.inner.tracker.borrow().stats()
    }

    /// Loads recorded for `member` of `entity`.
    pub fn load_count(&self, entity: &str, member: &str) -> usize {
        self.inner.tracker.borrow().count_for(entity, member)
    }

    pub fn reset_load_tracking(&self) {
        self.inner.tracker.borrow_mut().reset();
    }

    pub(crate) fn track_load(&self, entity: &str, member: &str, batch: usize) {
        self.inner
            .tracker
            .borrow_mut()
            .record_load(entity, member, batch);
    }

    // ==================== Internals ====================

    pub(crate) fn store(&self) -> Ref<'_, Store> {
        self.inner.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, Store> {
        self.inner.store.borrow_mut()
    }

    pub(crate) fn record(&self, id: RecordId) -> Record {
        Record::new(self.clone(), id)
    }

    pub(crate) fn collection(&self, id: CollectionId) -> Collection {
        Collection::new(self.clone(), id)
    }

    pub(crate) fn add_collection(&self, slot: CollectionSlot) -> CollectionId {
        self.store_mut().add_collection(slot)
    }

    pub(crate) fn same(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A query over every record of `entity`. Entities below the root of an
    /// inheritance tree are restricted by discriminator.
    pub(crate) fn base_query(&self, entity: &Arc<EntityType>) -> Query {
        let mut query = Query::new(Arc::clone(entity));
        if let (false, Some(discriminator)) = (entity.is_root(), &entity.discriminator) {
            let names = self
                .inner
                .registry
                .descendants(&entity.name)
                .into_iter()
                .map(Value::Text)
                .collect();
            query.conditions = Condition::compare(
                Operator::In,
                Subject::Property(Arc::clone(discriminator)),
                Value::Array(names),
            );
        }
        query
    }

    /// Run `query` and map its rows to records.
    pub(crate) fn fetch(&self, query: &Query) -> Result<Vec<RecordId>> {
        let mut query = query.clone();
        if !query.unique {
            let entity = Arc::clone(&query.entity);
            for key in entity.keys.iter().chain(entity.discriminator.iter()) {
                if !query.selects(key) {
                    query.fields.push(Field::Property(Arc::clone(key)));
                }
            }
        }
        let rows = self.source_for(&query.entity)?.read(&query)?;
        self.map_rows(&query, rows)
    }

    /// Turn rows into records, reusing records already in the identity map.
    ///
    /// Loaded attributes of known records are kept unless the query
    /// reloads. Rows of a grouped query become immutable records outside
    /// the identity map.
    #[tracing::instrument(level = "trace", skip_all, fields(entity = %query.entity.name, rows = rows.len()))]
    pub(crate) fn map_rows(&self, query: &Query, rows: Vec<Row>) -> Result<Vec<RecordId>> {
        let namespace = namespace(&query.entity);
        let properties: Vec<Arc<Property>> = query.properties().cloned().collect();
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let entity = self.row_entity(&query.entity, &row)?;
            let mut values = HashMap::with_capacity(properties.len());
            for property in &properties {
                let raw = row.get_by_name(&property.name).unwrap_or(&Value::Null);
                values.insert(property.name.clone(), property.deserialize(raw)?);
            }

            let mut store = self.store_mut();
            if query.unique {
                let mut slot = RecordSlot::new(entity, RecordState::Immutable);
                slot.attributes = values;
                ids.push(store.add_record(slot));
                continue;
            }

            let key_values: Vec<Value> = entity
                .keys
                .iter()
                .map(|k| values.get(&k.name).cloned().unwrap_or(Value::Null))
                .collect();
            let key = identity_key(&entity.keys, &key_values);

            match store.identity.get(&namespace, &key) {
                Some(id) => {
                    let slot = store.record_mut(id);
                    if query.reload {
                        slot.attributes.extend(values);
                        slot.originals.clear();
                        if slot.state == RecordState::Dirty {
                            slot.state = RecordState::Clean;
                        }
                    } else {
                        for (name, value) in values {
                            slot.attributes.entry(name).or_insert(value);
                        }
                    }
                    ids.push(id);
                }
                None => {
                    let mut slot = RecordSlot::new(entity, RecordState::Clean);
                    slot.attributes = values;
                    slot.key = Some(key.clone());
                    let id = store.add_record(slot);
                    store.identity.insert(namespace.clone(), key, id);
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// The entity a row belongs to, read from its discriminator.
    fn row_entity(&self, base: &Arc<EntityType>, row: &Row) -> Result<Arc<EntityType>> {
        let Some(discriminator) = &base.discriminator else {
            return Ok(Arc::clone(base));
        };
        match row.get_by_name(&discriminator.name) {
            Some(Value::Text(name)) if name != &base.name => {
                if self.inner.registry.is_a(name, &base.name) {
                    self.entity(name)
                } else {
                    Err(Error::cross_model(&base.name, name))
                }
            }
            _ => Ok(Arc::clone(base)),
        }
    }

    /// Register a persisted record under its current key.
    pub(crate) fn register(&self, id: RecordId) {
        let mut store = self.store_mut();
        let (namespace, key) = {
            let slot = store.record(id);
            let values: Vec<Value> = slot
                .entity
                .keys
                .iter()
                .map(|k| slot.attributes.get(&k.name).cloned().unwrap_or(Value::Null))
                .collect();
            (
                namespace(&slot.entity),
                identity_key(&slot.entity.keys, &values),
            )
        };
        store.record_mut(id).key = Some(key.clone());
        store.identity.insert(namespace, key, id);
    }

    /// Take a record out of the identity map.
    /// Take `id` out of the identity map, returning the key it was under.
    pub(crate) fn unregister(&self, id: RecordId) -> Option<String> {
        let mut store = self.store_mut();
        let namespace = namespace(&store.record(id).entity);
        let key = store.record_mut(id).key.take()?;
        store.identity.remove(&namespace, &key, id);
        Some(key)
    }

    /// Put `id` back under a key returned by [`Session::unregister`].
    pub(crate) fn reregister(&self, id: RecordId, key: Option<String>) {
        let Some(key) = key else { return };
        let mut store = self.store_mut();
        let namespace = namespace(&store.record(id).entity);
        store.record_mut(id).key = Some(key.clone());
        store.identity.insert(namespace, key, id);
    }
}

/// Identity-map namespace of an entity.
pub(crate) fn namespace(entity: &EntityType) -> Namespace {
    (entity.data_source.clone(), entity.root.clone())
}
