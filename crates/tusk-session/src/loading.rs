//! Batched loading of relationships and lazy properties.
//!
//! Records remember the collection that loaded them. When one record needs
//! a relationship or a lazy property that is not loaded, it is loaded for
//! every record of that collection with a single query, and the fetched
//! records are kept together in a child collection so their own members
//! batch the same way. Walking `users -> group -> owner` costs one query
//! per hop no matter how many users there are.
//!
//! Many-to-many relationships load the join records first and then the
//! targets through them, two queries for the whole batch.

use crate::session::Session;
use crate::store::{CollectionId, CollectionSlot, RecordId, RelationValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tusk_core::{
    Cardinality, ConfigErrorKind, Error, Property, Relationship, Result, Value,
};
use tusk_query::{Condition, Field, Query, QueryOptions, Subject, signature};

impl Session {
    /// The collection `record` batches with and its records.
    ///
    /// Records of a relationship collection batch with every record loaded
    /// for the same relationship across the source's own batch.
    pub(crate) fn batch_of(&self, record: RecordId) -> (Option<CollectionId>, Vec<RecordId>) {
        let store = self.store();
        let Some(loaded_by) = store.record(record).collection else {
            return (None, vec![record]);
        };
        let context = match &store.collection(loaded_by).binding {
            Some(binding) => store
                .record(binding.source)
                .collection
                .and_then(|c| {
                    store
                        .collection(c)
                        .children
                        .get(&binding.relationship.name)
                        .copied()
                })
                .unwrap_or(loaded_by),
            None => loaded_by,
        };
        match &store.collection(context).records {
            Some(ids) if ids.contains(&record) => (Some(context), ids.clone()),
            _ => (None, vec![record]),
        }
    }

    /// Values of `properties` on a record, loading them if needed.
    pub(crate) fn values_of(&self, record: RecordId, properties: &[Arc<Property>]) -> Result<Vec<Value>> {
        let handle = self.record(record);
        properties.iter().map(|p| handle.property_value(p)).collect()
    }

    /// Records currently related to `record` through a loaded relationship.
    pub(crate) fn related_ids(&self, record: RecordId, relationship: &str) -> Vec<RecordId> {
        let store = self.store();
        match store.record(record).relations.get(relationship) {
            Some(RelationValue::One(Some(id))) => vec![*id],
            Some(RelationValue::Many(c)) => store.collection(*c).records.clone().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Load `relationship` for every record of `sources` that lacks it.
    ///
    /// `options` refines the query for the targets (fields, order). When a
    /// `context` collection is given the fetched targets are remembered as
    /// its child for `relationship`.
    #[tracing::instrument(level = "debug", skip_all, fields(relationship = %relationship.name, sources = sources.len()))]
    pub(crate) fn eager_load(
        &self,
        context: Option<CollectionId>,
        sources: &[RecordId],
        relationship: &Arc<Relationship>,
        options: &QueryOptions,
    ) -> Result<()> {
        if relationship.cardinality == Cardinality::ManyToMany {
            return self.eager_load_through(context, sources, relationship, options);
        }

        let pending = self.pending_sources(sources, relationship);
        if pending.is_empty() {
            return Ok(());
        }

        let mut tuples = Vec::with_capacity(pending.len());
        for &source in &pending {
            tuples.push(self.values_of(source, &relationship.source_keys)?);
        }

        let target = self.entity(&relationship.target)?;
        let mut query = self.base_query(&target).merge(options);
        for key in &relationship.target_keys {
            if !query.selects(key) {
                query.fields.push(Field::Property(Arc::clone(key)));
            }
        }

        let targets = if tuples.iter().any(|t| t.iter().all(|v| !v.is_null())) {
            let subjects: Vec<Subject> = relationship
                .target_keys
                .iter()
                .map(|k| Subject::Property(Arc::clone(k)))
                .collect();
            let condition = Condition::target_conditions(&subjects, &tuples);
            tracing::debug!(
                relationship = %relationship.name,
                source = %relationship.source,
                batch = pending.len(),
                "Loading relationship"
            );
            let ids = self.fetch(&query.merge(&QueryOptions::new().filter(condition)))?;
            self.track_load(&relationship.source, &relationship.name, pending.len());
            ids
        } else {
            Vec::new()
        };

        let mut buckets: HashMap<String, Vec<RecordId>> = HashMap::new();
        for &id in &targets {
            let key = signature(&self.values_of(id, &relationship.target_keys)?);
            buckets.entry(key).or_default().push(id);
        }

        for (&source, tuple) in pending.iter().zip(&tuples) {
            let found = if tuple.iter().any(Value::is_null) {
                Vec::new()
            } else {
                buckets.get(&signature(tuple)).cloned().unwrap_or_default()
            };
            self.associate(source, relationship, found, &query);
        }

        self.adopt(context, relationship, query, targets);
        Ok(())
    }

    fn eager_load_through(
        &self,
        context: Option<CollectionId>,
        sources: &[RecordId],
        relationship: &Arc<Relationship>,
        options: &QueryOptions,
    ) -> Result<()> {
        let (Some(through), Some(via)) = (&relationship.through, &relationship.via) else {
            return Err(Error::config(
                ConfigErrorKind::Unsupported,
                Some(&relationship.source),
                format!("'{}' has no join relationships", relationship.name),
            ));
        };

        let pending = self.pending_sources(sources, relationship);
        if pending.is_empty() {
            return Ok(());
        }

        self.eager_load(context, &pending, through, &QueryOptions::new())?;

        let mut joins_by_source = Vec::with_capacity(pending.len());
        let mut joins = Vec::new();
        let mut seen = HashSet::new();
        for &source in &pending {
            let ids = self.related_ids(source, &through.name);
            joins.extend(ids.iter().copied().filter(|id| seen.insert(*id)));
            joins_by_source.push(ids);
        }

        let join_context = context.and_then(|c| {
            self.store()
                .collection(c)
                .children
                .get(&through.name)
                .copied()
        });
        self.eager_load(join_context, &joins, via, options)?;

        let target = self.entity(&relationship.target)?;
        let query = self.base_query(&target).merge(options);
        let mut targets = Vec::new();
        let mut seen = HashSet::new();
        for (&source, join_ids) in pending.iter().zip(&joins_by_source) {
            let mut related = Vec::new();
            let mut own = HashSet::new();
            for &join in join_ids {
                for id in self.related_ids(join, &via.name) {
                    if own.insert(id) {
                        related.push(id);
                    }
                    if seen.insert(id) {
                        targets.push(id);
                    }
                }
            }
            self.associate(source, relationship, related, &query);
        }

        self.adopt(context, relationship, query, targets);
        Ok(())
    }

    /// Sources that declare `relationship` and have not loaded it.
    fn pending_sources(&self, sources: &[RecordId], relationship: &Relationship) -> Vec<RecordId> {
        let store = self.store();
        let mut seen = HashSet::new();
        sources
            .iter()
            .copied()
            .filter(|&id| {
                let slot = store.record(id);
                slot.entity.relationship(&relationship.name).is_some()
                    && !slot.has_relation(&relationship.name, &store.collections)
                    && seen.insert(id)
            })
            .collect()
    }

    /// Store a loaded relationship value on `source`.
    pub(crate) fn associate(
        &self,
        source: RecordId,
        relationship: &Arc<Relationship>,
        found: Vec<RecordId>,
        query: &Query,
    ) {
        let mut store = self.store_mut();
        if relationship.is_to_one() {
            store.record_mut(source).relations.insert(
                relationship.name.clone(),
                RelationValue::One(found.first().copied()),
            );
            return;
        }
        let existing = match store.record(source).relations.get(&relationship.name) {
            Some(RelationValue::Many(id)) => Some(*id),
            _ => None,
        };
        match existing {
            Some(id) => {
                let slot = store.collection_mut(id);
                slot.records = Some(found);
                slot.invalidate();
            }
            None => {
                let slot = CollectionSlot::bound(query.clone(), Arc::clone(relationship), source)
                    .with_records(found);
                let id = store.add_collection(slot);
                store
                    .record_mut(source)
                    .relations
                    .insert(relationship.name.clone(), RelationValue::Many(id));
            }
        }
    }

    /// Keep the fetched targets together so their own members batch.
    fn adopt(
        &self,
        context: Option<CollectionId>,
        relationship: &Relationship,
        query: Query,
        targets: Vec<RecordId>,
    ) {
        let mut store = self.store_mut();
        let child = store.add_collection(CollectionSlot::new(query).with_records(targets.clone()));
        for id in targets {
            store.record_mut(id).collection = Some(child);
        }
        if let Some(context) = context {
            store
                .collection_mut(context)
                .children
                .insert(relationship.name.clone(), child);
        }
    }

    /// Load a lazy property for `record` and the rest of its batch.
    pub(crate) fn load_property(&self, record: RecordId, property: &Arc<Property>) -> Result<()> {
        let (_, batch) = self.batch_of(record);
        let (entity, pending) = {
            let store = self.store();
            let entity = Arc::clone(&store.record(record).entity);
            let mut pending: Vec<RecordId> = batch
                .into_iter()
                .filter(|&id| {
                    let slot = store.record(id);
                    slot.state.is_persisted()
                        && slot.entity.root == entity.root
                        && slot.entity.has_property(property)
                        && !slot.attributes.contains_key(&property.name)
                })
                .collect();
            if !pending.contains(&record) {
                pending.push(record);
            }
            (entity, pending)
        };

        let keys = entity.keys.clone();
        let mut tuples = Vec::with_capacity(pending.len());
        let mut by_key = HashMap::with_capacity(pending.len());
        for &id in &pending {
            let values = self.persisted_key(id);
            by_key.insert(signature(&values), id);
            tuples.push(values);
        }

        let subjects: Vec<Subject> = keys.iter().map(|k| Subject::Property(Arc::clone(k))).collect();
        let mut query = Query::new(self.entity(&property.entity)?);
        query.fields = keys
            .iter()
            .chain(std::iter::once(property))
            .map(|p| Field::Property(Arc::clone(p)))
            .collect();
        query.conditions = Condition::target_conditions(&subjects, &tuples);

        tracing::debug!(
            entity = %entity.name,
            property = %property.name,
            batch = pending.len(),
            "Loading lazy property"
        );
        let rows = self.source_for(&entity)?.read(&query)?;
        self.track_load(&entity.name, &property.name, pending.len());

        let mut store = self.store_mut();
        for row in rows {
            let mut values = Vec::with_capacity(keys.len());
            for key in &keys {
                values.push(key.deserialize(row.get_by_name(&key.name).unwrap_or(&Value::Null))?);
            }
            if let Some(&id) = by_key.get(&signature(&values)) {
                let value = property.deserialize(row.get_by_name(&property.name).unwrap_or(&Value::Null))?;
                store
                    .record_mut(id)
                    .attributes
                    .entry(property.name.clone())
                    .or_insert(value);
            }
        }
        for id in pending {
            store
                .record_mut(id)
                .attributes
                .entry(property.name.clone())
                .or_insert(Value::Null);
        }
        Ok(())
    }

    /// Key values as stored, ignoring uncommitted key changes.
    pub(crate) fn persisted_key(&self, record: RecordId) -> Vec<Value> {
        let store = self.store();
        let slot = store.record(record);
        slot.entity
            .keys
            .iter()
            .map(|k| {
                slot.originals
                    .get(&k.name)
                    .or_else(|| slot.attributes.get(&k.name))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}
