//! Records: one row of an entity, tracked by the session.
//!
//! A [`Record`] is a handle. Cloning it clones the handle, and two handles
//! to the same row compare equal. Attribute reads load lazily, in batches
//! with the records loaded alongside; writes follow the state machine in
//! [`RecordState`].
//!
//! ```ignore
//! let user = session.find("User")?.first()?.unwrap();
//! user.set("nickname", "Lenny")?;
//! assert!(user.is_dirty());
//! user.save()?;
//! assert!(user.is_clean());
//! ```

use crate::collection::Collection;
use crate::session::Session;
use crate::state::RecordState;
use crate::store::{CollectionSlot, RecordId, RelationValue};
use std::fmt;
use std::sync::Arc;
use tusk_core::{
    AccessErrorKind, Cardinality, EntityType, Error, FromValue, Member, Property, PropertyKind,
    Relationship, Result, Value, timestamp,
};
use tusk_query::{Condition, Hop, Path, QueryOptions, RecordAccess, Subject, signature};

#[derive(Clone)]
pub struct Record {
    session: Session,
    id: RecordId,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.session.same(&other.session)
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.session.store();
        let slot = store.record(self.id);
        f.debug_struct("Record")
            .field("entity", &slot.entity.name)
            .field("state", &slot.state)
            .field("key", &slot.key)
            .finish_non_exhaustive()
    }
}

impl Record {
    pub(crate) fn new(session: Session, id: RecordId) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn entity(&self) -> Arc<EntityType> {
        Arc::clone(&self.session.store().record(self.id).entity)
    }

    pub fn state(&self) -> RecordState {
        self.session.store().record(self.id).state
    }

    pub fn is_transient(&self) -> bool {
        self.state() == RecordState::Transient
    }

    pub fn is_clean(&self) -> bool {
        self.state() == RecordState::Clean
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == RecordState::Dirty
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == RecordState::Deleted
    }

    pub fn is_immutable(&self) -> bool {
        self.state() == RecordState::Immutable
    }

    /// Key values as stored. Uncommitted key changes are not included.
    pub fn key(&self) -> Vec<Value> {
        self.session.persisted_key(self.id)
    }

    /// Whether the record is registered in the identity map.
    pub fn is_registered(&self) -> bool {
        self.session.store().record(self.id).key.is_some()
    }

    fn access_error(&self, kind: AccessErrorKind, member: Option<&str>, message: impl Into<String>) -> Error {
        Error::access(kind, &self.entity().name, member, message)
    }

    fn state_error(&self, kind: AccessErrorKind, member: &str) -> Error {
        let message = match kind {
            AccessErrorKind::DeletedImmutable => "record is deleted and awaiting commit",
            AccessErrorKind::Immutable => "record is immutable",
            _ => "member is not accessible",
        };
        self.access_error(kind, Some(member), message)
    }

    // ==================== Attributes ====================

    /// Read a property.
    pub fn get(&self, name: &str) -> Result<Value> {
        let property = self.readable_property(name)?;
        self.property_value(&property)
    }

    /// Read a property converted to `T`.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(&self.get(name)?)
    }

    /// Write a property. The value is converted to the property's type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let entity = self.entity();
        match entity.member(name) {
            Some(Member::Property(property)) if property.writable => {
                self.write_property(&property, value.into())
            }
            Some(Member::Property(_)) => Err(self.access_error(
                AccessErrorKind::NotWritable,
                Some(name),
                "property is not writable",
            )),
            Some(Member::Relationship(_)) => Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a relationship; use set_one or set_many",
            )),
            None => Err(self.access_error(AccessErrorKind::Unknown, Some(name), "no such member")),
        }
    }

    /// Assign several properties at once. Members that are not mass
    /// assignable are skipped.
    pub fn set_attributes(&mut self, attributes: &[(&str, Value)]) -> Result<()> {
        let entity = self.entity();
        for (name, value) in attributes {
            match entity.member(name) {
                Some(Member::Property(property))
                    if property.mass_assignable && property.writable =>
                {
                    self.write_property(&property, value.clone())?;
                }
                Some(_) => {
                    tracing::debug!(entity = %entity.name, member = %name, "Skipping member that is not mass assignable");
                }
                None => {
                    return Err(self.access_error(AccessErrorKind::Unknown, Some(name), "no such member"));
                }
            }
        }
        Ok(())
    }

    /// Whether a property value is in memory.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.session
            .store()
            .record(self.id)
            .attributes
            .contains_key(name)
    }

    /// Loaded attributes in property order.
    pub fn attributes(&self) -> Vec<(String, Value)> {
        let store = self.session.store();
        let slot = store.record(self.id);
        slot.entity
            .properties
            .iter()
            .filter_map(|p| Some((p.name.clone(), slot.attributes.get(&p.name)?.clone())))
            .collect()
    }

    /// Changed properties with their new values, in property order.
    pub fn dirty_attributes(&self) -> Vec<(String, Value)> {
        let store = self.session.store();
        let slot = store.record(self.id);
        slot.entity
            .properties
            .iter()
            .filter(|p| slot.originals.contains_key(&p.name))
            .map(|p| {
                (
                    p.name.clone(),
                    slot.attributes.get(&p.name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    /// Value of a changed property before the change.
    pub fn original(&self, name: &str) -> Option<Value> {
        self.session
            .store()
            .record(self.id)
            .originals
            .get(name)
            .cloned()
    }

    fn readable_property(&self, name: &str) -> Result<Arc<Property>> {
        match self.entity().member(name) {
            Some(Member::Property(property)) if property.readable => Ok(property),
            Some(Member::Property(_)) => Err(self.access_error(
                AccessErrorKind::NotReadable,
                Some(name),
                "property is not readable",
            )),
            Some(Member::Relationship(_)) => Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a relationship; use one or many",
            )),
            None => Err(self.access_error(AccessErrorKind::Unknown, Some(name), "no such member")),
        }
    }

    /// Value of `property`, loading it with the record's batch if needed.
    pub(crate) fn property_value(&self, property: &Arc<Property>) -> Result<Value> {
        let state = {
            let store = self.session.store();
            let slot = store.record(self.id);
            if let Some(value) = slot.attributes.get(&property.name) {
                return Ok(value.clone());
            }
            if !slot.entity.has_property(property) {
                return Ok(Value::Null);
            }
            slot.state
        };
        if let Err(kind) = state.check_read(false) {
            return Err(self.state_error(kind, &property.name));
        }
        if !state.is_persisted() {
            return Ok(Value::Null);
        }
        self.session.load_property(self.id, property)?;
        Ok(self
            .session
            .store()
            .record(self.id)
            .attributes
            .get(&property.name)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Write `property` through the state machine, bypassing the writable
    /// flag. Key mirroring and condition application use this.
    pub(crate) fn write_property(&self, property: &Arc<Property>, value: Value) -> Result<()> {
        let state = self.state();
        if let Err(kind) = state.check_write() {
            return Err(self.state_error(kind, &property.name));
        }
        let value = property.deserialize(&value)?;
        let current = if state.is_persisted() {
            self.property_value(property)?
        } else {
            self.session
                .store()
                .record(self.id)
                .attributes
                .get(&property.name)
                .cloned()
                .unwrap_or(Value::Null)
        };

        let mut store = self.session.store_mut();
        let slot = store.record_mut(self.id);
        let next = slot
            .state
            .on_set(&mut slot.originals, &property.name, &current, &value);
        slot.attributes.insert(property.name.clone(), value);
        slot.state = next;
        Ok(())
    }

    fn is_valid(&self, entity: &EntityType, property: &Property, value: &Value) -> bool {
        if !property.is_valid(value) {
            return false;
        }
        match (property.kind, value) {
            (PropertyKind::Discriminator, Value::Text(name)) => {
                self.session.registry().is_a(name, &entity.root)
            }
            _ => true,
        }
    }

    // ==================== Lifecycle ====================

    /// Write pending changes to storage.
    ///
    /// Returns `Ok(false)` when the record fails validation; it keeps its
    /// state and changes.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = %self.entity().name, state = ?self.state()))]
    pub fn commit(&self) -> Result<bool> {
        match self.state() {
            RecordState::Clean | RecordState::Immutable => Ok(true),
            RecordState::Transient => self.insert(),
            RecordState::Dirty => self.update(),
            RecordState::Deleted => self.delete_row(),
        }
    }

    fn insert(&self) -> Result<bool> {
        let entity = self.entity();
        let mut values = Vec::new();
        {
            let store = self.session.store();
            let slot = store.record(self.id);
            for property in &entity.properties {
                let value = slot
                    .attributes
                    .get(&property.name)
                    .cloned()
                    .unwrap_or(Value::Null);
                if !self.is_valid(&entity, property, &value) {
                    tracing::debug!(entity = %entity.name, property = %property.name, "Record failed validation");
                    return Ok(false);
                }
                if !(value.is_null() && (property.serial || property.default.is_none()))
                    && slot.attributes.contains_key(&property.name)
                {
                    values.push((Arc::clone(property), value));
                }
            }
        }

        let id = self.session.source_for(&entity)?.create(&entity, &values)?;

        {
            let mut store = self.session.store_mut();
            let slot = store.record_mut(self.id);
            for key in entity.keys.iter().filter(|k| k.serial) {
                let assigned = slot.attributes.get(&key.name).is_none_or(Value::is_null);
                if assigned {
                    slot.attributes.insert(key.name.clone(), Value::BigInt(id));
                }
            }
            for property in &entity.properties {
                slot.attributes
                    .entry(property.name.clone())
                    .or_insert(Value::Null);
            }
            slot.originals.clear();
            slot.state = slot.state.on_commit();
        }
        self.session.register(self.id);
        tracing::debug!(entity = %entity.name, id, "Inserted record");
        Ok(true)
    }

    fn update(&self) -> Result<bool> {
        let entity = self.entity();
        let persisted = self.session.unregister(self.id);
        let outcome = self.write_update(&entity);
        if outcome.is_err() {
            // storage still holds the old row
            self.session.reregister(self.id, persisted);
        }
        outcome
    }

    fn write_update(&self, entity: &Arc<EntityType>) -> Result<bool> {
        self.sync_child_keys()?;

        let changes: Vec<(Arc<Property>, Value)> = {
            let store = self.session.store();
            let slot = store.record(self.id);
            entity
                .properties
                .iter()
                .filter(|p| slot.originals.contains_key(&p.name))
                .map(|p| {
                    (
                        Arc::clone(p),
                        slot.attributes.get(&p.name).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect()
        };

        for (property, value) in &changes {
            if !self.is_valid(entity, property, value) {
                tracing::warn!(
                    entity = %entity.name,
                    property = %property.name,
                    "Record failed validation; it stays out of the identity map until rolled back or committed"
                );
                return Ok(false);
            }
        }

        if !changes.is_empty() {
            let key: Vec<(Arc<Property>, Value)> = entity
                .keys
                .iter()
                .cloned()
                .zip(self.key())
                .collect();
            self.session
                .source_for(entity)?
                .update(entity, &changes, &key)?;
        }

        {
            let mut store = self.session.store_mut();
            let slot = store.record_mut(self.id);
            slot.originals.clear();
            slot.state = slot.state.on_commit();
        }
        self.session.register(self.id);
        Ok(true)
    }

    fn delete_row(&self) -> Result<bool> {
        let entity = self.entity();
        let key: Vec<(Arc<Property>, Value)> = entity
            .keys
            .iter()
            .cloned()
            .zip(self.key())
            .collect();
        self.session.source_for(&entity)?.delete(&entity, &key)?;
        self.session.unregister(self.id);
        let mut store = self.session.store_mut();
        let slot = store.record_mut(self.id);
        slot.state = slot.state.on_commit();
        Ok(true)
    }

    /// Mark the record for deletion on the next commit, reverting any
    /// uncommitted changes.
    pub fn delete(&self) -> Result<()> {
        let state = self.state();
        let next = state
            .on_delete()
            .map_err(|kind| self.state_error(kind, "delete"))?;
        let mut store = self.session.store_mut();
        let slot = store.record_mut(self.id);
        if state == RecordState::Dirty {
            let originals = std::mem::take(&mut slot.originals);
            slot.attributes.extend(originals);
        }
        slot.state = next;
        Ok(())
    }

    /// Delete and commit. A transient record is left alone.
    pub fn destroy(&self) -> Result<bool> {
        if self.is_transient() {
            return Ok(true);
        }
        self.delete()?;
        self.commit()
    }

    /// Revert uncommitted changes.
    pub fn rollback(&self) {
        let state = self.state();
        if state != RecordState::Dirty {
            return;
        }
        let registered = {
            let mut store = self.session.store_mut();
            let slot = store.record_mut(self.id);
            let originals = std::mem::take(&mut slot.originals);
            slot.attributes.extend(originals);
            slot.state = state.on_rollback();
            slot.key.is_some()
        };
        if !registered {
            self.session.register(self.id);
        }
    }

    /// Revert uncommitted changes and re-read loaded properties.
    pub fn reload(&self) -> Result<()> {
        self.rollback();
        if !matches!(self.state(), RecordState::Clean) {
            return Ok(());
        }
        let entity = self.entity();
        let loaded: Vec<Arc<Property>> = {
            let store = self.session.store();
            let slot = store.record(self.id);
            entity
                .properties
                .iter()
                .filter(|p| slot.attributes.contains_key(&p.name))
                .cloned()
                .collect()
        };
        let subjects: Vec<Subject> = entity
            .keys
            .iter()
            .map(|k| Subject::Property(Arc::clone(k)))
            .collect();
        let condition = Condition::target_conditions(&subjects, &[self.key()]);
        let query = self.session.base_query(&entity).merge(
            &QueryOptions::new()
                .filter(condition)
                .fields(loaded)
                .reload(true),
        );
        self.session.fetch(&query)?;
        Ok(())
    }

    /// A loaded collection holding only this record, scoped to its key.
    pub fn collection_for_self(&self) -> Collection {
        let entity = self.entity();
        let subjects: Vec<Subject> = entity
            .keys
            .iter()
            .map(|k| Subject::Property(Arc::clone(k)))
            .collect();
        let condition = Condition::target_conditions(&subjects, &[self.key()]);
        let query = self
            .session
            .base_query(&entity)
            .merge(&QueryOptions::new().filter(condition));
        let id = self
            .session
            .add_collection(CollectionSlot::new(query).with_records(vec![self.id]));
        self.session.collection(id)
    }

    /// Save the record with its parents and loaded children.
    ///
    /// Parents (records this one holds foreign keys of) are saved first and
    /// their keys copied over, then the record is committed, then every
    /// loaded to-many collection and one-to-one child is saved. Returns
    /// `Ok(false)` as soon as any of them fails validation.
    pub fn save(&self) -> Result<bool> {
        if !self.enter("save") {
            return Ok(true);
        }
        let result = self.save_graph();
        self.leave("save");
        result
    }

    fn save_graph(&self) -> Result<bool> {
        let entity = self.entity();

        for relationship in entity.relationships.iter().filter(|r| r.source_holds_keys()) {
            let Some(parent) = self.loaded_one(&relationship.name) else {
                continue;
            };
            if !parent.save()? {
                return Ok(false);
            }
            if self.state().check_write().is_ok() {
                self.copy_keys(relationship, &parent)?;
            }
        }

        if !self.commit()? {
            return Ok(false);
        }

        for relationship in entity.relationships.iter().filter(|r| !r.source_holds_keys()) {
            let value = self
                .session
                .store()
                .record(self.id)
                .relations
                .get(&relationship.name)
                .copied();
            match value {
                Some(RelationValue::Many(id)) => {
                    if !self.session.collection(id).save()? {
                        return Ok(false);
                    }
                }
                Some(RelationValue::One(Some(id))) => {
                    let child = self.session.record(id);
                    if child.state().check_write().is_ok() {
                        for (source_key, target_key) in relationship.key_pairs() {
                            child.write_property(target_key, self.property_value(source_key)?)?;
                        }
                    }
                    if !child.save()? {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }

    /// Copy `parent`'s target keys into this record's foreign keys.
    fn copy_keys(&self, relationship: &Relationship, parent: &Record) -> Result<()> {
        for (source_key, target_key) in relationship.key_pairs() {
            self.write_property(source_key, parent.property_value(target_key)?)?;
        }
        Ok(())
    }

    /// Point loaded children at this record's current key.
    fn sync_child_keys(&self) -> Result<()> {
        let entity = self.entity();
        for relationship in entity
            .relationships
            .iter()
            .filter(|r| matches!(r.cardinality, Cardinality::OneToMany | Cardinality::OneToOne))
        {
            for child in self.session.related_ids(self.id, &relationship.name) {
                let child = self.session.record(child);
                if child.state().check_write().is_err() {
                    continue;
                }
                for (source_key, target_key) in relationship.key_pairs() {
                    child.write_property(target_key, self.property_value(source_key)?)?;
                }
            }
        }
        Ok(())
    }

    fn enter(&self, guard: &'static str) -> bool {
        self.session
            .store_mut()
            .record_mut(self.id)
            .guards
            .insert(guard)
    }

    fn leave(&self, guard: &'static str) {
        self.session
            .store_mut()
            .record_mut(self.id)
            .guards
            .remove(guard);
    }

    // ==================== Relationships ====================

    fn relationship(&self, name: &str) -> Result<Arc<Relationship>> {
        match self.entity().member(name) {
            Some(Member::Relationship(relationship)) => Ok(relationship),
            Some(Member::Property(_)) => Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a property; use get",
            )),
            None => Err(self.access_error(AccessErrorKind::Unknown, Some(name), "no such member")),
        }
    }

    fn loaded_one(&self, name: &str) -> Option<Record> {
        match self.session.store().record(self.id).relations.get(name) {
            Some(RelationValue::One(Some(id))) => Some(self.session.record(*id)),
            _ => None,
        }
    }

    /// The record a to-one relationship points at.
    ///
    /// Many-to-one targets already in the identity map are returned without
    /// a query; otherwise the relationship is loaded for the whole batch.
    pub fn one(&self, name: &str) -> Result<Option<Record>> {
        let relationship = self.relationship(name)?;
        if !relationship.is_to_one() {
            return Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a to-many relationship; use many",
            ));
        }

        let cached = self
            .session
            .store()
            .record(self.id)
            .relations
            .get(name)
            .copied();
        if let Some(RelationValue::One(target)) = cached {
            if !relationship.source_holds_keys() || self.keys_point_at(&relationship, target)? {
                return Ok(target.map(|id| self.session.record(id)));
            }
            self.session
                .store_mut()
                .record_mut(self.id)
                .relations
                .remove(name);
        }

        if let Err(kind) = self.state().check_read(false) {
            return Err(self.state_error(kind, name));
        }

        if relationship.source_holds_keys() {
            let keys = self.session.values_of(self.id, &relationship.source_keys)?;
            if keys.iter().any(Value::is_null) {
                self.store_one(name, None);
                return Ok(None);
            }
            let target = self.session.entity(&relationship.target)?;
            let by_identity = target.keys.len() == relationship.target_keys.len()
                && target
                    .keys
                    .iter()
                    .zip(&relationship.target_keys)
                    .all(|(a, b)| a.name == b.name);
            if by_identity {
                if let Some(id) = self.session.lookup(&target, &keys) {
                    self.store_one(name, Some(id));
                    return Ok(Some(self.session.record(id)));
                }
            }
        } else if !self.state().is_persisted() {
            return Ok(None);
        }

        let (context, batch) = self.session.batch_of(self.id);
        self.session
            .eager_load(context, &batch, &relationship, &QueryOptions::new())?;
        Ok(self.loaded_one(name))
    }

    /// Whether the foreign keys still name `target`. Unset keys keep a
    /// pending assignment.
    fn keys_point_at(&self, relationship: &Relationship, target: Option<RecordId>) -> Result<bool> {
        let keys = self.session.values_of(self.id, &relationship.source_keys)?;
        if keys.iter().all(Value::is_null) {
            return Ok(true);
        }
        let Some(target) = target else {
            return Ok(false);
        };
        let target_keys = self.session.values_of(target, &relationship.target_keys)?;
        Ok(target_keys.iter().any(Value::is_null) || signature(&keys) == signature(&target_keys))
    }

    fn store_one(&self, name: &str, target: Option<RecordId>) {
        self.session
            .store_mut()
            .record_mut(self.id)
            .relations
            .insert(name.to_string(), RelationValue::One(target));
    }

    /// The collection of records a to-many relationship holds. The
    /// collection loads on first use, for the record's whole batch.
    pub fn many(&self, name: &str) -> Result<Collection> {
        let relationship = self.relationship(name)?;
        if !relationship.is_to_many() {
            return Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a to-one relationship; use one",
            ));
        }
        let existing = self
            .session
            .store()
            .record(self.id)
            .relations
            .get(name)
            .copied();
        if let Some(RelationValue::Many(id)) = existing {
            return Ok(self.session.collection(id));
        }
        if let Err(kind) = self.state().check_read(false) {
            return Err(self.state_error(kind, name));
        }

        let target = self.session.entity(&relationship.target)?;
        let mut slot = CollectionSlot::bound(self.session.base_query(&target), relationship, self.id);
        if !self.state().is_persisted() {
            slot.records = Some(Vec::new());
        }
        let id = self.session.add_collection(slot);
        self.session
            .store_mut()
            .record_mut(self.id)
            .relations
            .insert(name.to_string(), RelationValue::Many(id));
        Ok(self.session.collection(id))
    }

    /// Point a to-one relationship at `target`, or clear it.
    ///
    /// Many-to-one relationships copy the target's keys into this record's
    /// foreign keys. One-to-one relationships write this record's key into
    /// the new target and clear it on the previous one.
    pub fn set_one(&mut self, name: &str, target: Option<&Record>) -> Result<()> {
        let relationship = self.relationship(name)?;
        if !relationship.is_to_one() {
            return Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(name),
                "is a to-many relationship; use set_many",
            ));
        }
        if let Err(kind) = self.state().check_write() {
            return Err(self.state_error(kind, name));
        }
        if let Some(target) = target {
            let actual = target.entity();
            if !target.session.same(&self.session)
                || !self.session.registry().is_a(&actual.name, &relationship.target)
            {
                return Err(Error::cross_model(&relationship.target, &actual.name));
            }
        }

        if relationship.source_holds_keys() {
            for (source_key, target_key) in relationship.key_pairs() {
                let value = match target {
                    Some(t) => t.property_value(target_key)?,
                    None => Value::Null,
                };
                self.write_property(source_key, value)?;
            }
        } else {
            if let Some(previous) = self.one(name)? {
                if target != Some(&previous) && previous.state().check_write().is_ok() {
                    for target_key in &relationship.target_keys {
                        previous.write_property(target_key, Value::Null)?;
                    }
                }
            }
            if let Some(target) = target {
                for (source_key, target_key) in relationship.key_pairs() {
                    target.write_property(target_key, self.property_value(source_key)?)?;
                }
                if let Ok(inverse) = self.session.registry().inverse_of(&relationship) {
                    target.store_one(&inverse.name, Some(self.id));
                }
            }
        }
        self.store_one(name, target.map(|t| t.id));
        Ok(())
    }

    /// Replace the records of a to-many relationship.
    pub fn set_many(&mut self, name: &str, records: &[Record]) -> Result<()> {
        self.many(name)?.replace_records(records)
    }

    /// Records reached from this one by following `hop`.
    fn follow(&self, hop: &Hop) -> Result<Vec<Record>> {
        let relationship = &hop.relationship;
        if !hop.reversed {
            return if relationship.is_to_one() {
                Ok(self.one(&relationship.name)?.into_iter().collect())
            } else {
                self.many(&relationship.name)?.records()
            };
        }
        if let Ok(inverse) = self.session.registry().inverse_of(relationship) {
            if self.entity().relationship(&inverse.name).is_some() {
                return if inverse.is_to_one() {
                    Ok(self.one(&inverse.name)?.into_iter().collect())
                } else {
                    self.many(&inverse.name)?.records()
                };
            }
        }
        let subjects: Vec<Subject> = relationship
            .source_keys
            .iter()
            .map(|k| Subject::Property(Arc::clone(k)))
            .collect();
        let keys = self.session.values_of(self.id, &relationship.target_keys)?;
        let query = self
            .session
            .base_query(&hop.entity)
            .merge(&QueryOptions::new().filter(Condition::target_conditions(&subjects, &[keys])));
        Ok(self
            .session
            .fetch(&query)?
            .into_iter()
            .map(|id| self.session.record(id))
            .collect())
    }

    // ==================== Serialization ====================

    /// Loaded attributes as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let attributes = self
            .attributes()
            .into_iter()
            .map(|(name, value)| (name, json_value(&value)))
            .collect();
        serde_json::Value::Object(attributes)
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(v) => serde_json::Value::from(*v),
        Value::BigInt(v) => serde_json::Value::from(*v),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(_) => serde_json::Value::String(value.key_fragment()),
        Value::Timestamp(micros) => serde_json::Value::String(timestamp::format(*micros)),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(json_value).collect()),
    }
}

impl RecordAccess for Record {
    fn value_of(&self, property: &Property) -> Result<Value> {
        let entity = self.entity();
        match entity.property(&property.name) {
            Some(own) if own.entity == property.entity => self.property_value(own),
            _ => Ok(Value::Null),
        }
    }

    fn path_values(&self, path: &Path) -> Result<Vec<Value>> {
        let mut current = vec![self.clone()];
        for hop in &path.link.hops {
            let mut next = Vec::new();
            for record in &current {
                for reached in record.follow(hop)? {
                    if !next.contains(&reached) {
                        next.push(reached);
                    }
                }
            }
            current = next;
        }
        current
            .iter()
            .map(|record| record.value_of(&path.property))
            .collect()
    }

    fn has_property(&self, property: &Property) -> bool {
        self.entity().has_property(property)
    }

    fn assign(&mut self, property: &Property, value: Value) -> Result<()> {
        let entity = self.entity();
        match entity.property(&property.name) {
            Some(own) => self.write_property(own, value),
            None => Err(self.access_error(
                AccessErrorKind::Unknown,
                Some(&property.name),
                "no such property",
            )),
        }
    }
}

