//! Lazy collections of records.
//!
//! A [`Collection`] is a query that has not necessarily run. Deriving a
//! collection (`filter`, `order_by`, `limit`, ...) never touches storage;
//! the records load on first materialization (`count`, `at`, `iter`,
//! `records`). A derived collection whose query selects a subset of an
//! already loaded parent is computed in memory from the parent's records.
//!
//! Collections returned by [`Record::many`] are bound to their source
//! record. They load for every record in the source's batch at once, and
//! adding or removing records keeps foreign keys in step.
//!
//! ```ignore
//! let users = session.find("User")?;
//! let admins = users.filter(admin.eq(true))?.order_by(nickname.asc())?;
//! for user in admins.iter()? {
//!     println!("{}", user.get("nickname")?);
//! }
//! ```

use crate::record::Record;
use crate::session::Session;
use crate::state::RecordState;
use crate::store::{Binding, CollectionId, CollectionSlot, RecordId};
use std::fmt;
use std::sync::Arc;
use tusk_core::{
    Cardinality, ConfigErrorKind, EntityType, Error, Member, Relationship, Result, ResultError,
    Value,
};
use tusk_query::{Condition, Field, Order, Query, QueryOptions, Subject};

#[derive(Clone)]
pub struct Collection {
    session: Session,
    id: CollectionId,
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.session.same(&other.session)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.session.store();
        let slot = store.collection(self.id);
        f.debug_struct("Collection")
            .field("entity", &slot.query.entity.name)
            .field("conditions", &slot.query.conditions.to_string())
            .field("loaded", &slot.records.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub(crate) fn new(session: Session, id: CollectionId) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn entity(&self) -> Arc<EntityType> {
        Arc::clone(&self.session.store().collection(self.id).query.entity)
    }

    /// A copy of the collection's query.
    pub fn query(&self) -> Query {
        self.session.store().collection(self.id).query.clone()
    }

    pub(crate) fn binding(&self) -> Option<Binding> {
        self.session.store().collection(self.id).binding.clone()
    }

    /// The relationship this collection holds the targets of.
    pub fn relationship(&self) -> Option<Arc<Relationship>> {
        self.binding().map(|b| b.relationship)
    }

    /// The record this collection belongs to.
    pub fn source(&self) -> Option<Record> {
        self.binding().map(|b| self.session.record(b.source))
    }

    pub fn is_loaded(&self) -> bool {
        self.session.store().collection(self.id).records.is_some()
    }

    // ==================== Derivation ====================

    /// A collection with `options` merged into this one's query.
    ///
    /// When this collection is loaded and the merged query selects a
    /// subset of it, the new collection is filled from memory.
    pub fn all(&self, options: QueryOptions) -> Result<Collection> {
        if options.is_empty() {
            return Ok(self.clone());
        }
        let (query, binding, loaded) = {
            let store = self.session.store();
            let slot = store.collection(self.id);
            (slot.query.clone(), slot.binding.clone(), slot.records.clone())
        };
        let derived = query.merge(&options);

        let records = match loaded {
            Some(ids) if derived.is_subset_of(&query) => {
                let handles: Vec<Record> = ids.into_iter().map(|id| self.session.record(id)).collect();
                let kept = derived.filter_records(&handles, query.offset)?;
                Some(kept.into_iter().map(|r| r.id()).collect())
            }
            _ => None,
        };

        let mut slot = CollectionSlot::new(derived);
        slot.binding = binding;
        slot.records = records;
        Ok(self.session.collection(self.session.add_collection(slot)))
    }

    pub fn filter(&self, condition: Condition) -> Result<Collection> {
        self.all(QueryOptions::new().filter(condition))
    }

    pub fn order_by(&self, order: Order) -> Result<Collection> {
        self.all(QueryOptions::new().order_by(order))
    }

    pub fn limit(&self, limit: usize) -> Result<Collection> {
        self.all(QueryOptions::new().limit(limit))
    }

    /// Skip `offset` records, counted from this collection's own offset.
    pub fn skip(&self, offset: usize) -> Result<Collection> {
        let (current, limit) = {
            let store = self.session.store();
            let query = &store.collection(self.id).query;
            (query.offset, query.limit)
        };
        let mut options = QueryOptions::new().offset(current + offset);
        if let Some(limit) = limit {
            options = options.limit(limit.saturating_sub(offset));
        }
        self.all(options)
    }

    /// Distinct rows of the selected fields.
    pub fn uniq(&self) -> Result<Collection> {
        self.all(QueryOptions::new().unique(true))
    }

    /// Apply a scope declared with [`Session::define_scope`].
    pub fn scoped(&self, name: &str) -> Result<Collection> {
        let options = self.session.scope(&self.entity(), name)?;
        self.all(options)
    }

    /// Load these properties with the records. Relationship names are
    /// loaded for every record right away. Properties of an already loaded
    /// collection are left to lazy loading.
    pub fn eager_load(&self, names: &[&str]) -> Result<()> {
        let entity = self.entity();
        let loaded = self.is_loaded();
        let mut relationships = Vec::new();
        for name in names {
            match entity.member(name) {
                Some(Member::Property(_)) if loaded => {}
                Some(Member::Property(property)) => {
                    let mut store = self.session.store_mut();
                    let slot = store.collection_mut(self.id);
                    if !slot.query.selects(&property) {
                        slot.query.fields.push(Field::Property(property));
                    }
                }
                Some(Member::Relationship(relationship)) => relationships.push(relationship),
                None => return Err(unknown_member(&entity, name)),
            }
        }
        for relationship in relationships {
            self.preload(&relationship)?;
        }
        Ok(())
    }

    /// Leave these properties out of the records' query. Keys always load.
    /// No effect once the collection is loaded.
    pub fn lazy_load(&self, names: &[&str]) -> Result<()> {
        let entity = self.entity();
        for name in names {
            if entity.property(name).is_none() {
                return Err(unknown_member(&entity, name));
            }
        }
        if self.is_loaded() {
            return Ok(());
        }
        let mut store = self.session.store_mut();
        store.collection_mut(self.id).query.fields.retain(|field| match field {
            Field::Property(p) => p.key || !names.contains(&p.name.as_str()),
            Field::Aggregate(_) => true,
        });
        Ok(())
    }

    /// Load `relationship` for every record of this collection.
    fn preload(&self, relationship: &Arc<Relationship>) -> Result<()> {
        let ids = self.ids()?;
        self.session
            .eager_load(Some(self.id), &ids, relationship, &QueryOptions::new())
    }

    // ==================== Materialization ====================

    /// Run the query if the records are not loaded yet.
    pub fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let query = self.query();
        match self.binding() {
            None => {
                let ids = self.session.fetch(&query)?;
                let mut store = self.session.store_mut();
                for &id in &ids {
                    store.record_mut(id).collection = Some(self.id);
                }
                store.collection_mut(self.id).records = Some(ids);
            }
            Some(binding) => {
                let source = self.session.record(binding.source);
                let canonical = source.many(&binding.relationship.name)?;
                if canonical == *self {
                    self.load_relationship(&binding, &query)?;
                } else {
                    let records = canonical.records()?;
                    let kept = query.filter_records(&records, 0)?;
                    self.session.store_mut().collection_mut(self.id).records =
                        Some(kept.into_iter().map(|r| r.id()).collect());
                }
            }
        }
        Ok(())
    }

    fn load_relationship(&self, binding: &Binding, query: &Query) -> Result<()> {
        if self.session.record(binding.source).state().is_persisted() {
            let (context, batch) = self.session.batch_of(binding.source);
            let mut options = QueryOptions::new().fields(query.fields.clone());
            options.order.clone_from(&query.order);
            if query.reload {
                options = options.reload(true);
            }
            self.session
                .eager_load(context, &batch, &binding.relationship, &options)?;
        }
        let mut store = self.session.store_mut();
        let slot = store.collection_mut(self.id);
        if slot.records.is_none() {
            slot.records = Some(Vec::new());
        }
        Ok(())
    }

    pub(crate) fn ids(&self) -> Result<Vec<RecordId>> {
        self.load()?;
        Ok(self
            .session
            .store()
            .collection(self.id)
            .records
            .clone()
            .unwrap_or_default())
    }

    /// The records, loading them if needed.
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self
            .ids()?
            .into_iter()
            .map(|id| self.session.record(id))
            .collect())
    }

    /// Number of records, loading them if needed.
    pub fn count(&self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    pub fn at(&self, index: usize) -> Result<Option<Record>> {
        Ok(self.ids()?.get(index).map(|&id| self.session.record(id)))
    }

    /// Iterate over the records. While a record is current, relationships
    /// and lazy properties it loads are loaded for the whole collection.
    pub fn iter(&self) -> Result<CollectionIter> {
        Ok(CollectionIter {
            session: self.session.clone(),
            collection: self.id,
            ids: self.ids()?,
            position: 0,
            tagged: None,
        })
    }

    pub fn first(&self) -> Result<Option<Record>> {
        if self.is_loaded() {
            return self.at(0);
        }
        self.limit(1)?.at(0)
    }

    /// The only record. Errors unless exactly one record matches.
    pub fn one(&self) -> Result<Record> {
        let ids = self.ids()?;
        match ids.as_slice() {
            [id] => Ok(self.session.record(*id)),
            _ => Err(Error::UnexpectedResult(ResultError {
                expected: 1,
                found: ids.len(),
                message: format!(
                    "expected exactly one {} record, found {}",
                    self.entity().name,
                    ids.len()
                ),
            })),
        }
    }

    /// The record with these key values, if it is in the identity map and
    /// belongs to this collection. Never queries.
    pub fn get(&self, keys: &[Value]) -> Result<Option<Record>> {
        let entity = self.entity();
        if keys.len() != entity.keys.len() {
            return Ok(None);
        }
        let typed = entity
            .keys
            .iter()
            .zip(keys)
            .map(|(k, v)| k.deserialize(v))
            .collect::<Result<Vec<_>>>()?;
        let Some(id) = self.session.lookup(&entity, &typed) else {
            return Ok(None);
        };
        let record = self.session.record(id);
        let member = {
            let store = self.session.store();
            store
                .collection(self.id)
                .records
                .as_ref()
                .map(|ids| ids.contains(&id))
        };
        let belongs = match member {
            Some(contained) => contained,
            None => self.query().conditions.matches(&record)?,
        };
        Ok(belongs.then_some(record))
    }

    /// Forget the loaded records and pending changes.
    pub fn reset(&self) {
        let mut store = self.session.store_mut();
        let slot = store.collection_mut(self.id);
        slot.records = None;
        slot.removed.clear();
        slot.added.clear();
        slot.children.clear();
        slot.invalidate();
    }

    /// Load the records again, overwriting cached attribute values.
    pub fn reload(&self) -> Result<()> {
        self.reset();
        self.session.store_mut().collection_mut(self.id).query.reload = true;
        let result = self.load();
        self.session.store_mut().collection_mut(self.id).query.reload = false;
        result
    }

    // ==================== Mutation ====================

    /// Add a record, applying this collection's equality conditions and,
    /// for relationship collections, the relationship's keys.
    pub fn add_record(&self, record: &Record) -> Result<()> {
        self.check_member(record)?;
        self.load()?;
        {
            let mut store = self.session.store_mut();
            let slot = store.collection_mut(self.id);
            if let Some(records) = slot.records.as_mut() {
                if !records.contains(&record.id()) {
                    records.push(record.id());
                }
            }
            if !slot.added.contains(&record.id()) {
                slot.added.push(record.id());
            }
            slot.removed.retain(|&id| id != record.id());
            slot.invalidate();
        }

        let conditions = self.query().conditions;
        let mut target = record.clone();
        conditions.apply_to_record(&mut target)?;

        if let Some(binding) = self.binding() {
            let canonical = self
                .session
                .record(binding.source)
                .many(&binding.relationship.name)?;
            if canonical != *self {
                return canonical.add_record(record);
            }
            self.link(&binding, record)?;
        }
        Ok(())
    }

    /// Take a record out. Returns whether it was present.
    pub fn remove_record(&self, record: &Record) -> Result<bool> {
        self.load()?;
        let present = {
            let mut store = self.session.store_mut();
            let slot = store.collection_mut(self.id);
            let position = slot
                .records
                .as_ref()
                .and_then(|ids| ids.iter().position(|&id| id == record.id()));
            if let (Some(position), Some(records)) = (position, slot.records.as_mut()) {
                records.remove(position);
                slot.added.retain(|&id| id != record.id());
                if !slot.removed.contains(&record.id()) {
                    slot.removed.push(record.id());
                }
                slot.invalidate();
                true
            } else {
                false
            }
        };

        if present {
            if let Some(binding) = self.binding() {
                let canonical = self
                    .session
                    .record(binding.source)
                    .many(&binding.relationship.name)?;
                if canonical != *self {
                    canonical.remove_record(record)?;
                } else {
                    self.unlink(&binding, record)?;
                }
            }
        }
        Ok(present)
    }

    /// Replace the record list without tracking additions or removals.
    pub fn set_records(&self, records: &[Record]) -> Result<()> {
        for record in records {
            self.check_member(record)?;
        }
        let mut store = self.session.store_mut();
        let slot = store.collection_mut(self.id);
        slot.records = Some(records.iter().map(Record::id).collect());
        slot.invalidate();
        Ok(())
    }

    /// Make the collection hold exactly `records`: missing ones are
    /// removed, new ones added.
    pub fn replace_records(&self, records: &[Record]) -> Result<()> {
        for current in self.records()? {
            if !records.contains(&current) {
                self.remove_record(&current)?;
            }
        }
        for record in records {
            self.add_record(record)?;
        }
        let mut store = self.session.store_mut();
        store.collection_mut(self.id).records = Some(records.iter().map(Record::id).collect());
        Ok(())
    }

    fn check_member(&self, record: &Record) -> Result<()> {
        let expected = self.entity();
        let actual = record.entity();
        if !record.session().same(&self.session)
            || !self.session.registry().is_a(&actual.name, &expected.name)
        {
            return Err(Error::cross_model(&expected.name, &actual.name));
        }
        Ok(())
    }

    /// Point `record` at the binding's source.
    fn link(&self, binding: &Binding, record: &Record) -> Result<()> {
        let relationship = &binding.relationship;
        if relationship.cardinality == Cardinality::ManyToMany {
            return Ok(());
        }
        let source = self.session.record(binding.source);
        if record.state().check_write().is_ok() {
            for (source_key, target_key) in relationship.key_pairs() {
                record.write_property(target_key, source.property_value(source_key)?)?;
            }
        }
        if let Ok(inverse) = self.session.registry().inverse_of(relationship) {
            if inverse.is_to_one() {
                self.session.associate(
                    record.id(),
                    &inverse,
                    vec![binding.source],
                    &self.session.base_query(&source.entity()),
                );
            }
        }
        Ok(())
    }

    /// Detach `record` from the binding's source.
    fn unlink(&self, binding: &Binding, record: &Record) -> Result<()> {
        let relationship = &binding.relationship;
        if relationship.cardinality == Cardinality::ManyToMany {
            return Ok(());
        }
        if record.state().check_write().is_ok() {
            for target_key in &relationship.target_keys {
                record.write_property(target_key, Value::Null)?;
            }
        }
        if let Ok(inverse) = self.session.registry().inverse_of(relationship) {
            if inverse.is_to_one() {
                let query = self.session.base_query(&self.session.record(binding.source).entity());
                self.session.associate(record.id(), &inverse, Vec::new(), &query);
            }
        }
        Ok(())
    }

    // ==================== Persistence ====================

    /// Save every loaded record and every record removed since the last
    /// save. Many-to-many collections create and destroy join records.
    pub fn save(&self) -> Result<bool> {
        let (records, removed, added, binding) = {
            let store = self.session.store();
            let slot = store.collection(self.id);
            (
                slot.records.clone().unwrap_or_default(),
                slot.removed.clone(),
                slot.added.clone(),
                slot.binding.clone(),
            )
        };

        if let Some(binding) = binding
            .as_ref()
            .filter(|b| b.relationship.cardinality == Cardinality::ManyToMany)
        {
            return self.save_joins(binding, &records, &added, &removed);
        }

        for id in records {
            let record = self.session.record(id);
            if let Some(binding) = &binding {
                if record.state().check_write().is_ok() {
                    let source = self.session.record(binding.source);
                    for (source_key, target_key) in binding.relationship.key_pairs() {
                        record.write_property(target_key, source.property_value(source_key)?)?;
                    }
                }
            }
            if !record.save()? {
                return Ok(false);
            }
        }
        for id in removed {
            let record = self.session.record(id);
            if record.state() != RecordState::Immutable && !record.save()? {
                return Ok(false);
            }
        }
        self.clear_changes();
        Ok(true)
    }

    fn save_joins(
        &self,
        binding: &Binding,
        records: &[RecordId],
        added: &[RecordId],
        removed: &[RecordId],
    ) -> Result<bool> {
        let relationship = &binding.relationship;
        let (Some(through), Some(via)) = (&relationship.through, &relationship.via) else {
            return Err(unsupported(relationship, "has no join relationships"));
        };
        if !(added.is_empty() && removed.is_empty())
            && (through.cardinality == Cardinality::ManyToMany
                || via.cardinality == Cardinality::ManyToMany)
        {
            return Err(unsupported(
                relationship,
                "cannot write through a nested many-to-many relationship",
            ));
        }

        let source = self.session.record(binding.source);
        if source.is_transient() && !source.save()? {
            return Ok(false);
        }
        for &id in records {
            if !self.session.record(id).save()? {
                return Ok(false);
            }
        }

        let joins = source.many(&through.name)?;
        for &id in added.iter().filter(|id| records.contains(id)) {
            let target = self.session.record(id);
            let mut join = self.session.build(&through.target)?;
            for (source_key, join_key) in through.key_pairs() {
                join.write_property(join_key, source.property_value(source_key)?)?;
            }
            join.set_one(&via.name, Some(&target))?;
            if !join.save()? {
                return Ok(false);
            }
            let mut store = self.session.store_mut();
            if let Some(ids) = store.collection_mut(joins.id()).records.as_mut() {
                ids.push(join.id());
            }
        }

        for &id in removed {
            let target = self.session.record(id);
            for join in joins.records()? {
                if join.one(&via.name)?.as_ref() == Some(&target) {
                    join.destroy()?;
                    let mut store = self.session.store_mut();
                    if let Some(ids) = store.collection_mut(joins.id()).records.as_mut() {
                        ids.retain(|&j| j != join.id());
                    }
                }
            }
        }

        self.clear_changes();
        Ok(true)
    }

    fn clear_changes(&self) {
        let mut store = self.session.store_mut();
        let slot = store.collection_mut(self.id);
        slot.removed.clear();
        slot.added.clear();
    }

    /// Destroy every record. Returns `Ok(false)` if any could not be
    /// destroyed.
    pub fn destroy(&self) -> Result<bool> {
        let mut all = true;
        for record in self.records()? {
            all &= record.destroy()?;
        }
        self.session.store_mut().collection_mut(self.id).invalidate();
        Ok(all)
    }

    /// Whether any loaded record or membership change is unsaved.
    pub fn is_dirty(&self) -> bool {
        let store = self.session.store();
        let slot = store.collection(self.id);
        if !slot.removed.is_empty() || !slot.added.is_empty() {
            return true;
        }
        slot.records.as_ref().is_some_and(|ids| {
            ids.iter().any(|&id| {
                matches!(
                    store.record(id).state,
                    RecordState::Transient | RecordState::Dirty | RecordState::Deleted
                )
            })
        })
    }

    pub fn is_clean(&self) -> bool {
        !self.is_dirty()
    }

    /// Key condition selecting exactly the loaded records.
    pub fn key_condition(&self) -> Result<Condition> {
        let entity = self.entity();
        let subjects: Vec<Subject> = entity
            .keys
            .iter()
            .map(|k| Subject::Property(Arc::clone(k)))
            .collect();
        let tuples: Vec<Vec<Value>> = self.records()?.iter().map(Record::key).collect();
        Ok(Condition::target_conditions(&subjects, &tuples))
    }
}

fn unknown_member(entity: &EntityType, name: &str) -> Error {
    Error::config(
        ConfigErrorKind::UnknownMember,
        Some(&entity.name),
        format!("'{name}' is neither a property nor a relationship"),
    )
}

fn unsupported(relationship: &Relationship, message: &str) -> Error {
    Error::config(
        ConfigErrorKind::Unsupported,
        Some(&relationship.source),
        format!("'{}' {message}", relationship.name),
    )
}

/// Iterator over a collection's records.
///
/// The current record batches with the collection for as long as it is
/// current.
pub struct CollectionIter {
    session: Session,
    collection: CollectionId,
    ids: Vec<RecordId>,
    position: usize,
    /// Current record and the collection it was loaded by
    tagged: Option<(RecordId, Option<CollectionId>)>,
}

impl CollectionIter {
    fn untag(&mut self) {
        if let Some((id, previous)) = self.tagged.take() {
            self.session.store_mut().record_mut(id).collection = previous;
        }
    }
}

impl Iterator for CollectionIter {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.untag();
        let id = *self.ids.get(self.position)?;
        self.position += 1;
        let previous = {
            let mut store = self.session.store_mut();
            let slot = store.record_mut(id);
            slot.collection.replace(self.collection)
        };
        self.tagged = Some((id, previous));
        Some(self.session.record(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl Drop for CollectionIter {
    fn drop(&mut self) {
        self.untag();
    }
}
