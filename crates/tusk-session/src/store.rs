//! Arena storage for records and collections.
//!
//! Records and collections refer to each other by index. Slots live as long
//! as the session; handles ([`Record`](crate::Record),
//! [`Collection`](crate::Collection)) pair an index with the session.

use crate::identity_map::IdentityMap;
use crate::state::RecordState;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tusk_core::{EntityType, Relationship, Value};
use tusk_query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub(crate) usize);

/// A loaded relationship value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RelationValue {
    One(Option<RecordId>),
    Many(CollectionId),
}

/// The record a relationship collection belongs to.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub relationship: Arc<Relationship>,
    pub source: RecordId,
}

#[derive(Debug)]
pub(crate) struct RecordSlot {
    pub entity: Arc<EntityType>,
    pub state: RecordState,
    /// Loaded property values, in memory form
    pub attributes: HashMap<String, Value>,
    pub relations: HashMap<String, RelationValue>,
    /// Values before uncommitted changes
    pub originals: HashMap<String, Value>,
    /// Identity key the record is registered under
    pub key: Option<String>,
    /// Collection that loaded the record, used as its batch
    pub collection: Option<CollectionId>,
    /// Operations in progress, to stop cycles through relationships
    pub guards: HashSet<&'static str>,
}

impl RecordSlot {
    pub fn new(entity: Arc<EntityType>, state: RecordState) -> Self {
        Self {
            entity,
            state,
            attributes: HashMap::new(),
            relations: HashMap::new(),
            originals: HashMap::new(),
            key: None,
            collection: None,
            guards: HashSet::new(),
        }
    }

    /// Whether the relationship value is present, for to-many values
    /// whether the collection has been materialized.
    pub fn has_relation(&self, name: &str, collections: &[CollectionSlot]) -> bool {
        match self.relations.get(name) {
            Some(RelationValue::One(_)) => true,
            Some(RelationValue::Many(id)) => collections[id.0].records.is_some(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct CollectionSlot {
    pub query: Query,
    /// `None` until materialized
    pub records: Option<Vec<RecordId>>,
    /// Records taken out since the last save
    pub removed: Vec<RecordId>,
    /// Records put in since the last save
    pub added: Vec<RecordId>,
    pub binding: Option<Binding>,
    /// Collections of related records loaded for every record in this one,
    /// by relationship name
    pub children: HashMap<String, CollectionId>,
    /// Calculated aggregates by alias
    pub aggregates: HashMap<String, Value>,
}

impl CollectionSlot {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            records: None,
            removed: Vec::new(),
            added: Vec::new(),
            binding: None,
            children: HashMap::new(),
            aggregates: HashMap::new(),
        }
    }

    pub fn bound(query: Query, relationship: Arc<Relationship>, source: RecordId) -> Self {
        let mut slot = Self::new(query);
        slot.binding = Some(Binding {
            relationship,
            source,
        });
        slot
    }

    pub fn with_records(mut self, records: Vec<RecordId>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn invalidate(&mut self) {
        self.aggregates.clear();
    }
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    pub records: Vec<RecordSlot>,
    pub collections: Vec<CollectionSlot>,
    pub identity: IdentityMap,
}

impl Store {
    pub fn add_record(&mut self, slot: RecordSlot) -> RecordId {
        self.records.push(slot);
        RecordId(self.records.len() - 1)
    }

    pub fn add_collection(&mut self, slot: CollectionSlot) -> CollectionId {
        self.collections.push(slot);
        CollectionId(self.collections.len() - 1)
    }

    pub fn record(&self, id: RecordId) -> &RecordSlot {
        &self.records[id.0]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordSlot {
        &mut self.records[id.0]
    }

    pub fn collection(&self, id: CollectionId) -> &CollectionSlot {
        &self.collections[id.0]
    }

    pub fn collection_mut(&mut self, id: CollectionId) -> &mut CollectionSlot {
        &mut self.collections[id.0]
    }
}
