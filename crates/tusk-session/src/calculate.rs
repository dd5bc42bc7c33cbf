//! Aggregates over collections.
//!
//! A loaded collection aggregates in memory. A relationship collection
//! that is not loaded answers for every collection of the same
//! relationship across its source's batch with one grouped query, the
//! same way relationships batch. Anything else runs a single ungrouped
//! query. Results are cached on the collection by aggregator alias until
//! its records change.

use crate::collection::Collection;
use crate::store::RecordId;
use std::collections::HashMap;
use std::sync::Arc;
use tusk_core::{Cardinality, Relationship, Result, Value};
use tusk_query::{AggregateKind, Aggregator, Condition, Field, Query, Subject, signature};

impl Collection {
    /// Compute `aggregator` over the collection's records.
    #[tracing::instrument(level = "debug", skip(self), fields(alias = %aggregator.alias()))]
    pub fn calculate(&self, aggregator: &Aggregator) -> Result<Value> {
        let alias = aggregator.alias();
        if let Some(value) = self.cached(&alias) {
            return Ok(value);
        }

        let value = if self.is_loaded() {
            self.calculate_loaded(aggregator)?
        } else {
            match self.relationship() {
                Some(relationship) => self.calculate_related(aggregator, &relationship)?,
                None => self.calculate_unbound(aggregator)?,
            }
        };

        self.cache(alias, value.clone());
        Ok(value)
    }

    pub fn count_all(&self) -> Result<i64> {
        let value = self.calculate(&Aggregator::count_all())?;
        Ok(value.as_i64().unwrap_or_default())
    }

    pub fn sum(&self, property: &str) -> Result<Value> {
        self.aggregate_property(AggregateKind::Sum, property)
    }

    pub fn avg(&self, property: &str) -> Result<Value> {
        self.aggregate_property(AggregateKind::Avg, property)
    }

    pub fn min(&self, property: &str) -> Result<Value> {
        self.aggregate_property(AggregateKind::Min, property)
    }

    pub fn max(&self, property: &str) -> Result<Value> {
        self.aggregate_property(AggregateKind::Max, property)
    }

    fn aggregate_property(&self, kind: AggregateKind, property: &str) -> Result<Value> {
        let entity = self.entity();
        let property = self.session().property(&entity.name, property)?;
        self.calculate(&Aggregator::new(kind, Some(property)))
    }

    fn cached(&self, alias: &str) -> Option<Value> {
        self.session()
            .store()
            .collection(self.id())
            .aggregates
            .get(alias)
            .cloned()
    }

    fn cache(&self, alias: String, value: Value) {
        self.session()
            .store_mut()
            .collection_mut(self.id())
            .aggregates
            .insert(alias, value);
    }

    fn calculate_loaded(&self, aggregator: &Aggregator) -> Result<Value> {
        let records = self.records()?;
        let values = match &aggregator.property {
            Some(property) => records
                .iter()
                .map(|record| record.property_value(property))
                .collect::<Result<Vec<_>>>()?,
            None => vec![Value::Null; records.len()],
        };
        aggregator.calculate(&values)
    }

    fn calculate_unbound(&self, aggregator: &Aggregator) -> Result<Value> {
        let query = self.query();
        if query.is_sliced() || query.unique {
            return self.calculate_loaded(aggregator);
        }
        self.run_single(query, aggregator)
    }

    fn calculate_related(
        &self,
        aggregator: &Aggregator,
        relationship: &Arc<Relationship>,
    ) -> Result<Value> {
        let query = self.query();
        if relationship.cardinality == Cardinality::ManyToMany || query.is_sliced() {
            return self.calculate_loaded(aggregator);
        }
        let Some(source) = self.source() else {
            return self.calculate_loaded(aggregator);
        };
        if !source.state().is_persisted() {
            return Ok(aggregator.empty_value());
        }

        if source.many(&relationship.name)? == *self {
            return self.calculate_siblings(aggregator, relationship, source.id());
        }

        let keys = self
            .session()
            .values_of(source.id(), &relationship.source_keys)?;
        let related = Condition::related_to(self.session().registry(), relationship, &[keys])?;
        let mut query = query;
        query.conditions = related.and(query.conditions);
        self.run_single(query, aggregator)
    }

    /// One ungrouped aggregate query.
    fn run_single(&self, mut query: Query, aggregator: &Aggregator) -> Result<Value> {
        query.fields = vec![Field::Aggregate(aggregator.clone())];
        query.order.clear();
        let rows = self.session().source_for(&query.entity)?.aggregate(&query)?;
        let raw = rows
            .first()
            .and_then(|row| row.get_by_name(&aggregator.alias()))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(aggregator.normalize(raw))
    }

    /// Aggregate the relationship for every record in `source`'s batch with
    /// one grouped query, caching each result on that record's collection.
    fn calculate_siblings(
        &self,
        aggregator: &Aggregator,
        relationship: &Arc<Relationship>,
        source: RecordId,
    ) -> Result<Value> {
        let session = self.session();
        let alias = aggregator.alias();
        let (_, batch) = session.batch_of(source);

        let mut siblings: Vec<(Collection, Vec<Value>)> = Vec::with_capacity(batch.len());
        for id in batch {
            let record = session.record(id);
            if record.entity().relationship(&relationship.name).is_none()
                || !record.state().is_persisted()
            {
                continue;
            }
            let collection = record.many(&relationship.name)?;
            if collection.cached(&alias).is_some() {
                continue;
            }
            let keys = session.values_of(id, &relationship.source_keys)?;
            siblings.push((collection, keys));
        }

        let tuples: Vec<Vec<Value>> = siblings
            .iter()
            .map(|(_, keys)| keys.clone())
            .filter(|keys| keys.iter().all(|v| !v.is_null()))
            .collect();

        let mut results: HashMap<String, Value> = HashMap::new();
        if !tuples.is_empty() {
            let subjects: Vec<Subject> = relationship
                .target_keys
                .iter()
                .map(|k| Subject::Property(Arc::clone(k)))
                .collect();
            let mut query = self.query();
            query.conditions =
                Condition::target_conditions(&subjects, &tuples).and(query.conditions);
            query.fields = relationship
                .target_keys
                .iter()
                .map(|k| Field::Property(Arc::clone(k)))
                .chain(std::iter::once(Field::Aggregate(aggregator.clone())))
                .collect();
            query.order.clear();
            query.unique = true;

            tracing::debug!(
                relationship = %relationship.name,
                batch = tuples.len(),
                "Aggregating relationship"
            );
            let rows = session.source_for(&query.entity)?.aggregate(&query)?;
            session.track_load(&relationship.source, &relationship.name, tuples.len());

            for row in rows {
                let mut keys = Vec::with_capacity(relationship.target_keys.len());
                for key in &relationship.target_keys {
                    keys.push(key.deserialize(row.get_by_name(&key.name).unwrap_or(&Value::Null))?);
                }
                let raw = row.get_by_name(&alias).cloned().unwrap_or(Value::Null);
                results.insert(signature(&keys), aggregator.normalize(raw));
            }
        }

        let mut own = aggregator.empty_value();
        for (collection, keys) in siblings {
            let value = results
                .get(&signature(&keys))
                .cloned()
                .unwrap_or_else(|| aggregator.empty_value());
            if collection == *self {
                own = value.clone();
            }
            collection.cache(alias.clone(), value);
        }
        Ok(own)
    }
}

