//! Query descriptors.
//!
//! A [`Query`] names the entity, fields, joins, conditions, order and slice
//! of a read. Queries are values: collections derive new ones by merging
//! [`QueryOptions`] and never mutate a query another collection holds.

use crate::aggregate::Aggregator;
use crate::condition::{Condition, RecordAccess};
use crate::order::Order;
use crate::path::Link;
use std::cmp::Ordering;
use std::sync::Arc;
use tusk_core::{EntityType, Property, Result, Value};

/// A selected column.
#[derive(Debug, Clone)]
pub enum Field {
    Property(Arc<Property>),
    Aggregate(Aggregator),
}

impl Field {
    /// Result column name.
    pub fn alias(&self) -> String {
        match self {
            Field::Property(p) => p.name.clone(),
            Field::Aggregate(a) => a.alias(),
        }
    }
}

impl From<Arc<Property>> for Field {
    fn from(property: Arc<Property>) -> Self {
        Field::Property(property)
    }
}

impl From<Aggregator> for Field {
    fn from(aggregator: Aggregator) -> Self {
        Field::Aggregate(aggregator)
    }
}

/// A read against one entity.
#[derive(Debug, Clone)]
pub struct Query {
    pub entity: Arc<EntityType>,
    /// Defaults to every non-lazy property
    pub fields: Vec<Field>,
    /// Join chains needed by path conditions
    pub links: Vec<Link>,
    pub conditions: Condition,
    pub order: Vec<Order>,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Group by the selected properties
    pub unique: bool,
    /// Overwrite cached records with fetched values
    pub reload: bool,
}

impl Query {
    pub fn new(entity: Arc<EntityType>) -> Self {
        let fields = entity
            .default_fields()
            .into_iter()
            .map(Field::Property)
            .collect();
        Self {
            entity,
            fields,
            links: Vec::new(),
            conditions: Condition::Null,
            order: Vec::new(),
            offset: 0,
            limit: None,
            unique: false,
            reload: false,
        }
    }

    /// A copy of this query with `options` merged in.
    #[must_use]
    pub fn merge(&self, options: &QueryOptions) -> Query {
        let mut query = self.clone();
        query.update(options);
        query
    }

    /// Merge `options` in place: conditions are ANDed, links and order
    /// appended without duplicates, everything else replaced.
    pub fn update(&mut self, options: &QueryOptions) {
        for link in &options.links {
            self.add_link(link.clone());
        }
        if let Some(conditions) = &options.conditions {
            for path in conditions.paths() {
                self.add_link(path.link.clone());
            }
            self.conditions = std::mem::take(&mut self.conditions).and(conditions.clone());
        }
        for order in &options.order {
            if !self.order.iter().any(|o| o.same_as(order)) {
                self.order.push(order.clone());
            }
        }
        if let Some(fields) = &options.fields {
            self.fields.clone_from(fields);
        }
        if let Some(offset) = options.offset {
            self.offset = offset;
        }
        if let Some(limit) = options.limit {
            self.limit = Some(limit);
        }
        if let Some(unique) = options.unique {
            self.unique = unique;
        }
        if let Some(reload) = options.reload {
            self.reload = reload;
        }
    }

    pub fn add_link(&mut self, link: Link) {
        if link.is_empty() {
            return;
        }
        let signature = link.signature();
        if !self.links.iter().any(|l| l.signature() == signature) {
            self.links.push(link);
        }
    }

    /// Selected properties, in field order.
    pub fn properties(&self) -> impl Iterator<Item = &Arc<Property>> {
        self.fields.iter().filter_map(|f| match f {
            Field::Property(p) => Some(p),
            Field::Aggregate(_) => None,
        })
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &Aggregator> {
        self.fields.iter().filter_map(|f| match f {
            Field::Aggregate(a) => Some(a),
            Field::Property(_) => None,
        })
    }

    pub fn selects(&self, property: &Property) -> bool {
        self.properties()
            .any(|p| p.name == property.name && p.entity == property.entity)
    }

    /// Whether offset or limit narrows the result.
    pub fn is_sliced(&self) -> bool {
        self.offset > 0 || self.limit.is_some()
    }

    fn end(&self) -> Option<usize> {
        self.limit.map(|limit| self.offset + limit)
    }

    fn same_order(&self, other: &Query) -> bool {
        self.order.len() == other.order.len()
            && self.order.iter().zip(&other.order).all(|(a, b)| a.same_as(b))
    }

    /// Whether every row this query selects is among the rows `other`
    /// already loaded, so the result can be computed from them.
    ///
    /// A sliced `other` only serves queries with the same order and the same
    /// conditions: a narrower filter over a window is not the same window
    /// of the narrower filter.
    pub fn is_subset_of(&self, other: &Query) -> bool {
        if other.reload || self.entity.name != other.entity.name {
            return false;
        }
        if self.unique && !other.unique {
            return false;
        }
        if self.offset < other.offset {
            return false;
        }
        match (self.end(), other.end()) {
            (_, None) => {}
            (None, Some(_)) => return false,
            (Some(end), Some(other_end)) if end > other_end => return false,
            (Some(_), Some(_)) => {}
        }
        if other.is_sliced() {
            return self.same_order(other) && self.conditions.equivalent(&other.conditions);
        }
        true
    }

    /// Apply this query's conditions, order and slice to records already
    /// loaded by a query starting at `base_offset`.
    pub fn filter_records<R>(&self, records: &[R], base_offset: usize) -> Result<Vec<R>>
    where
        R: RecordAccess + Clone,
    {
        let mut matched = Vec::new();
        for record in records {
            if self.conditions.matches(record)? {
                matched.push(record.clone());
            }
        }

        if !self.order.is_empty() {
            let mut keyed = Vec::with_capacity(matched.len());
            for record in matched {
                let keys = self
                    .order
                    .iter()
                    .map(|o| record.value_of(&o.property))
                    .collect::<Result<Vec<Value>>>()?;
                keyed.push((keys, record));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                self.order
                    .iter()
                    .zip(a.iter().zip(b))
                    .map(|(order, (x, y))| order.compare(x, y))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
            matched = keyed.into_iter().map(|(_, record)| record).collect();
        }

        let rest = matched
            .into_iter()
            .skip(self.offset.saturating_sub(base_offset));
        Ok(match self.limit {
            Some(limit) => rest.take(limit).collect(),
            None => rest.collect(),
        })
    }
}

/// Changes to merge into a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub conditions: Option<Condition>,
    pub fields: Option<Vec<Field>>,
    pub links: Vec<Link>,
    pub order: Vec<Order>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub unique: Option<bool>,
    pub reload: Option<bool>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND `condition` into the options.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions = Some(match self.conditions.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    #[must_use]
    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_none()
            && self.fields.is_none()
            && self.links.is_empty()
            && self.order.is_empty()
            && self.offset.is_none()
            && self.limit.is_none()
            && self.unique.is_none()
            && self.reload.is_none()
    }
}
