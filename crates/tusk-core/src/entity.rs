//! Entity declarations and resolved entity types.

use crate::property::{Property, PropertyKind};
use crate::relationship::{Relationship, RelationshipDef};
use std::sync::Arc;

/// Default data source name.
pub const DEFAULT_DATA_SOURCE: &str = "default";

/// Declaration of an entity, handed to the registry builder.
#[derive(Debug, Clone)]
pub struct EntityDef {
    pub name: String,
    /// Parent entity for single-table inheritance
    pub parent: Option<String>,
    pub data_source: Option<String>,
    /// Overrides the derived table name
    pub storage_name: Option<String>,
    pub properties: Vec<Property>,
    pub relationships: Vec<RelationshipDef>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            data_source: None,
            storage_name: None,
            properties: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Inherit properties, relationships, keys and table from `parent`.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_source = Some(name.into());
        self
    }

    #[must_use]
    pub fn storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    #[must_use]
    pub fn belongs_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(RelationshipDef::many_to_one(name, target))
    }

    #[must_use]
    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(RelationshipDef::one_to_many(name, target))
    }

    #[must_use]
    pub fn has_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationship(RelationshipDef::one_to_one(name, target))
    }

    #[must_use]
    pub fn has_many_through(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        self.relationship(RelationshipDef::many_to_many(name, target, through))
    }
}

/// A named member of an entity.
#[derive(Debug, Clone)]
pub enum Member {
    Property(Arc<Property>),
    Relationship(Arc<Relationship>),
}

/// A resolved entity.
#[derive(Debug)]
pub struct EntityType {
    pub name: String,
    pub parent: Option<String>,
    /// Root of the inheritance tree; identity maps and tables are shared
    /// by every entity with the same root
    pub root: String,
    pub data_source: String,
    /// Unprefixed table name
    pub storage_name: String,
    /// Inherited properties first, in declaration order
    pub properties: Vec<Arc<Property>>,
    pub relationships: Vec<Arc<Relationship>>,
    pub keys: Vec<Arc<Property>>,
    pub discriminator: Option<Arc<Property>>,
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Arc<Property>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Arc<Relationship>> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Look a member up by name, properties first.
    pub fn member(&self, name: &str) -> Option<Member> {
        self.property(name)
            .map(|p| Member::Property(Arc::clone(p)))
            .or_else(|| {
                self.relationship(name)
                    .map(|r| Member::Relationship(Arc::clone(r)))
            })
    }

    /// Properties loaded when a query names no fields.
    pub fn default_fields(&self) -> Vec<Arc<Property>> {
        self.properties
            .iter()
            .filter(|p| !p.lazy || p.kind == PropertyKind::Discriminator)
            .cloned()
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether `property` is a member of this entity.
    pub fn has_property(&self, property: &Property) -> bool {
        self.property(&property.name)
            .is_some_and(|own| own.entity == property.entity)
    }
}
