//! Relationship paths.
//!
//! A [`Path`] names a property reached from an entity by following
//! relationships, such as `group.name` from `User`. Paths are comparable
//! like properties; a query that filters on one joins every hop.
//! Many-to-many relationships are expanded into their direct hops.

use std::sync::Arc;
use tusk_core::{ConfigErrorKind, EntityType, Error, Property, Registry, Relationship, Result};

/// One join step.
#[derive(Debug, Clone)]
pub struct Hop {
    pub relationship: Arc<Relationship>,
    /// Followed from target back to source
    pub reversed: bool,
    /// Entity reached by this hop
    pub entity: Arc<EntityType>,
}

impl Hop {
    /// Follow `relationship` from its source to its target.
    pub fn forward(registry: &Registry, relationship: &Arc<Relationship>) -> Result<Self> {
        Ok(Self {
            entity: registry.entity(&relationship.target)?,
            relationship: Arc::clone(relationship),
            reversed: false,
        })
    }

    /// Follow `relationship` from its target back to its source.
    pub fn backward(registry: &Registry, relationship: &Arc<Relationship>) -> Result<Self> {
        Ok(Self {
            entity: registry.entity(&relationship.source)?,
            relationship: Arc::clone(relationship),
            reversed: true,
        })
    }

    /// Key pairs as (near side, far side).
    pub fn join_keys(&self) -> impl Iterator<Item = (&Arc<Property>, &Arc<Property>)> {
        let (near, far) = if self.reversed {
            (&self.relationship.target_keys, &self.relationship.source_keys)
        } else {
            (&self.relationship.source_keys, &self.relationship.target_keys)
        };
        near.iter().zip(far.iter())
    }

    fn label(&self) -> String {
        if self.reversed {
            format!("~{}", self.relationship.name)
        } else {
            self.relationship.name.clone()
        }
    }
}

/// An ordered chain of hops used to build joins.
#[derive(Debug, Clone, Default)]
pub struct Link {
    pub hops: Vec<Hop>,
}

impl Link {
    /// Join alias of the first `len` hops: hop names joined with `.`,
    /// backward hops prefixed with `~`.
    pub fn alias(&self, len: usize) -> String {
        self.hops[..len]
            .iter()
            .map(Hop::label)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn signature(&self) -> String {
        self.alias(self.hops.len())
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// A property reached through relationships.
#[derive(Debug, Clone)]
pub struct Path {
    /// Entity the path starts from
    pub root: String,
    pub link: Link,
    pub property: Arc<Property>,
}

impl Path {
    /// Resolve a dotted path such as `group.owner.name` from `root`.
    pub fn parse(registry: &Registry, root: &str, dotted: &str) -> Result<Self> {
        let mut parts: Vec<&str> = dotted.split('.').collect();
        let property = parts.pop().unwrap_or_default();
        Self::new(registry, root, &parts, property)
    }

    /// Resolve `relationships` hop by hop from `root`, ending at `property`.
    pub fn new(
        registry: &Registry,
        root: &str,
        relationships: &[&str],
        property: &str,
    ) -> Result<Self> {
        let invalid = |message: String| Error::config(ConfigErrorKind::InvalidPath, Some(root), message);
        if relationships.is_empty() {
            return Err(invalid(format!(
                "path to '{property}' needs at least one relationship"
            )));
        }

        let start = registry.entity(root)?;
        let mut current = Arc::clone(&start);
        let mut hops = Vec::new();
        for name in relationships {
            let relationship = current.relationship(name).cloned().ok_or_else(|| {
                invalid(format!("{} has no relationship '{name}'", current.name))
            })?;
            for link in relationship.links() {
                let hop = Hop::forward(registry, &link)?;
                if hop.entity.data_source != start.data_source {
                    return Err(invalid(format!(
                        "'{name}' crosses from data source '{}' to '{}'",
                        start.data_source, hop.entity.data_source
                    )));
                }
                hops.push(hop);
            }
            current = registry.entity(&relationship.target)?;
        }

        let property = current.property(property).cloned().ok_or_else(|| {
            invalid(format!("{} has no property '{property}'", current.name))
        })?;
        Ok(Self {
            root: root.to_string(),
            link: Link { hops },
            property,
        })
    }

    /// A path built from already-resolved hops.
    pub fn from_hops(root: impl Into<String>, hops: Vec<Hop>, property: Arc<Property>) -> Self {
        Self {
            root: root.into(),
            link: Link { hops },
            property,
        }
    }

    pub fn alias(&self) -> String {
        self.link.signature()
    }

    /// Same start, same hops, same property.
    pub fn equivalent(&self, other: &Path) -> bool {
        self.root == other.root
            && self.alias() == other.alias()
            && self.property.name == other.property.name
            && self.property.entity == other.property.entity
    }
}
