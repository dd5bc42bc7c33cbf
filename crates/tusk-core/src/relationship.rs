//! Relationship descriptors.
//!
//! Relationships are declared on an entity with a [`RelationshipDef`] and
//! resolved by the [`Registry`](crate::Registry) into an immutable
//! [`Relationship`] whose key properties are known:
//!
//! ```ignore
//! EntityDef::new("User")
//!     .belongs_to("group", "Group")          // User.group_id -> Group.id
//!     .has_many("comments", "Comment")       // Comment.user_id -> User.id
//!     .has_many_through("tags", "Tag", "taggings")
//! ```
//!
//! Key naming follows one convention: the foreign key on the "many" side is
//! the underscored name of the other side joined to each key name with `_`.
//! For a many-to-one relationship the other side is the relationship name,
//! for one-to-many it is the source entity name. `key_prefix` replaces the
//! derived prefix and `keys` names the foreign-key properties outright.

use crate::property::Property;
use std::sync::Arc;

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Source holds the foreign key of one target
    ManyToOne,
    /// Targets hold the foreign key of the source
    OneToMany,
    /// One-to-many restricted to a single target
    OneToOne,
    /// Two hops through a join entity
    ManyToMany,
}

impl Cardinality {
    /// Whether the relationship yields at most one record.
    pub const fn is_to_one(self) -> bool {
        matches!(self, Cardinality::ManyToOne | Cardinality::OneToOne)
    }

    /// Whether the relationship value is a collection.
    pub const fn is_to_many(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Cardinality::ManyToOne => "many-to-one",
            Cardinality::OneToMany => "one-to-many",
            Cardinality::OneToOne => "one-to-one",
            Cardinality::ManyToMany => "many-to-many",
        }
    }
}

/// Declaration of a relationship before key resolution.
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// Explicit foreign-key property names on the side that holds them
    pub keys: Option<Vec<String>>,
    /// Replaces the derived foreign-key prefix
    pub key_prefix: Option<String>,
    /// Many-to-many: relationship on the source leading to the join entity
    pub through: Option<String>,
    /// Many-to-many: relationship on the join entity leading to the target
    pub via: Option<String>,
    /// Pinned inverse relationship name on the target
    pub inverse: Option<String>,
    pub mass_assignable: bool,
}

impl RelationshipDef {
    fn new(name: impl Into<String>, target: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            keys: None,
            key_prefix: None,
            through: None,
            via: None,
            inverse: None,
            mass_assignable: true,
        }
    }

    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::ManyToOne)
    }

    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::OneToMany)
    }

    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::OneToOne)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        let mut def = Self::new(name, target, Cardinality::ManyToMany);
        def.through = Some(through.into());
        def
    }

    #[must_use]
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn via(mut self, via: impl Into<String>) -> Self {
        self.via = Some(via.into());
        self
    }

    #[must_use]
    pub fn inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    #[must_use]
    pub fn mass_assignable(mut self, mass_assignable: bool) -> Self {
        self.mass_assignable = mass_assignable;
        self
    }
}

/// A resolved association between two entities.
#[derive(Debug)]
pub struct Relationship {
    pub name: String,
    /// Entity that declares the relationship
    pub source: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// Properties on the source matched against `target_keys`, pairwise
    pub source_keys: Vec<Arc<Property>>,
    /// Properties on the target matched against `source_keys`, pairwise
    pub target_keys: Vec<Arc<Property>>,
    pub through: Option<Arc<Relationship>>,
    pub via: Option<Arc<Relationship>>,
    /// Pinned inverse name
    pub inverse: Option<String>,
    pub mass_assignable: bool,
}

impl Relationship {
    pub fn is_to_one(&self) -> bool {
        self.cardinality.is_to_one()
    }

    pub fn is_to_many(&self) -> bool {
        self.cardinality.is_to_many()
    }

    /// Whether the source side holds the foreign key.
    pub fn source_holds_keys(&self) -> bool {
        self.cardinality == Cardinality::ManyToOne
    }

    /// The direct hops this relationship is made of, in order from source
    /// to target. Nested many-to-many hops are flattened.
    pub fn links(self: &Arc<Self>) -> Vec<Arc<Relationship>> {
        match (&self.through, &self.via) {
            (Some(through), Some(via)) => {
                let mut links = through.links();
                links.extend(via.links());
                links
            }
            _ => vec![Arc::clone(self)],
        }
    }

    /// Source/target key property pairs.
    pub fn key_pairs(&self) -> impl Iterator<Item = (&Arc<Property>, &Arc<Property>)> {
        self.source_keys.iter().zip(self.target_keys.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(name: &str, source: &str, target: &str, cardinality: Cardinality) -> Arc<Relationship> {
        Arc::new(Relationship {
            name: name.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            cardinality,
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            through: None,
            via: None,
            inverse: None,
            mass_assignable: true,
        })
    }

    #[test]
    fn many_to_many_links_flatten() {
        let memberships = direct("memberships", "User", "Membership", Cardinality::OneToMany);
        let group = direct("group", "Membership", "Group", Cardinality::ManyToOne);
        let groups = Arc::new(Relationship {
            name: "groups".to_string(),
            source: "User".to_string(),
            target: "Group".to_string(),
            cardinality: Cardinality::ManyToMany,
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            through: Some(memberships),
            via: Some(group),
            inverse: None,
            mass_assignable: true,
        });
        let names: Vec<_> = groups.links().iter().map(|l| l.name.clone()).collect();
        assert_eq!(names, ["memberships", "group"]);
    }

    #[test]
    fn cardinality_flags() {
        assert!(Cardinality::OneToOne.is_to_one());
        assert!(Cardinality::ManyToMany.is_to_many());
        assert!(!Cardinality::OneToOne.is_to_many());
        let group = direct("group", "User", "Group", Cardinality::ManyToOne);
        assert!(group.source_holds_keys());
        assert_eq!(group.links().len(), 1);
    }
}
