//! The schema registry.
//!
//! All entity declarations are collected by a [`RegistryBuilder`] and
//! resolved at once by [`RegistryBuilder::build`]: inheritance is flattened,
//! default keys are added, relationship keys are derived and every name is
//! checked. A built [`Registry`] is immutable and shared by reference.
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .entity(EntityDef::new("Group").property(Property::string("name")))
//!     .entity(
//!         EntityDef::new("User")
//!             .property(Property::string("nickname"))
//!             .property(Property::integer("group_id"))
//!             .belongs_to("group", "Group"),
//!     )
//!     .build()?;
//! ```

use crate::entity::{DEFAULT_DATA_SOURCE, EntityDef, EntityType, Member};
use crate::error::{ConfigErrorKind, Error, Result};
use crate::inflect::{EnglishInflector, Inflector};
use crate::property::{Property, PropertyKind};
use crate::relationship::{Cardinality, Relationship, RelationshipDef};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Immutable, resolved schema.
pub struct Registry {
    entities: HashMap<String, Arc<EntityType>>,
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
    inflector: Box<dyn Inflector + Send + Sync>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.order)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look an entity up by name.
    pub fn entity(&self, name: &str) -> Result<Arc<EntityType>> {
        self.entities.get(name).cloned().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownEntity,
                Some(name),
                format!("entity '{name}' is not registered"),
            )
        })
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    /// Look a property or relationship up by name.
    pub fn member(&self, entity: &str, name: &str) -> Result<Member> {
        self.entity(entity)?.member(name).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownMember,
                Some(entity),
                format!("'{name}' is neither a property nor a relationship"),
            )
        })
    }

    pub fn inflector(&self) -> &dyn Inflector {
        self.inflector.as_ref()
    }

    /// Whether `name` is `ancestor` or inherits from it.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name.to_string());
        while let Some(entity) = current {
            if entity == ancestor {
                return true;
            }
            current = self.entities.get(&entity).and_then(|e| e.parent.clone());
        }
        false
    }

    /// `name` followed by every entity inheriting from it, depth first.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut out = vec![name.to_string()];
        if let Some(children) = self.children.get(name) {
            for child in children {
                out.extend(self.descendants(child));
            }
        }
        out
    }

    /// Every column stored in the table of `root`, including the ones
    /// declared by descendants.
    pub fn table_properties(&self, root: &str) -> Vec<Arc<Property>> {
        let mut seen = HashSet::new();
        self.descendants(root)
            .iter()
            .filter_map(|name| self.entities.get(name))
            .flat_map(|entity| entity.properties.iter())
            .filter(|p| seen.insert(p.name.clone()))
            .cloned()
            .collect()
    }

    /// The relationship on the target entity that mirrors `relationship`.
    ///
    /// A pinned inverse wins. Otherwise candidates must connect the same
    /// two entities in the opposite direction and, for direct
    /// relationships, pair the same key properties. Zero or several
    /// candidates are configuration errors.
    pub fn inverse_of(&self, relationship: &Relationship) -> Result<Arc<Relationship>> {
        let target = self.entity(&relationship.target)?;

        if let Some(pinned) = &relationship.inverse {
            return target.relationship(pinned).cloned().ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::MissingInverse,
                    Some(&relationship.source),
                    format!(
                        "pinned inverse '{pinned}' of '{}' does not exist on {}",
                        relationship.name, target.name
                    ),
                )
            });
        }

        let many_to_many = relationship.cardinality == Cardinality::ManyToMany;
        let candidates: Vec<_> = target
            .relationships
            .iter()
            .filter(|c| !std::ptr::eq(c.as_ref(), relationship))
            .filter(|c| self.is_a(&relationship.source, &c.target))
            .filter(|c| (c.cardinality == Cardinality::ManyToMany) == many_to_many)
            .filter(|c| {
                many_to_many
                    || (same_keys(&c.source_keys, &relationship.target_keys)
                        && same_keys(&c.target_keys, &relationship.source_keys))
            })
            .collect();

        match candidates.as_slice() {
            [only] => Ok(Arc::clone(only)),
            [] => Err(Error::config(
                ConfigErrorKind::MissingInverse,
                Some(&relationship.source),
                format!(
                    "no relationship on {} mirrors '{}'",
                    target.name, relationship.name
                ),
            )),
            several => Err(Error::config(
                ConfigErrorKind::AmbiguousInverse,
                Some(&relationship.source),
                format!(
                    "'{}' has {} candidate inverses on {}: {}",
                    relationship.name,
                    several.len(),
                    target.name,
                    several
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }
}

fn same_keys(a: &[Arc<Property>], b: &[Arc<Property>]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.name == y.name && x.entity == y.entity)
}

/// Collects entity declarations.
pub struct RegistryBuilder {
    defs: Vec<EntityDef>,
    inflector: Box<dyn Inflector + Send + Sync>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            defs: Vec::new(),
            inflector: Box::new(EnglishInflector),
        }
    }
}

impl RegistryBuilder {
    #[must_use]
    pub fn entity(mut self, def: EntityDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Replace the naming conventions used for tables and foreign keys.
    #[must_use]
    pub fn inflector(mut self, inflector: impl Inflector + Send + Sync + 'static) -> Self {
        self.inflector = Box::new(inflector);
        self
    }

    /// Resolve every declaration.
    pub fn build(self) -> Result<Registry> {
        let mut resolver = Resolver::new(&self.defs, self.inflector.as_ref())?;
        for def in &self.defs {
            resolver.properties_of(&def.name, &mut Vec::new())?;
        }
        for def in &self.defs {
            for rel in &def.relationships {
                if rel.cardinality != Cardinality::ManyToMany {
                    resolver.resolve_direct(def, rel)?;
                }
            }
        }
        for def in &self.defs {
            for rel in &def.relationships {
                resolver.resolve_relationship(&def.name, &rel.name, &mut Vec::new())?;
            }
        }

        let mut entities = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for def in &self.defs {
            let entity = resolver.assemble(&def.name)?;
            if let Some(parent) = &def.parent {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(def.name.clone());
            }
            tracing::debug!(
                entity = %entity.name,
                table = %entity.storage_name,
                properties = entity.properties.len(),
                relationships = entity.relationships.len(),
                "Registered entity"
            );
            entities.insert(def.name.clone(), Arc::new(entity));
        }

        Ok(Registry {
            entities,
            order: self.defs.iter().map(|d| d.name.clone()).collect(),
            children,
            inflector: self.inflector,
        })
    }
}

// ==================== Resolution ====================

struct Resolver<'a> {
    defs: HashMap<&'a str, &'a EntityDef>,
    inflector: &'a dyn Inflector,
    properties: HashMap<String, Vec<Arc<Property>>>,
    relationships: HashMap<(String, String), Arc<Relationship>>,
}

impl<'a> Resolver<'a> {
    fn new(defs: &'a [EntityDef], inflector: &'a dyn Inflector) -> Result<Self> {
        let mut index = HashMap::new();
        for def in defs {
            if index.insert(def.name.as_str(), def).is_some() {
                return Err(Error::config(
                    ConfigErrorKind::Unsupported,
                    Some(&def.name),
                    "entity declared twice",
                ));
            }
        }
        for def in defs {
            let targets = def
                .parent
                .iter()
                .chain(def.relationships.iter().map(|r| &r.target));
            for name in targets {
                if !index.contains_key(name.as_str()) {
                    return Err(Error::config(
                        ConfigErrorKind::UnknownEntity,
                        Some(&def.name),
                        format!("entity '{name}' is not registered"),
                    ));
                }
            }
        }
        Ok(Self {
            defs: index,
            inflector,
            properties: HashMap::new(),
            relationships: HashMap::new(),
        })
    }

    fn def(&self, name: &str) -> Result<&'a EntityDef> {
        self.defs.get(name).copied().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownEntity,
                Some(name),
                format!("entity '{name}' is not registered"),
            )
        })
    }

    /// Inheritance chain from the root down to `name`.
    fn chain(&self, name: &str) -> Result<Vec<&'a EntityDef>> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(entity) = current {
            let def = self.def(&entity)?;
            if chain.iter().any(|d: &&EntityDef| d.name == def.name) {
                return Err(Error::config(
                    ConfigErrorKind::Unsupported,
                    Some(name),
                    "inheritance cycle",
                ));
            }
            chain.push(def);
            current = def.parent.clone();
        }
        chain.reverse();
        Ok(chain)
    }

    fn properties_of(&mut self, name: &str, visiting: &mut Vec<String>) -> Result<Vec<Arc<Property>>> {
        if let Some(done) = self.properties.get(name) {
            return Ok(done.clone());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(Error::config(
                ConfigErrorKind::Unsupported,
                Some(name),
                "inheritance cycle",
            ));
        }
        visiting.push(name.to_string());

        let def = self.def(name)?;
        let mut properties = match &def.parent {
            Some(parent) => self.properties_of(parent, visiting)?,
            None => Vec::new(),
        };

        let mut own: Vec<Property> = def.properties.clone();
        if def.parent.is_none() && !own.iter().any(|p| p.key) {
            own.insert(0, Property::serial("id"));
        }
        for mut property in own {
            if properties.iter().any(|p| p.name == property.name) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateProperty,
                    Some(name),
                    format!("property '{}' is declared twice", property.name),
                ));
            }
            if def.parent.is_some() && property.key {
                return Err(Error::config(
                    ConfigErrorKind::Unsupported,
                    Some(name),
                    format!(
                        "key property '{}' must be declared on the inheritance root",
                        property.name
                    ),
                ));
            }
            property.entity = name.to_string();
            properties.push(Arc::new(property));
        }

        visiting.pop();
        self.properties.insert(name.to_string(), properties.clone());
        Ok(properties)
    }

    fn property(&self, entity: &str, name: &str) -> Option<Arc<Property>> {
        self.properties
            .get(entity)
            .and_then(|props| props.iter().find(|p| p.name == name))
            .cloned()
    }

    fn keys(&self, entity: &str) -> Vec<Arc<Property>> {
        self.properties
            .get(entity)
            .map(|props| props.iter().filter(|p| p.key).cloned().collect())
            .unwrap_or_default()
    }

    /// Foreign-key properties on `holder`: explicit names, or
    /// `{prefix}_{key}` for each key on the other side.
    fn foreign_keys(
        &self,
        owner: &str,
        rel: &RelationshipDef,
        holder: &str,
        default_prefix: &str,
        referenced: &[Arc<Property>],
    ) -> Result<Vec<Arc<Property>>> {
        let names: Vec<String> = match &rel.keys {
            Some(keys) => keys.clone(),
            None => {
                let prefix = rel
                    .key_prefix
                    .clone()
                    .unwrap_or_else(|| self.inflector.underscore(default_prefix));
                referenced
                    .iter()
                    .map(|k| format!("{prefix}_{}", k.name))
                    .collect()
            }
        };

        let unresolved = |detail: String| {
            Error::config(
                ConfigErrorKind::UnresolvedKeys,
                Some(owner),
                format!("cannot resolve keys of '{}': {detail}", rel.name),
            )
        };
        if names.len() != referenced.len() || names.is_empty() {
            return Err(unresolved(format!(
                "{} foreign keys for {} referenced keys",
                names.len(),
                referenced.len()
            )));
        }
        names
            .iter()
            .map(|n| {
                self.property(holder, n)
                    .ok_or_else(|| unresolved(format!("{holder} has no property '{n}'")))
            })
            .collect()
    }

    fn check_unique_name(&self, owner: &str, name: &str) -> Result<()> {
        let chain = self.chain(owner)?;
        let clashes = chain
            .iter()
            .flat_map(|d| d.relationships.iter())
            .filter(|r| r.name == name)
            .count();
        if clashes > 1 || self.property(owner, name).is_some() {
            return Err(Error::config(
                ConfigErrorKind::DuplicateRelationship,
                Some(owner),
                format!("member '{name}' is declared twice"),
            ));
        }
        Ok(())
    }

    fn resolve_direct(&mut self, def: &EntityDef, rel: &RelationshipDef) -> Result<Arc<Relationship>> {
        self.check_unique_name(&def.name, &rel.name)?;
        let (source_keys, target_keys) = match rel.cardinality {
            Cardinality::ManyToOne => {
                let target_keys = self.keys(&rel.target);
                let source_keys =
                    self.foreign_keys(&def.name, rel, &def.name, &rel.name, &target_keys)?;
                (source_keys, target_keys)
            }
            _ => {
                let source_keys = self.keys(&def.name);
                let target_keys =
                    self.foreign_keys(&def.name, rel, &rel.target, &def.name, &source_keys)?;
                (source_keys, target_keys)
            }
        };

        let resolved = Arc::new(Relationship {
            name: rel.name.clone(),
            source: def.name.clone(),
            target: rel.target.clone(),
            cardinality: rel.cardinality,
            source_keys,
            target_keys,
            through: None,
            via: None,
            inverse: rel.inverse.clone(),
            mass_assignable: rel.mass_assignable,
        });
        self.relationships
            .insert((def.name.clone(), rel.name.clone()), Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Find a relationship visible on `entity`, resolving many-to-many
    /// declarations on demand.
    fn resolve_relationship(
        &mut self,
        entity: &str,
        name: &str,
        visiting: &mut Vec<(String, String)>,
    ) -> Result<Option<Arc<Relationship>>> {
        for def in self.chain(entity)?.into_iter().rev() {
            let Some(rel) = def.relationships.iter().find(|r| r.name == name) else {
                continue;
            };
            let key = (def.name.clone(), rel.name.clone());
            if let Some(done) = self.relationships.get(&key) {
                return Ok(Some(Arc::clone(done)));
            }
            if visiting.contains(&key) {
                return Err(Error::config(
                    ConfigErrorKind::Unsupported,
                    Some(&def.name),
                    format!("many-to-many '{name}' refers to itself"),
                ));
            }
            visiting.push(key);
            let resolved = self.resolve_many_to_many(def, rel, visiting)?;
            visiting.pop();
            return Ok(Some(resolved));
        }
        Ok(None)
    }

    fn resolve_many_to_many(
        &mut self,
        def: &EntityDef,
        rel: &RelationshipDef,
        visiting: &mut Vec<(String, String)>,
    ) -> Result<Arc<Relationship>> {
        self.check_unique_name(&def.name, &rel.name)?;
        let through_name = rel.through.clone().unwrap_or_default();
        let through = self
            .resolve_relationship(&def.name, &through_name, visiting)?
            .filter(|t| t.is_to_many())
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownMember,
                    Some(&def.name),
                    format!(
                        "'{}' goes through '{through_name}', which is not a to-many relationship",
                        rel.name
                    ),
                )
            })?;

        let join = through.target.clone();
        let singular = self.inflector.singularize(&rel.name);
        let mut via = None;
        for candidate in rel.via.iter().chain([&rel.name, &singular]) {
            via = self.resolve_relationship(&join, candidate, visiting)?;
            if via.is_some() || rel.via.is_some() {
                break;
            }
        }
        let via = via.ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownMember,
                Some(&def.name),
                format!(
                    "no relationship on {join} leads from '{}' to {}",
                    rel.name, rel.target
                ),
            )
        })?;
        if via.target != rel.target {
            return Err(Error::config(
                ConfigErrorKind::InvalidPath,
                Some(&def.name),
                format!(
                    "'{}' expects {} but '{}' leads to {}",
                    rel.name, rel.target, via.name, via.target
                ),
            ));
        }

        let resolved = Arc::new(Relationship {
            name: rel.name.clone(),
            source: def.name.clone(),
            target: rel.target.clone(),
            cardinality: Cardinality::ManyToMany,
            source_keys: through.source_keys.clone(),
            target_keys: through.target_keys.clone(),
            through: Some(through),
            via: Some(via),
            inverse: rel.inverse.clone(),
            mass_assignable: rel.mass_assignable,
        });
        self.relationships
            .insert((def.name.clone(), rel.name.clone()), Arc::clone(&resolved));
        Ok(resolved)
    }

    fn assemble(&self, name: &str) -> Result<EntityType> {
        let chain = self.chain(name)?;
        let root = chain[0];
        let properties = self.properties.get(name).cloned().unwrap_or_default();

        let mut relationships = Vec::new();
        for def in &chain {
            for rel in &def.relationships {
                let key = (def.name.clone(), rel.name.clone());
                if let Some(resolved) = self.relationships.get(&key) {
                    relationships.push(Arc::clone(resolved));
                }
            }
        }

        let storage_name = root.storage_name.clone().unwrap_or_else(|| {
            self.inflector
                .underscore(&self.inflector.pluralize(&root.name))
        });

        Ok(EntityType {
            name: name.to_string(),
            parent: chain.iter().rev().nth(1).map(|d| d.name.clone()),
            root: root.name.clone(),
            data_source: root
                .data_source
                .clone()
                .unwrap_or_else(|| DEFAULT_DATA_SOURCE.to_string()),
            storage_name,
            keys: properties.iter().filter(|p| p.key).cloned().collect(),
            discriminator: properties
                .iter()
                .find(|p| p.kind == PropertyKind::Discriminator)
                .cloned(),
            properties,
            relationships,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> Registry {
        Registry::builder()
            .entity(
                EntityDef::new("Group")
                    .property(Property::string("name"))
                    .relationship(
                        RelationshipDef::one_to_many("members", "User").key_prefix("group"),
                    ),
            )
            .entity(
                EntityDef::new("User")
                    .property(Property::string("nickname").required())
                    .property(Property::integer("group_id"))
                    .belongs_to("group", "Group")
                    .has_many("memberships", "Membership")
                    .has_many_through("clubs", "Club", "memberships"),
            )
            .entity(
                EntityDef::new("Club")
                    .property(Property::string("title"))
                    .has_many("memberships", "Membership"),
            )
            .entity(
                EntityDef::new("Membership")
                    .property(Property::integer("user_id"))
                    .property(Property::integer("club_id"))
                    .belongs_to("user", "User")
                    .belongs_to("club", "Club"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn default_key_and_table_name() {
        let registry = Registry::builder()
            .entity(EntityDef::new("BlogPost").property(Property::string("title")))
            .build()
            .unwrap();
        let post = registry.entity("BlogPost").unwrap();
        assert_eq!(post.storage_name, "blog_posts");
        assert_eq!(post.keys.len(), 1);
        assert_eq!(post.keys[0].name, "id");
        assert!(post.keys[0].serial);
        assert_eq!(post.properties[0].name, "id");
    }

    #[test]
    fn unknown_targets_fail() {
        let err = Registry::builder()
            .entity(EntityDef::new("User").belongs_to("group", "Group"))
            .build()
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownEntity));
    }

    #[test]
    fn missing_foreign_key_fails() {
        let err = Registry::builder()
            .entity(EntityDef::new("Group"))
            .entity(EntityDef::new("User").belongs_to("group", "Group"))
            .build()
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnresolvedKeys));
    }

    #[test]
    fn duplicate_property_fails() {
        let err = Registry::builder()
            .entity(
                EntityDef::new("User")
                    .property(Property::string("nickname"))
                    .property(Property::text("nickname")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::DuplicateProperty));
    }

    #[test]
    fn many_to_one_keys_follow_the_relationship_name() {
        let registry = blog();
        let user = registry.entity("User").unwrap();
        let group = user.relationship("group").unwrap();
        assert_eq!(group.source_keys[0].name, "group_id");
        assert_eq!(group.target_keys[0].name, "id");
        assert_eq!(group.target_keys[0].entity, "Group");
    }

    #[test]
    fn one_to_many_keys_follow_the_source_name() {
        let registry = blog();
        let user = registry.entity("User").unwrap();
        let memberships = user.relationship("memberships").unwrap();
        assert_eq!(memberships.source_keys[0].name, "id");
        assert_eq!(memberships.target_keys[0].name, "user_id");
    }

    #[test]
    fn many_to_many_resolves_via_singular_name() {
        let registry = blog();
        let user = registry.entity("User").unwrap();
        let clubs = user.relationship("clubs").unwrap();
        assert_eq!(clubs.through.as_ref().unwrap().name, "memberships");
        assert_eq!(clubs.via.as_ref().unwrap().name, "club");
        assert_eq!(clubs.links().len(), 2);
    }

    #[test]
    fn inverse_matches_mirrored_keys() {
        let registry = blog();
        let user = registry.entity("User").unwrap();
        let group = user.relationship("group").unwrap();
        let inverse = registry.inverse_of(group).unwrap();
        assert_eq!(inverse.name, "members");

        let membership = registry.entity("Membership").unwrap();
        let back = registry
            .inverse_of(membership.relationship("user").unwrap())
            .unwrap();
        assert_eq!(back.name, "memberships");
    }

    #[test]
    fn inverse_requires_a_candidate() {
        let registry = blog();
        let user = registry.entity("User").unwrap();
        let err = registry
            .inverse_of(user.relationship("clubs").unwrap())
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingInverse));
    }

    #[test]
    fn ambiguous_inverse_is_reported_and_pinning_resolves_it() {
        let def = |pin: Option<&str>| {
            let mut owner = RelationshipDef::many_to_one("owner", "Person").key_prefix("person");
            if let Some(pin) = pin {
                owner = owner.inverse(pin);
            }
            Registry::builder()
                .entity(
                    EntityDef::new("Person")
                        .has_many("cars", "Car")
                        .has_many("vehicles", "Car"),
                )
                .entity(
                    EntityDef::new("Car")
                        .property(Property::integer("person_id"))
                        .relationship(owner),
                )
                .build()
                .unwrap()
        };

        let registry = def(None);
        let car = registry.entity("Car").unwrap();
        let err = registry
            .inverse_of(car.relationship("owner").unwrap())
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::AmbiguousInverse));

        let registry = def(Some("vehicles"));
        let car = registry.entity("Car").unwrap();
        let inverse = registry.inverse_of(car.relationship("owner").unwrap()).unwrap();
        assert_eq!(inverse.name, "vehicles");
    }

    #[test]
    fn inheritance_shares_root_storage() {
        let registry = Registry::builder()
            .entity(
                EntityDef::new("Vehicle")
                    .property(Property::discriminator("kind"))
                    .property(Property::string("name")),
            )
            .entity(
                EntityDef::new("Truck")
                    .extends("Vehicle")
                    .property(Property::integer("payload")),
            )
            .entity(EntityDef::new("Pickup").extends("Truck"))
            .build()
            .unwrap();

        let pickup = registry.entity("Pickup").unwrap();
        assert_eq!(pickup.root, "Vehicle");
        assert_eq!(pickup.storage_name, "vehicles");
        assert_eq!(pickup.parent.as_deref(), Some("Truck"));
        assert!(pickup.discriminator.is_some());
        assert!(pickup.property("payload").is_some());
        assert!(registry.is_a("Pickup", "Vehicle"));
        assert!(!registry.is_a("Vehicle", "Truck"));
        assert_eq!(registry.descendants("Vehicle"), ["Vehicle", "Truck", "Pickup"]);

        let columns: Vec<_> = registry
            .table_properties("Vehicle")
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(columns, ["id", "kind", "name", "payload"]);
    }
}
