//! Clinical entities and their normalized identity.
//!
//! Two mentions are the same entity when their [`EntityKey`]s are equal. The
//! key is the ontology code (`cui`) when the extractor supplied one, otherwise
//! the canonical name; both are lower-cased with whitespace collapsed, so
//! `"Chest Pain"` and `"chest  pain"` compare equal.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A named clinical mention extracted from text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    /// Canonical (pretty) name.
    pub pretty_name: String,
    /// Ontology concept code, e.g. a UMLS CUI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cui: Option<String>,
    /// Semantic type tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Start offset (characters) in the originating text.
    pub start: usize,
    /// End offset (characters, exclusive) in the originating text.
    pub end: usize,
}

impl Entity {
    /// Create an entity with a name and span and no ontology code.
    pub fn new(pretty_name: impl Into<String>, start: usize, end: usize) -> Self {
        Self { pretty_name: pretty_name.into(), cui: None, types: Vec::new(), start, end }
    }

    /// Attach an ontology code.
    pub fn with_cui(mut self, cui: impl Into<String>) -> Self {
        self.cui = Some(cui.into());
        self
    }

    /// Attach semantic type tags.
    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    /// Normalized identity used for overlap. `None` when the entity has
    /// neither a code nor a name.
    pub fn key(&self) -> Option<EntityKey> {
        self.cui
            .as_deref()
            .and_then(EntityKey::normalize)
            .or_else(|| EntityKey::normalize(&self.pretty_name))
    }

    /// Move the span by `offset` characters.
    pub fn shifted(mut self, offset: usize) -> Self {
        self.start += offset;
        self.end += offset;
        self
    }
}

/// Normalized entity identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    fn normalize(raw: &str) -> Option<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        (!normalized.is_empty()).then_some(Self(normalized))
    }

    /// The normalized text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The distinct entities of one text, keyed by [`EntityKey`].
///
/// The first mention of each entity is kept. Iteration is in key order, so
/// two sets built from the same mentions always iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct EntitySet {
    entities: BTreeMap<EntityKey, Entity>,
}

impl EntitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mention. Returns `false` if the entity was already present
    /// or has no usable identity.
    pub fn insert(&mut self, entity: Entity) -> bool {
        let Some(key) = entity.key() else {
            return false;
        };
        if self.entities.contains_key(&key) {
            return false;
        }
        self.entities.insert(key, entity);
        true
    }

    /// Number of distinct entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether an entity with this key is present.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Look up the retained mention for a key.
    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Iterate over the distinct keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.keys()
    }

    /// Iterate over the retained mentions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Keys present in both sets, in order.
    pub fn overlap(&self, other: &EntitySet) -> Vec<EntityKey> {
        let (small, large) =
            if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.keys().filter(|k| large.contains(k)).cloned().collect()
    }
}

impl FromIterator<Entity> for EntitySet {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Entity> for EntitySet {
    fn extend<I: IntoIterator<Item = Entity>>(&mut self, iter: I) {
        for entity in iter {
            self.insert(entity);
        }
    }
}

impl From<Vec<Entity>> for EntitySet {
    fn from(entities: Vec<Entity>) -> Self {
        entities.into_iter().collect()
    }
}

impl From<EntitySet> for Vec<Entity> {
    fn from(set: EntitySet) -> Self {
        set.entities.into_values().collect()
    }
}
