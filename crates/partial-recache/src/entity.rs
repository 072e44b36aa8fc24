use std::{borrow::Cow, fmt, hash::Hash};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

/// An entity id as found in a response.
///
/// Ids are compared by their textual form: ids read back from store keys are
/// always strings while a response may carry them as numbers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    String(String),
}

impl Id {
    pub fn from_value(value: &Value) -> Option<Id> {
        match value {
            Value::String(id) => Some(Id::String(id.clone())),
            Value::Number(number) => Some(
                number
                    .as_i64()
                    .map(Id::Int)
                    .unwrap_or_else(|| Id::String(number.to_string())),
            ),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Id::Int(id) => Value::from(*id),
            Id::String(id) => Value::from(id.as_str()),
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Id::Int(id) => Cow::Owned(id.to_string()),
            Id::String(id) => Cow::Borrowed(id),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.as_text() == other.as_text()
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_text().hash(state)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Int(value)
    }
}

/// One step from the response root to a value. List steps carry the index and,
/// when the list member is an entity, its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPart {
    pub field: String,
    pub index: Option<usize>,
    pub id: Option<Id>,
}

impl PathPart {
    pub fn field(field: impl Into<String>) -> Self {
        PathPart {
            field: field.into(),
            index: None,
            id: None,
        }
    }

    pub fn list(field: impl Into<String>, index: usize, id: Option<Id>) -> Self {
        PathPart {
            field: field.into(),
            index: Some(index),
            id,
        }
    }

    pub fn is_list(&self) -> bool {
        self.index.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRecord {
    pub typename: String,
    pub id: Option<Id>,
}

impl EntityRecord {
    pub fn new(typename: impl Into<String>, id: Option<Id>) -> Self {
        EntityRecord {
            typename: typename.into(),
            id,
        }
    }
}

/// An entity found at a path of a previously collected response.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedEntity {
    pub entity: EntityRecord,
    pub path: Vec<PathPart>,
}

/// One observation fed into the entity tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCacheResult {
    pub entity: EntityRecord,
    pub path: Vec<PathPart>,
    pub invalidated: bool,
}

#[cfg(test)]
impl EntityCacheResult {
    /// Builds an observation from a path written like the path of an entity reference key.
    pub(crate) fn mock(typename: &str, id: &str, invalidated: bool, path: &str) -> Self {
        let reference = crate::keys::parse_entity_reference_key(&format!("{typename}>{path}")).unwrap();
        EntityCacheResult {
            entity: EntityRecord::new(typename, Some(Id::from(id))),
            path: reference.path,
            invalidated,
        }
    }
}

/// Entities already folded into a response, keyed by typename.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct KnownEntities(IndexMap<String, IndexSet<Id>>);

impl KnownEntities {
    pub fn from_collected(collected: &[CollectedEntity]) -> Self {
        let mut known = KnownEntities::default();
        for CollectedEntity { entity, .. } in collected {
            if let Some(id) = &entity.id {
                known.insert(&entity.typename, id.clone());
            }
        }
        known
    }

    pub fn contains(&self, typename: &str, id: &Id) -> bool {
        self.0.get(typename).is_some_and(|ids| ids.contains(id))
    }

    /// Returns false if the entity was already known.
    pub fn insert(&mut self, typename: &str, id: Id) -> bool {
        match self.0.get_mut(typename) {
            Some(ids) => ids.insert(id),
            None => {
                self.0.insert(typename.to_string(), IndexSet::from([id]));
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
