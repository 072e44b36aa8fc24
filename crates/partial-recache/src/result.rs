use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::entity::KnownEntities;

/// Key of the cache metadata block in a response's extensions.
pub const CACHE_EXTENSION: &str = "cache";

/// A GraphQL response as returned by an executor, stored in the cache and
/// returned to the client.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ExecutionResponse {
    pub fn from_data(data: Value) -> Self {
        ExecutionResponse {
            data: match data {
                Value::Object(data) => Some(data),
                _ => None,
            },
            ..Default::default()
        }
    }

    pub fn cache_metadata(&self) -> Result<Option<CacheMetadata>, serde_json::Error> {
        self.extensions
            .get(CACHE_EXTENSION)
            .map(CacheMetadata::deserialize)
            .transpose()
    }

    pub fn set_cache_metadata(&mut self, metadata: &CacheMetadata) -> Result<(), serde_json::Error> {
        self.extensions
            .insert(CACHE_EXTENSION.to_string(), serde_json::to_value(metadata)?);
        Ok(())
    }
}

/// The cache metadata block. Stored responses carry the bookkeeping of the
/// eager strategy in it, returned responses describe how they were produced.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit: Option<bool>,
    #[serde(default)]
    pub known_entities: KnownEntities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_queries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_document: Option<String>,
    /// Printed selection sets per coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selections: Option<IndexMap<String, String>>,
    /// Entity keys invalidated since the response was stored.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub invalidated_entities: IndexSet<String>,
}
