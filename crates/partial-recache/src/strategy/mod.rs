//! When partial query plans are computed and what gets persisted for them.

mod eager;
mod lazy;

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use futures_util::future::join_all;
use indexmap::IndexSet;
use recache_runtime::{Store, StoreResult};

pub use eager::EagerStrategy;
pub use lazy::LazyStrategy;

use crate::{
    document::Document,
    entity::{CollectedEntity, EntityRecord, KnownEntities},
    error::StrategyError,
    keys::entity_key,
    result::ExecutionResponse,
    rewrite::LinkSelections,
    tree::CacheResolvers,
};

/// What to execute for a request and what to merge the results into.
#[derive(Debug, Default)]
pub struct PartialExecutionOpts {
    /// `None` when the cached response is still valid as a whole.
    pub query: Option<Document>,
    pub known_entities: KnownEntities,
    pub link_selections: LinkSelections,
    pub cached_result: Option<ExecutionResponse>,
}

impl PartialExecutionOpts {
    /// Executes the original document, ignoring anything cached.
    pub fn full(document: &Document) -> Self {
        PartialExecutionOpts {
            query: Some(document.clone()),
            ..Default::default()
        }
    }
}

pub struct StoreRequest<'a> {
    pub cache_key: &'a str,
    pub result: &'a ExecutionResponse,
    pub collected_entities: &'a [CollectedEntity],
    pub ttl: Duration,
    pub entity_ttls: &'a BTreeMap<String, Duration>,
    pub original_document: &'a Document,
}

#[async_trait::async_trait]
pub trait InvalidationStrategy: Send + Sync {
    async fn partial_execution_opts(
        &self,
        cache_key: &str,
        document: &Document,
        resolvers: &CacheResolvers,
    ) -> Result<PartialExecutionOpts, StrategyError>;

    async fn invalidate_entities(&self, entities: &[EntityRecord]) -> Result<(), StrategyError>;

    async fn store_execution_result(&self, request: StoreRequest<'_>) -> Result<(), StrategyError>;
}

pub(crate) fn ttl_ms(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Reads a stored response. Payloads that do not deserialize are logged and
/// treated as absent.
pub(crate) async fn load_cached_response(store: &Store, cache_key: &str) -> StoreResult<Option<ExecutionResponse>> {
    let Some(bytes) = store.get(cache_key).await? else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(response) => Ok(Some(response)),
        Err(err) => {
            tracing::error!("could not deserialize the cached response {cache_key}, falling back to uncached execution: {err}");
            Ok(None)
        }
    }
}

/// Entity keys touched by an invalidation. An entity without id stands for
/// every entity of its type.
pub(crate) async fn entity_keys_to_invalidate(store: &Store, entities: &[EntityRecord]) -> StoreResult<IndexSet<String>> {
    let mut keys = entities.iter().map(entity_key).collect::<IndexSet<_>>();

    let lookups = entities
        .iter()
        .filter(|entity| entity.id.is_none())
        .map(|entity| async move {
            let prefix = format!("{}:", entity.typename);
            let keys = store.keys_starting_with(&entity.typename).await?;
            Ok::<_, recache_runtime::StoreError>(
                keys.into_iter()
                    .filter(|key| *key == entity.typename || key.starts_with(&prefix))
                    .collect::<Vec<_>>(),
            )
        });

    for found in join_all(lookups).await {
        keys.extend(found?);
    }

    Ok(keys)
}

/// Set members read during one call, each set is only fetched once.
pub(crate) struct SetMembers<'a> {
    store: &'a Store,
    members: HashMap<String, Vec<String>>,
}

impl<'a> SetMembers<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        SetMembers {
            store,
            members: HashMap::new(),
        }
    }

    pub(crate) async fn get(&mut self, key: &str) -> StoreResult<&[String]> {
        if !self.members.contains_key(key) {
            let members = self.store.get_set_members(key).await?;
            self.members.insert(key.to_string(), members);
        }
        Ok(self.members.get(key).map(Vec::as_slice).unwrap_or_default())
    }
}
