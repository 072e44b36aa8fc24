use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use futures_util::future::join_all;
use indexmap::{IndexMap, IndexSet};
use recache_runtime::Store;

use super::{
    entity_keys_to_invalidate, load_cached_response, ttl_ms, InvalidationStrategy, PartialExecutionOpts, SetMembers,
    StoreRequest,
};
use crate::{
    collect::collect_entity_records,
    document::{parse_document, parse_selection_set, print_selection_set, Document},
    entity::{EntityCacheResult, EntityRecord, Id, KnownEntities},
    error::StrategyError,
    keys::{entity_key, parse_entity_key},
    result::CacheMetadata,
    rewrite::partial_recache_query,
    tree::{CacheResolvers, EntityTree},
};

/// Computes the partial query plan when entities get invalidated and stores it
/// along with the cached response, reads only pick it up.
pub struct EagerStrategy {
    store: Store,
    ttl: Duration,
    resolvers: CacheResolvers,
}

impl EagerStrategy {
    pub fn new(store: Store, ttl: Duration, resolvers: CacheResolvers) -> Self {
        EagerStrategy { store, ttl, resolvers }
    }

    /// Re-plans one cached response.
    async fn invalidate_operation(&self, cache_key: &str, entity_keys: &IndexSet<String>) -> Result<(), StrategyError> {
        let Some(mut cached) = load_cached_response(&self.store, cache_key).await? else {
            return Ok(());
        };

        let Some(mut metadata) = cached.cache_metadata()? else {
            tracing::error!("no cache metadata on the invalidated response {cache_key}, skipping");
            return Ok(());
        };

        let Some(original_document) = metadata.original_document.as_deref() else {
            tracing::error!("the original document of {cache_key} was not stored, skipping");
            return Ok(());
        };
        let document = parse_document(original_document)?;

        // earlier invalidations of the same response still need to be fetched
        metadata.invalidated_entities.extend(entity_keys.iter().cloned());

        let mut invalidated: HashMap<String, HashSet<Option<Id>>> = HashMap::new();
        for key in &metadata.invalidated_entities {
            let EntityRecord { typename, id } = parse_entity_key(key);
            invalidated.entry(typename).or_default().insert(id);
        }

        let observations = collect_entity_records(cached.data.as_ref().unwrap_or(&Default::default()))
            .into_iter()
            .map(|collected| EntityCacheResult {
                invalidated: invalidated
                    .get(&collected.entity.typename)
                    .is_some_and(|ids| ids.contains(&collected.entity.id)),
                entity: collected.entity,
                path: collected.path,
            })
            .collect::<Vec<_>>();
        let tree = EntityTree::from_observations(&observations, &self.resolvers)?;

        if let Some(partial) = partial_recache_query(&document, &tree)? {
            metadata.partial_query = Some(partial.query.to_string());
            metadata.link_selections = Some(
                partial
                    .link_selections
                    .iter()
                    .map(|(coordinates, selection_set)| (coordinates.clone(), print_selection_set(selection_set)))
                    .collect(),
            );
        }

        cached.set_cache_metadata(&metadata)?;
        self.store.set_json(cache_key, &cached, ttl_ms(self.ttl)).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl InvalidationStrategy for EagerStrategy {
    async fn partial_execution_opts(
        &self,
        cache_key: &str,
        document: &Document,
        _resolvers: &CacheResolvers,
    ) -> Result<PartialExecutionOpts, StrategyError> {
        let Some(cached) = load_cached_response(&self.store, cache_key).await? else {
            return Ok(PartialExecutionOpts::full(document));
        };

        let metadata = match cached.cache_metadata() {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                tracing::warn!("no cache metadata on the cached response {cache_key}, falling back to uncached execution");
                return Ok(PartialExecutionOpts::full(document));
            }
            Err(err) => {
                tracing::error!("malformed cache metadata on {cache_key}, falling back to uncached execution: {err}");
                return Ok(PartialExecutionOpts::full(document));
            }
        };

        let Some(partial_query) = metadata.partial_query.as_deref() else {
            return Ok(PartialExecutionOpts::full(document));
        };

        let query = parse_document(partial_query)?;
        let link_selections = metadata
            .link_selections
            .iter()
            .flatten()
            .map(|(coordinates, selection_set)| -> Result<_, StrategyError> {
                Ok((coordinates.clone(), parse_selection_set(selection_set)?))
            })
            .collect::<Result<_, StrategyError>>()?;

        Ok(PartialExecutionOpts {
            query: Some(query),
            known_entities: metadata.known_entities,
            link_selections,
            cached_result: Some(cached),
        })
    }

    async fn invalidate_entities(&self, entities: &[EntityRecord]) -> Result<(), StrategyError> {
        let keys = entity_keys_to_invalidate(&self.store, entities).await?;

        let mut members = SetMembers::new(&self.store);
        let mut entity_keys_by_operation: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for key in &keys {
            for cache_key in members.get(key).await? {
                entity_keys_by_operation
                    .entry(cache_key.clone())
                    .or_default()
                    .insert(key.clone());
            }
        }

        tracing::debug!(
            "invalidating {} entities touching {} cached responses",
            keys.len(),
            entity_keys_by_operation.len()
        );

        // a failing response does not keep the others from being re-planned
        join_all(
            entity_keys_by_operation
                .iter()
                .map(|(cache_key, entity_keys)| async move {
                    if let Err(err) = self.invalidate_operation(cache_key, entity_keys).await {
                        tracing::error!("could not invalidate the cached response {cache_key}, skipping it: {err}");
                    }
                }),
        )
        .await;

        Ok(())
    }

    async fn store_execution_result(&self, request: StoreRequest<'_>) -> Result<(), StrategyError> {
        let StoreRequest {
            cache_key,
            result,
            collected_entities,
            ttl,
            entity_ttls,
            original_document,
        } = request;

        let mut result = result.clone();
        result.set_cache_metadata(&CacheMetadata {
            original_document: Some(original_document.to_string()),
            known_entities: KnownEntities::from_collected(collected_entities),
            ..Default::default()
        })?;

        let mut ttl = ttl;
        let mut entity_keys = IndexSet::new();
        for collected in collected_entities {
            if let Some(entity_ttl) = entity_ttls.get(&collected.entity.typename) {
                ttl = ttl.min(*entity_ttl);
            }
            entity_keys.insert(entity_key(&collected.entity));
        }
        let ttl = ttl_ms(ttl);

        let mut pipeline = self.store.pipeline();
        for key in entity_keys {
            pipeline.add_members_to_set(key, vec![(cache_key.to_string(), ttl)]);
        }
        pipeline.set(cache_key, serde_json::to_vec(&result)?.into(), ttl);
        pipeline.execute().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use recache_runtime_local::InMemoryStore;
    use serde_json::json;

    use super::*;
    use crate::result::ExecutionResponse;

    const DOCUMENT: &str = "query D { a { id v __entityCacheTypeName: __typename __entityCacheId: id } b { id v __entityCacheTypeName: __typename __entityCacheId: id } }";

    #[tokio::test]
    async fn successive_invalidations_accumulate() {
        let strategy = EagerStrategy::new(
            Store::new(InMemoryStore::new()),
            Duration::from_secs(60),
            CacheResolvers::new(),
        );
        let document = parse_document(DOCUMENT).unwrap();
        let result = ExecutionResponse::from_data(json!({
            "a": {"id": "1", "v": "x", "__entityCacheTypeName": "A", "__entityCacheId": "1"},
            "b": {"id": "2", "v": "y", "__entityCacheTypeName": "B", "__entityCacheId": "2"}
        }));
        let collected = collect_entity_records(result.data.as_ref().unwrap());

        strategy
            .store_execution_result(StoreRequest {
                cache_key: "key",
                result: &result,
                collected_entities: &collected,
                ttl: Duration::from_secs(60),
                entity_ttls: &BTreeMap::new(),
                original_document: &document,
            })
            .await
            .unwrap();

        strategy
            .invalidate_entities(&[EntityRecord::new("A", Some(Id::from("1")))])
            .await
            .unwrap();
        strategy
            .invalidate_entities(&[EntityRecord::new("B", Some(Id::from("2")))])
            .await
            .unwrap();

        let opts = strategy
            .partial_execution_opts("key", &document, &CacheResolvers::new())
            .await
            .unwrap();

        insta::assert_snapshot!(opts.query.unwrap(), @r###"
        query D {
          a {
            id
            v
            __entityCacheTypeName: __typename
            __entityCacheId: id
          }
          b {
            id
            v
            __entityCacheTypeName: __typename
            __entityCacheId: id
          }
        }
        "###);
        let metadata = opts.cached_result.unwrap().cache_metadata().unwrap().unwrap();
        assert_eq!(
            metadata.invalidated_entities.into_iter().collect::<Vec<_>>(),
            ["A:1", "B:2"]
        );
    }
}
