use recache_runtime::Store;

use super::{
    entity_keys_to_invalidate, load_cached_response, ttl_ms, InvalidationStrategy, PartialExecutionOpts, SetMembers,
    StoreRequest,
};
use crate::{
    document::Document,
    entity::{EntityCacheResult, EntityRecord, KnownEntities},
    error::StrategyError,
    keys::{entity_key, entity_reference_key, lazy_operation_key, parse_entity_key, parse_entity_reference_key},
    rewrite::{partial_recache_query, LinkSelections},
    tree::{CacheResolvers, EntityTree},
};

/// Only drops bookkeeping on invalidation. The partial query is computed when
/// a response is read: an entity it references is stale once the response's
/// key is no longer among the members of the entity's set.
pub struct LazyStrategy {
    store: Store,
}

impl LazyStrategy {
    pub fn new(store: Store) -> Self {
        LazyStrategy { store }
    }

    /// `None` when there is nothing to plan with and the response must be
    /// fetched in full.
    async fn plan(
        &self,
        cache_key: &str,
        document: &Document,
        resolvers: &CacheResolvers,
    ) -> Result<Option<PartialExecutionOpts>, StrategyError> {
        let mut members = SetMembers::new(&self.store);

        let references = members
            .get(&lazy_operation_key(cache_key))
            .await?
            .iter()
            .filter_map(|key| match parse_entity_reference_key(key) {
                Ok(reference) => Some(reference),
                Err(err) => {
                    tracing::warn!("skipping an entity reference of {cache_key}: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        if references.is_empty() {
            return Ok(None);
        }

        let mut known_entities = KnownEntities::default();
        let mut observations = Vec::with_capacity(references.len());
        for reference in references {
            let referenced = members.get(&reference.entity_key).await?;
            let invalidated = !referenced.iter().any(|operation| operation == cache_key);

            let entity = parse_entity_key(&reference.entity_key);
            if let Some(id) = &entity.id {
                known_entities.insert(&entity.typename, id.clone());
            }

            observations.push(EntityCacheResult {
                entity,
                path: reference.path,
                invalidated,
            });
        }

        let tree = EntityTree::from_observations(&observations, resolvers)?;
        let (query, link_selections) = match partial_recache_query(document, &tree)? {
            Some(partial) => (Some(partial.query), partial.link_selections),
            None => (None, LinkSelections::new()),
        };

        Ok(Some(PartialExecutionOpts {
            query,
            known_entities,
            link_selections,
            cached_result: None,
        }))
    }
}

#[async_trait::async_trait]
impl InvalidationStrategy for LazyStrategy {
    async fn partial_execution_opts(
        &self,
        cache_key: &str,
        document: &Document,
        resolvers: &CacheResolvers,
    ) -> Result<PartialExecutionOpts, StrategyError> {
        let Some(cached) = load_cached_response(&self.store, cache_key).await? else {
            return Ok(PartialExecutionOpts::full(document));
        };

        match self.plan(cache_key, document, resolvers).await {
            Ok(Some(opts)) => Ok(PartialExecutionOpts {
                cached_result: Some(cached),
                ..opts
            }),
            Ok(None) => Ok(PartialExecutionOpts::full(document)),
            Err(err) => {
                tracing::error!("could not plan a partial query for {cache_key}, falling back to uncached execution: {err}");
                Ok(PartialExecutionOpts::full(document))
            }
        }
    }

    async fn invalidate_entities(&self, entities: &[EntityRecord]) -> Result<(), StrategyError> {
        let keys = entity_keys_to_invalidate(&self.store, entities).await?;
        if keys.is_empty() {
            return Ok(());
        }

        tracing::debug!("dropping the response sets of {} entities", keys.len());
        self.store.clear(&keys.into_iter().collect::<Vec<_>>()).await?;

        Ok(())
    }

    async fn store_execution_result(&self, request: StoreRequest<'_>) -> Result<(), StrategyError> {
        let StoreRequest {
            cache_key,
            result,
            collected_entities,
            ttl,
            entity_ttls,
            ..
        } = request;

        let ttl = ttl_ms(ttl);
        let operation_key = lazy_operation_key(cache_key);
        let mut pipeline = self.store.pipeline();

        let mut references = Vec::with_capacity(collected_entities.len());
        for collected in collected_entities {
            let key = entity_key(&collected.entity);
            let entity_ttl = entity_ttls
                .get(&collected.entity.typename)
                .map_or(ttl, |entity_ttl| ttl_ms(*entity_ttl));

            references.push((entity_reference_key(&key, &collected.path), ttl));
            pipeline.add_members_to_set(key, vec![(cache_key.to_string(), entity_ttl)]);
        }

        pipeline
            .clear(vec![operation_key.clone()])
            .add_members_to_set(operation_key, references)
            .set(cache_key, serde_json::to_vec(result)?.into(), ttl);
        pipeline.execute().await?;

        Ok(())
    }
}
