use std::{collections::BTreeMap, time::Duration};

use recache_config::{PartialCacheConfig, StrategyKind};
use recache_runtime::Store;
use serde_json::Value;

use crate::{
    document::{augment_document, check_alias_conventions, parse_document},
    entity::EntityRecord,
    error::{RunnerError, StrategyError},
    execution::{layered_execute, ExecutionRequest, Executor},
    format::{ExecutionSummary, ResultFormatter},
    keys::response_cache_key,
    processor::ResultProcessor,
    result::ExecutionResponse,
    strategy::{EagerStrategy, InvalidationStrategy, LazyStrategy, PartialExecutionOpts},
    tree::CacheResolvers,
};

pub struct CacheRequest<'a> {
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: &'a Value,
    /// Scopes cached responses, e.g. to a user.
    pub session: Option<&'a str>,
    /// Replaces the key derived from the request.
    pub cache_key: Option<String>,
}

impl<'a> CacheRequest<'a> {
    pub fn new(query: &'a str, variables: &'a Value) -> Self {
        CacheRequest {
            query,
            operation_name: None,
            variables,
            session: None,
            cache_key: None,
        }
    }
}

pub struct PartialCache {
    config: PartialCacheConfig,
    resolvers: CacheResolvers,
    entity_ttls: BTreeMap<String, Duration>,
    strategy: Box<dyn InvalidationStrategy>,
}

impl PartialCache {
    pub fn new(config: PartialCacheConfig, store: Store) -> Self {
        let strategy: Box<dyn InvalidationStrategy> = match config.strategy {
            StrategyKind::Eager => Box::new(EagerStrategy::new(store, config.ttl(), config.resolvers())),
            StrategyKind::Lazy => Box::new(LazyStrategy::new(store)),
        };
        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(config: PartialCacheConfig, strategy: Box<dyn InvalidationStrategy>) -> Self {
        PartialCache {
            resolvers: config.resolvers(),
            entity_ttls: config.entity_ttls(),
            config,
            strategy,
        }
    }

    pub async fn invalidate_entities(&self, entities: &[EntityRecord]) -> Result<(), StrategyError> {
        self.strategy.invalidate_entities(entities).await
    }

    /// Answers a request from the cache, executing only what is stale.
    pub async fn execute<E: Executor + ?Sized>(
        &self,
        executor: &E,
        request: CacheRequest<'_>,
    ) -> Result<ExecutionResponse, RunnerError<E::Error>> {
        let document = parse_document(request.query)?;

        if !self.config.enabled || document.is_introspection() {
            return executor
                .execute(ExecutionRequest {
                    document: &document,
                    operation_name: request.operation_name,
                })
                .await
                .map_err(RunnerError::Execution);
        }

        check_alias_conventions(&document)?;
        let document = augment_document(&document, &self.config.id_fields);

        let cache_key = request.cache_key.unwrap_or_else(|| {
            response_cache_key(
                &document.to_string(),
                request.operation_name,
                request.variables,
                request.session,
            )
        });

        let PartialExecutionOpts {
            query,
            known_entities,
            link_selections,
            cached_result,
        } = match self
            .strategy
            .partial_execution_opts(&cache_key, &document, &self.resolvers)
            .await
        {
            Ok(opts) => opts,
            Err(err) => {
                tracing::error!("could not read the cache for {cache_key}, falling back to uncached execution: {err}");
                PartialExecutionOpts::full(&document)
            }
        };

        let execution = layered_execute(
            executor,
            query.as_ref(),
            request.operation_name,
            &link_selections,
            known_entities,
            &self.resolvers,
        )
        .await
        .map_err(RunnerError::Execution)?;

        let hit = execution.results.is_empty();
        if hit {
            tracing::debug!("Cache HIT - {cache_key}");
        } else {
            tracing::debug!("Cache MISS - {cache_key} - {} rounds", execution.results.len());
        }

        let processor = ResultProcessor {
            strategy: self.strategy.as_ref(),
            ttl: self.config.ttl(),
            entity_ttls: &self.entity_ttls,
        };
        let processed = processor
            .process(&cache_key, &document, cached_result.as_ref(), execution.results)
            .await;

        let formatter = ResultFormatter {
            include_extension_metadata: self.config.include_extension_metadata,
            ttl: self.config.ttl(),
        };

        Ok(formatter.format(
            processed.result,
            ExecutionSummary {
                cache_key: &cache_key,
                hit,
                collected_entities: &processed.collected_entities,
                link_queries: &execution.link_queries,
                partial_query: query.as_ref(),
            },
        ))
    }
}
