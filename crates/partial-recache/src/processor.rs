use std::{collections::BTreeMap, time::Duration};

use serde_json::Map;

use crate::{
    collect::collect_entity_records,
    document::Document,
    entity::CollectedEntity,
    merge::{merge_result_data, strip_entity_aliases},
    result::ExecutionResponse,
    strategy::{InvalidationStrategy, StoreRequest},
};

/// Folds every result into the cached data. Errors are concatenated, the
/// extensions are the ones of the first result.
pub fn merge_results(cached: Option<&ExecutionResponse>, results: Vec<ExecutionResponse>) -> ExecutionResponse {
    let mut data = cached.and_then(|cached| cached.data.clone()).unwrap_or_else(Map::new);
    let mut errors = Vec::new();
    let mut extensions = None;

    for result in results {
        if let Some(next) = result.data {
            merge_result_data(&mut data, next);
        }
        errors.extend(result.errors);
        if extensions.is_none() {
            extensions = Some(result.extensions);
        }
    }

    ExecutionResponse {
        data: Some(data),
        errors,
        extensions: extensions.unwrap_or_default(),
    }
}

pub struct ProcessedResult {
    /// The response for the client, without entity aliases.
    pub result: ExecutionResponse,
    pub collected_entities: Vec<CollectedEntity>,
}

/// Merges results, stores what was executed and prepares the response.
pub struct ResultProcessor<'a> {
    pub strategy: &'a dyn InvalidationStrategy,
    pub ttl: Duration,
    pub entity_ttls: &'a BTreeMap<String, Duration>,
}

impl ResultProcessor<'_> {
    pub async fn process(
        &self,
        cache_key: &str,
        original_document: &Document,
        cached: Option<&ExecutionResponse>,
        results: Vec<ExecutionResponse>,
    ) -> ProcessedResult {
        let executed = !results.is_empty();
        let mut result = merge_results(cached, results);
        let mut collected_entities = Vec::new();

        if !result.errors.is_empty() {
            tracing::debug!("not caching {cache_key}, the response carries errors");
        } else if let Some(data) = &result.data {
            collected_entities = collect_entity_records(data);

            // an unchanged cached response stays as it was stored
            if executed {
                let request = StoreRequest {
                    cache_key,
                    result: &result,
                    collected_entities: &collected_entities,
                    ttl: self.ttl,
                    entity_ttls: self.entity_ttls,
                    original_document,
                };
                if let Err(err) = self.strategy.store_execution_result(request).await {
                    tracing::error!("could not store the response {cache_key}, it might not be cached: {err}");
                }
            }
        }

        if let Some(data) = result.data.as_mut() {
            data.values_mut().for_each(strip_entity_aliases);
        }

        ProcessedResult {
            result,
            collected_entities,
        }
    }
}
