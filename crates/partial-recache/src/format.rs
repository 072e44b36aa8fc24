use std::time::Duration;

use chrono::Utc;

use crate::{
    document::Document,
    entity::{CollectedEntity, KnownEntities},
    result::{CacheMetadata, ExecutionResponse},
};

/// How a response came to be.
pub struct ExecutionSummary<'a> {
    pub cache_key: &'a str,
    pub hit: bool,
    pub collected_entities: &'a [CollectedEntity],
    pub link_queries: &'a [Document],
    pub partial_query: Option<&'a Document>,
}

pub struct ResultFormatter {
    pub include_extension_metadata: bool,
    pub ttl: Duration,
}

impl ResultFormatter {
    pub fn format(&self, mut result: ExecutionResponse, summary: ExecutionSummary<'_>) -> ExecutionResponse {
        if !self.include_extension_metadata {
            return result;
        }

        let expires = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        let metadata = CacheMetadata {
            cache_key: Some(summary.cache_key.to_string()),
            expires,
            hit: Some(summary.hit),
            known_entities: KnownEntities::from_collected(summary.collected_entities),
            link_queries: Some(summary.link_queries.iter().map(ToString::to_string).collect()),
            partial_query: summary.partial_query.map(ToString::to_string),
            ..Default::default()
        };

        if let Err(err) = result.set_cache_metadata(&metadata) {
            tracing::error!("could not attach the cache metadata to {}: {err}", summary.cache_key);
        }

        result
    }
}
