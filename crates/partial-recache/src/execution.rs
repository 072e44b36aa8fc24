//! Running a partial query and the follow-up queries resolving its links.

use crate::{
    document::Document,
    entity::KnownEntities,
    links::{build_link_query, link_query_name, LinkCollector},
    result::ExecutionResponse,
    rewrite::LinkSelections,
    tree::CacheResolvers,
};

pub struct ExecutionRequest<'a> {
    pub document: &'a Document,
    pub operation_name: Option<&'a str>,
}

/// Runs documents against the schema. Variables and request context are bound
/// by the implementation.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, request: ExecutionRequest<'_>) -> Result<ExecutionResponse, Self::Error>;
}

#[derive(Debug, Default)]
pub struct LayeredExecution {
    /// The result of the partial query followed by one result per link query.
    pub results: Vec<ExecutionResponse>,
    pub link_queries: Vec<Document>,
}

/// Executes `partial_query`, then keeps resolving the links each result reveals
/// until there are none left. Nothing is executed without a partial query.
pub async fn layered_execute<E: Executor + ?Sized>(
    executor: &E,
    partial_query: Option<&Document>,
    operation_name: Option<&str>,
    link_selections: &LinkSelections,
    known_entities: KnownEntities,
    resolvers: &CacheResolvers,
) -> Result<LayeredExecution, E::Error> {
    let mut execution = LayeredExecution::default();
    let Some(partial_query) = partial_query else {
        return Ok(execution);
    };

    let mut result = executor
        .execute(ExecutionRequest {
            document: partial_query,
            operation_name,
        })
        .await?;

    if result.data.is_none() || link_selections.is_empty() {
        execution.results.push(result);
        return Ok(execution);
    }

    let mut collector = LinkCollector::new(link_selections, known_entities);
    let link_operation_name = link_query_name(operation_name);

    loop {
        let links = result.data.as_ref().map(|data| collector.collect(data)).unwrap_or_default();
        execution.results.push(result);

        let Some(link_query) = build_link_query(&links, resolvers, operation_name) else {
            break;
        };

        result = executor
            .execute(ExecutionRequest {
                document: &link_query,
                operation_name: Some(&link_operation_name),
            })
            .await?;
        execution.link_queries.push(link_query);
    }

    Ok(execution)
}
