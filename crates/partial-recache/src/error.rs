use recache_runtime::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("could not parse document: {0}")]
    Parse(String),
    #[error("unknown fragment `{0}`")]
    UnknownFragment(String),
    #[error("fragment `{0}` spreads itself")]
    FragmentCycle(String),
    #[error("the alias `{0}` uses a prefix reserved for cache resolutions")]
    ReservedAlias(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("no selection aliased as the entity id under `{0}`, cannot replace it with a link")]
    MissingIdSelection(String),
    #[error("an entity was observed at an empty path")]
    EmptyPath,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("malformed entity reference `{0}`")]
    MalformedReference(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError<E> {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("execution failed: {0}")]
    Execution(E),
}
