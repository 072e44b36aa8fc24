use std::sync::Arc;

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Invalid TTL {0}ms: must not be negative")]
    InvalidTtl(i64),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Rejects TTLs that cannot be turned into an expiry.
pub fn validate_ttl(ttl_ms: i64) -> StoreResult<()> {
    if ttl_ms < 0 {
        return Err(StoreError::InvalidTtl(ttl_ms));
    }
    Ok(())
}

/// A single write queued on a [`Pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set { key: String, value: Bytes, ttl_ms: i64 },
    Clear { keys: Vec<String> },
    AddMembers { key: String, members: Vec<(String, i64)> },
    RemoveMembers { key: String, members: Vec<String> },
}

impl Mutation {
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Mutation::Set { ttl_ms, .. } => validate_ttl(*ttl_ms),
            Mutation::AddMembers { members, .. } => members.iter().try_for_each(|(_, ttl_ms)| validate_ttl(*ttl_ms)),
            Mutation::Clear { .. } | Mutation::RemoveMembers { .. } => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct Store(Arc<dyn StoreInner>);

impl Store {
    pub fn new(inner: impl StoreInner + 'static) -> Self {
        Self(Arc::new(inner))
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            store: self.clone(),
            mutations: Vec::new(),
        }
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let bytes = self.get(key).await?;
        bytes
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl_ms: i64) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes.into(), ttl_ms).await
    }
}

impl std::ops::Deref for Store {
    type Target = dyn StoreInner;
    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

#[async_trait::async_trait]
pub trait StoreInner: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;
    async fn set(&self, key: &str, value: Bytes, ttl_ms: i64) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    async fn clear(&self, keys: &[String]) -> StoreResult<()>;
    async fn keys_starting_with(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Members expire individually, the set lives as long as its longest lived member.
    async fn add_members_to_set(&self, key: &str, members: &[(String, i64)]) -> StoreResult<()>;
    async fn remove_members_from_set(&self, key: &str, members: &[String]) -> StoreResult<()>;
    async fn get_set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Applies the mutations in order as one unit. Implementations validate every
    /// mutation before applying any of them.
    async fn execute(&self, mutations: Vec<Mutation>) -> StoreResult<()>;
}

/// Batches writes into a single round trip to the store.
pub struct Pipeline {
    store: Store,
    mutations: Vec<Mutation>,
}

impl Pipeline {
    pub fn set(&mut self, key: impl Into<String>, value: Bytes, ttl_ms: i64) -> &mut Self {
        self.mutations.push(Mutation::Set {
            key: key.into(),
            value,
            ttl_ms,
        });
        self
    }

    pub fn clear(&mut self, keys: Vec<String>) -> &mut Self {
        self.mutations.push(Mutation::Clear { keys });
        self
    }

    pub fn add_members_to_set(&mut self, key: impl Into<String>, members: Vec<(String, i64)>) -> &mut Self {
        self.mutations.push(Mutation::AddMembers {
            key: key.into(),
            members,
        });
        self
    }

    pub fn remove_members_from_set(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.mutations.push(Mutation::RemoveMembers {
            key: key.into(),
            members,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub async fn execute(self) -> StoreResult<()> {
        let Pipeline { store, mutations } = self;
        if mutations.is_empty() {
            return Ok(());
        }
        store.execute(mutations).await
    }
}
