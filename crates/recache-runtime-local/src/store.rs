use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures_util::lock::Mutex;
use recache_runtime::{Mutation, StoreError, StoreInner, StoreResult};

pub struct InMemoryStore {
    inner: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn new_with_time(now: impl Fn() -> Instant + Sync + Send + 'static) -> Self {
        InMemoryStore {
            inner: Mutex::new(StoreState {
                now: Box::new(now),
                values: HashMap::new(),
                sets: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore {
            inner: Mutex::new(StoreState {
                now: Box::new(Instant::now),
                values: HashMap::new(),
                sets: HashMap::new(),
            }),
        }
    }
}

struct StoreState {
    // for testing
    now: Box<dyn Fn() -> Instant + Sync + Send>,
    values: HashMap<String, ValueEntry>,
    sets: HashMap<String, HashMap<String, Instant>>,
}

struct ValueEntry {
    value: Bytes,
    expires_at: Instant,
}

fn expiry(now: Instant, ttl_ms: i64) -> StoreResult<Instant> {
    let millis = u64::try_from(ttl_ms).map_err(|_| StoreError::InvalidTtl(ttl_ms))?;
    now.checked_add(Duration::from_millis(millis))
        .ok_or(StoreError::InvalidTtl(ttl_ms))
}

impl StoreState {
    fn purge(&mut self, now: Instant) {
        self.values.retain(|_, entry| now < entry.expires_at);
        for members in self.sets.values_mut() {
            members.retain(|_, expires_at| now < *expires_at);
        }
        self.sets.retain(|_, members| !members.is_empty());
    }

    fn apply(&mut self, now: Instant, mutation: Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::Set { key, value, ttl_ms } => {
                let expires_at = expiry(now, ttl_ms)?;
                self.values.insert(key, ValueEntry { value, expires_at });
            }
            Mutation::Clear { keys } => {
                for key in keys {
                    self.values.remove(&key);
                    self.sets.remove(&key);
                }
            }
            Mutation::AddMembers { key, members } => {
                let expiries = members
                    .into_iter()
                    .map(|(member, ttl_ms)| Ok((member, expiry(now, ttl_ms)?)))
                    .collect::<StoreResult<Vec<_>>>()?;
                let set = self.sets.entry(key).or_default();
                for (member, expires_at) in expiries {
                    set.insert(member, expires_at);
                }
            }
            Mutation::RemoveMembers { key, members } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    for member in members {
                        set.remove(&member);
                    }
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreInner for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        Ok(inner.values.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_ms: i64) -> StoreResult<()> {
        self.execute(vec![Mutation::Set {
            key: key.to_string(),
            value,
            ttl_ms,
        }])
        .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        Ok(inner.values.contains_key(key) || inner.sets.contains_key(key))
    }

    async fn clear(&self, keys: &[String]) -> StoreResult<()> {
        self.execute(vec![Mutation::Clear { keys: keys.to_vec() }]).await
    }

    async fn keys_starting_with(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        let mut keys = inner
            .values
            .keys()
            .chain(inner.sets.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn add_members_to_set(&self, key: &str, members: &[(String, i64)]) -> StoreResult<()> {
        self.execute(vec![Mutation::AddMembers {
            key: key.to_string(),
            members: members.to_vec(),
        }])
        .await
    }

    async fn remove_members_from_set(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.execute(vec![Mutation::RemoveMembers {
            key: key.to_string(),
            members: members.to_vec(),
        }])
        .await
    }

    async fn get_set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        let mut members = inner
            .sets
            .get(key)
            .map(|set| set.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn execute(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        mutations.iter().try_for_each(Mutation::validate)?;

        let mut inner = self.inner.lock().await;
        let now = (inner.now)();
        inner.purge(now);
        for mutation in mutations {
            inner.apply(now, mutation)?;
        }
        Ok(())
    }
}
