//! State/verifier storage
//!
//! Associates an issued `state` with its PKCE verifier across the provider
//! redirect. The default store keeps pending authorizations in a bounded,
//! expiring in-process cache; deployments with several instances plug in
//! their own [`StateStore`].

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::Result;
use crate::config::StoreConfig;
use crate::error::Error;

/// A pending authorization, keyed by `state`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVerifier {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

impl StateVerifier {
    pub fn new(state: impl Into<String>, verifier: Option<String>) -> Self {
        Self {
            state: state.into(),
            verifier,
        }
    }
}

/// Storage interface for pending authorizations
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save a record; a later save for the same state replaces it
    async fn save_state(&self, record: StateVerifier) -> Result<()>;

    /// Look up a record, failing with [`Error::StateNotFound`] if absent
    async fn get_state(&self, state: &str) -> Result<StateVerifier>;

    /// Forget a record once its callback has been accepted
    async fn remove_state(&self, state: &str) -> Result<()>;
}

/// In-process store with TTL expiry and bounded capacity
#[derive(Clone)]
pub struct InMemoryStateStore {
    entries: Cache<String, Option<String>>,
}

impl InMemoryStateStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_limits(config.ttl(), config.max_entries)
    }

    pub fn with_limits(ttl: Duration, max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_state(&self, record: StateVerifier) -> Result<()> {
        self.entries.insert(record.state, record.verifier).await;
        Ok(())
    }

    async fn get_state(&self, state: &str) -> Result<StateVerifier> {
        match self.entries.get(state).await {
            Some(verifier) => Ok(StateVerifier::new(state, verifier)),
            None => Err(Error::StateNotFound(truncate_state(state))),
        }
    }

    async fn remove_state(&self, state: &str) -> Result<()> {
        self.entries.invalidate(state).await;
        Ok(())
    }
}

/// Shorten a state token for logs and error messages
pub(crate) fn truncate_state(state: &str) -> String {
    state.chars().take(12).collect()
}
