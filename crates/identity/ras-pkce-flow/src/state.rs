//! Flow state persistence between the start and callback requests.

use crate::error::{PkceFlowError, PkceFlowResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One in-flight authorization: the state token and the verifier it guards.
#[derive(Clone)]
pub struct FlowState {
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FlowState {
    /// Fails when `ttl` pushes the expiry past the representable time range.
    pub fn new(state: String, code_verifier: String, ttl: Duration) -> PkceFlowResult<Self> {
        let created_at = Utc::now();
        let expires_at = created_at.checked_add_signed(ttl).ok_or_else(|| {
            PkceFlowError::StorageError(format!("state TTL of {} is out of range", ttl))
        })?;

        Ok(Self {
            state,
            code_verifier,
            created_at,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// The verifier is a secret until the exchange; keep it out of logs.
impl std::fmt::Debug for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowState")
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Storage for in-flight flow state, keyed by the state token.
///
/// Expired entries must read as absent to [`SessionStore::get`] even if they have not been
/// purged yet. [`SessionStore::take`] must be atomic: of any number of concurrent callers
/// presenting the same state, at most one receives the entry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Associate `state` with `code_verifier` for `ttl`.
    async fn put(&self, state: &str, code_verifier: &str, ttl: Duration) -> PkceFlowResult<()>;

    /// Look up a live entry without consuming it.
    async fn get(&self, state: &str) -> PkceFlowResult<Option<FlowState>>;

    /// Invalidate an entry. Deleting an unknown state is not an error.
    async fn delete(&self, state: &str) -> PkceFlowResult<()>;

    /// Remove and return an entry in one step.
    ///
    /// An expired entry is still removed and returned; callers check
    /// [`FlowState::is_expired`] before using it.
    async fn take(&self, state: &str) -> PkceFlowResult<Option<FlowState>>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> PkceFlowResult<usize>;
}

/// Process-local [`SessionStore`].
///
/// Expired entries are swept on every `put`, so memory stays bounded by the number of
/// flows started within one TTL window.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    states: Arc<RwLock<HashMap<String, FlowState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, state: &str, code_verifier: &str, ttl: Duration) -> PkceFlowResult<()> {
        let entry = FlowState::new(state.to_string(), code_verifier.to_string(), ttl)?;

        let mut states = self.states.write().await;
        let now = Utc::now();
        states.retain(|_, existing| existing.expires_at > now);
        states.insert(entry.state.clone(), entry);
        Ok(())
    }

    async fn get(&self, state: &str) -> PkceFlowResult<Option<FlowState>> {
        let states = self.states.read().await;
        Ok(states.get(state).filter(|entry| !entry.is_expired()).cloned())
    }

    async fn delete(&self, state: &str) -> PkceFlowResult<()> {
        self.states.write().await.remove(state);
        Ok(())
    }

    async fn take(&self, state: &str) -> PkceFlowResult<Option<FlowState>> {
        let mut states = self.states.write().await;
        Ok(states.remove(state))
    }

    async fn purge_expired(&self) -> PkceFlowResult<usize> {
        let mut states = self.states.write().await;
        let before = states.len();
        let now = Utc::now();
        states.retain(|_, entry| entry.expires_at > now);
        Ok(before - states.len())
    }
}
