//! Server-side record of live refresh sessions.
//!
//! One record per refresh token, grouped by username. Writes enforce the
//! per-principal cap with an evict-all policy: a principal that already holds
//! `max_sessions` live records loses all of them before the new one is written,
//! so no more than `max_sessions` records ever coexist.

use crate::auth::{
    backend::{BackendError, KeyValueBackend},
    config::AuthConfig,
};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueBackend>,
    ttl: Duration,
    max_sessions: usize,
    timeout: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .field("max_sessions", &self.max_sessions)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: &AuthConfig) -> Self {
        Self {
            backend,
            ttl: config.refresh_ttl(),
            max_sessions: config.max_sessions(),
            timeout: config.store_timeout(),
        }
    }

    /// Record a session, evicting all of the principal's sessions first if the
    /// cap is already reached.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend fails or times out.
    #[instrument(skip(self, token))]
    pub async fn put(
        &self,
        username: &str,
        session_id: Uuid,
        token: &str,
    ) -> Result<(), StoreError> {
        let key = session_id.to_string();
        let evicted = self
            .bounded(
                self.backend
                    .put_capped(username, &key, token, self.ttl, self.max_sessions),
            )
            .await?;
        if evicted > 0 {
            debug!(evicted, "session cap reached, evicted prior sessions");
        }
        Ok(())
    }

    /// Fetch the stored refresh token for a session.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when the record is absent or expired.
    #[instrument(skip(self))]
    pub async fn get(&self, username: &str, session_id: Uuid) -> Result<String, StoreError> {
        let key = session_id.to_string();
        self.bounded(self.backend.get(username, &key))
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Delete a session record. Deleting a missing record is not an error.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend fails or times out.
    #[instrument(skip(self))]
    pub async fn delete(&self, username: &str, session_id: Uuid) -> Result<(), StoreError> {
        let key = session_id.to_string();
        let removed = self.bounded(self.backend.delete(username, &key)).await?;
        if !removed {
            debug!("session already absent");
        }
        Ok(())
    }

    /// Delete a session, failing with [`StoreError::NotFound`] if another caller
    /// removed it first. At most one concurrent caller succeeds per session.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the record was already gone, or the backend error.
    pub async fn take(&self, username: &str, session_id: Uuid) -> Result<(), StoreError> {
        let key = session_id.to_string();
        if self.bounded(self.backend.delete(username, &key)).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Delete every session held by `username`.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend fails or times out.
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, username: &str) -> Result<usize, StoreError> {
        Ok(self.bounded(self.backend.delete_group(username)).await?)
    }

    /// Number of live sessions held by `username`.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend fails or times out.
    pub async fn count(&self, username: &str) -> Result<usize, StoreError> {
        Ok(self.bounded(self.backend.count_group(username)).await?)
    }

    /// Check the backend answers within the store deadline.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the backend fails or times out.
    pub async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.bounded(self.backend.ping()).await?)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }
}
