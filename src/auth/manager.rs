//! Sign-in, refresh rotation and logout.

use crate::auth::{
    codec::TokenCodec,
    config::{AuthConfig, RotationPolicy},
    error::AuthError,
    guard::parse_bearer,
    identity::Identity,
    password::{hash_password, verify_password},
    store::SessionStore,
    users::{normalize_email, valid_email, IdentityStore},
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("issuegate-unknown-account").ok());

/// Credentials handed to a client after sign-in or rotation.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

pub struct SessionManager {
    codec: TokenCodec,
    store: SessionStore,
    identities: Arc<dyn IdentityStore>,
    config: AuthConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        codec: TokenCodec,
        store: SessionStore,
        identities: Arc<dyn IdentityStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            codec,
            store,
            identities,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Check credentials and open a new session.
    ///
    /// Unknown emails and wrong passwords are indistinguishable to the caller.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] on mismatch, [`AuthError::Internal`] if
    /// the identity store, codec or session store fails.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidCredentials);
        }

        let record = self
            .identities
            .find_by_email(&email)
            .await
            .map_err(|err| AuthError::Internal(format!("identity lookup failed: {err:#}")))?;

        // Unknown emails still pay for a hash check against a stand-in hash.
        let stored_hash = record.as_ref().map(|record| record.password_hash.clone());
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || {
            let hash = stored_hash
                .as_deref()
                .or(DUMMY_HASH.as_deref())
                .unwrap_or_default();
            verify_password(hash, &password)
        })
        .await
        .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))?;

        let record = match record {
            Some(record) if verified => record,
            Some(_) => {
                debug!("password mismatch");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                debug!("unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let session = self.issue_session(&record.identity).await?;
        info!(username = %record.identity.username, "signed in");
        Ok(session)
    }

    /// Mint an access/refresh pair and record the refresh session.
    ///
    /// Nothing is returned unless the record was stored.
    ///
    /// # Errors
    /// [`AuthError::Internal`] if signing or the store write fails.
    #[instrument(skip(self, identity), fields(username = %identity.username))]
    pub async fn issue_session(&self, identity: &Identity) -> Result<IssuedSession, AuthError> {
        let access_token = self.codec.issue_access(identity)?;
        let refresh = self.codec.issue_refresh(identity)?;
        self.store
            .put(&identity.username, refresh.session_id, &refresh.token)
            .await?;
        Ok(IssuedSession {
            access_token,
            refresh_token: refresh.token,
            session_id: refresh.session_id,
        })
    }

    /// Exchange a live refresh token for a new pair.
    ///
    /// Under [`RotationPolicy::Revoke`] the presented session is deleted before
    /// the new one is stored, so each refresh token rotates at most once.
    ///
    /// # Errors
    /// Codec failures map to their [`AuthError`] counterpart. A missing or
    /// mismatched session record is [`AuthError::SessionRevoked`].
    #[instrument(skip_all)]
    pub async fn rotate_session(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        let presented = self.codec.verify_refresh(refresh_token)?;
        let username = &presented.identity.username;

        let stored = self.store.get(username, presented.session_id).await?;
        if stored != refresh_token {
            return Err(AuthError::SessionRevoked);
        }

        // Claim the predecessor before minting so a replayed token loses the race.
        if self.config.rotation_policy() == RotationPolicy::Revoke {
            self.store.take(username, presented.session_id).await?;
        }
        let next = self.issue_session(&presented.identity).await?;
        debug!(
            username = %username,
            from = %presented.session_id,
            to = %next.session_id,
            "rotated session"
        );
        Ok(next)
    }

    /// Delete the session behind a refresh token.
    ///
    /// Tokens that fail verification have no session to delete and succeed.
    ///
    /// # Errors
    /// [`AuthError::Internal`] if the store delete fails.
    #[instrument(skip_all)]
    pub async fn end_session(&self, refresh_token: &str) -> Result<(), AuthError> {
        let Ok(presented) = self.codec.verify_refresh(refresh_token) else {
            debug!("logout with unverifiable refresh token");
            return Ok(());
        };
        self.store
            .delete(&presented.identity.username, presented.session_id)
            .await?;
        Ok(())
    }

    /// Delete every session held by `identity`, returning how many were removed.
    ///
    /// # Errors
    /// [`AuthError::Internal`] if the store fails.
    #[instrument(skip(self, identity), fields(username = %identity.username))]
    pub async fn end_all_sessions(&self, identity: &Identity) -> Result<usize, AuthError> {
        let removed = self.store.revoke_all(&identity.username).await?;
        info!(removed, "ended all sessions");
        Ok(removed)
    }

    /// Resolve an `Authorization` header value into the identity it carries.
    ///
    /// Access tokens are verified statelessly; the session store is not consulted.
    ///
    /// # Errors
    /// [`AuthError::MissingHeader`], [`AuthError::MalformedHeader`], or the
    /// codec failure.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let header = authorization.ok_or(AuthError::MissingHeader)?;
        let token = parse_bearer(header)?;
        Ok(self.codec.verify_access(token)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{
        backend::{BackendFuture, KeyValueBackend, MemoryBackend},
        store::tests::StalledBackend,
        users::MemoryIdentityStore,
    };
    use std::time::Duration;

    /// Memory backend whose writes yield for a few milliseconds.
    struct SlowWrites(MemoryBackend);

    impl KeyValueBackend for SlowWrites {
        fn put_capped<'a>(
            &'a self,
            group: &'a str,
            key: &'a str,
            value: &'a str,
            ttl: Duration,
            cap: usize,
        ) -> BackendFuture<'a, usize> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.0.put_capped(group, key, value, ttl, cap).await
            })
        }

        fn get<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, Option<String>> {
            self.0.get(group, key)
        }

        fn delete<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, bool> {
            self.0.delete(group, key)
        }

        fn delete_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
            self.0.delete_group(group)
        }

        fn count_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
            self.0.count_group(group)
        }

        fn ping(&self) -> BackendFuture<'_, ()> {
            self.0.ping()
        }
    }

    pub(crate) const ACCESS_SECRET: &[u8] = b"access-secret-access-secret-0123";
    pub(crate) const REFRESH_SECRET: &[u8] = b"refresh-secret-refresh-secret-01";

    pub(crate) fn manager_with(
        config: AuthConfig,
        backend: Arc<dyn KeyValueBackend>,
    ) -> SessionManager {
        let codec = TokenCodec::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            config.access_ttl_seconds(),
            config.refresh_ttl_seconds(),
        )
        .unwrap();
        let identities = MemoryIdentityStore::new()
            .with_user("alice@example.com", Identity::new("alice", 1), "wonderland")
            .unwrap();
        let store = SessionStore::new(backend, &config);
        SessionManager::new(codec, store, Arc::new(identities), config)
    }

    fn manager(config: AuthConfig) -> SessionManager {
        manager_with(config, Arc::new(MemoryBackend::new()))
    }

    fn alice() -> Identity {
        Identity::new("alice", 1)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn sign_in_issues_verifiable_pair() {
        let manager = manager(AuthConfig::new());
        let session = manager
            .sign_in(" Alice@Example.com ", "wonderland")
            .await
            .unwrap();
        let header = bearer(&session.access_token);
        assert_eq!(manager.authenticate(Some(&header)).unwrap(), alice());
        assert_eq!(manager.store().count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sign_in_rejects_bad_credentials_uniformly() {
        let manager = manager(AuthConfig::new());
        for (email, password) in [
            ("alice@example.com", "looking-glass"),
            ("mallory@example.com", "wonderland"),
            ("not-an-email", "wonderland"),
        ] {
            assert!(matches!(
                manager.sign_in(email, password).await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert_eq!(manager.store().count("alice").await.unwrap(), 0);
    }

    #[test]
    fn stand_in_hash_is_argon2() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!verify_password(hash, "wonderland"));
    }

    #[tokio::test]
    async fn unknown_email_is_rejected_after_hash_check() {
        let manager = manager(AuthConfig::new());
        assert!(matches!(
            manager.sign_in("mallory@example.com", "issuegate-unknown-account").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn logout_revokes_refresh_but_not_access() {
        let manager = manager(AuthConfig::new());
        let session = manager.issue_session(&alice()).await.unwrap();

        manager.end_session(&session.refresh_token).await.unwrap();

        assert!(matches!(
            manager.rotate_session(&session.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
        let header = bearer(&session.access_token);
        assert_eq!(manager.authenticate(Some(&header)).unwrap(), alice());
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_tolerates_garbage() {
        let manager = manager(AuthConfig::new());
        let session = manager.issue_session(&alice()).await.unwrap();
        manager.end_session(&session.refresh_token).await.unwrap();
        manager.end_session(&session.refresh_token).await.unwrap();
        manager.end_session("not.a.token").await.unwrap();
        manager.end_session("").await.unwrap();
    }

    #[tokio::test]
    async fn retained_rotation_adds_a_session() {
        let manager = manager(AuthConfig::new());
        let first = manager.issue_session(&alice()).await.unwrap();

        let second = manager.rotate_session(&first.refresh_token).await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(manager.store().count("alice").await.unwrap(), 2);
        // Predecessor stays usable under the retain policy.
        manager.rotate_session(&first.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn repeated_retained_rotation_is_additive() {
        let manager = manager(AuthConfig::new().with_max_sessions(10));
        let mut chain = vec![manager.issue_session(&alice()).await.unwrap()];
        for _ in 0..3 {
            let latest = chain.last().unwrap().refresh_token.clone();
            chain.push(manager.rotate_session(&latest).await.unwrap());
        }
        assert_eq!(manager.store().count("alice").await.unwrap(), 4);

        for predecessor in &chain[..3] {
            manager.rotate_session(&predecessor.refresh_token).await.unwrap();
        }
        assert_eq!(manager.store().count("alice").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn concurrent_revoking_rotation_succeeds_once() {
        let config = AuthConfig::new().with_rotation_policy(RotationPolicy::Revoke);
        let manager = manager_with(config, Arc::new(SlowWrites(MemoryBackend::new())));
        let first = manager.issue_session(&alice()).await.unwrap();

        let (a, b) = tokio::join!(
            manager.rotate_session(&first.refresh_token),
            manager.rotate_session(&first.refresh_token)
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(AuthError::SessionRevoked))));
        assert_eq!(manager.store().count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn revoking_rotation_replaces_the_session() {
        let manager = manager(AuthConfig::new().with_rotation_policy(RotationPolicy::Revoke));
        let first = manager.issue_session(&alice()).await.unwrap();

        let second = manager.rotate_session(&first.refresh_token).await.unwrap();

        assert_eq!(manager.store().count("alice").await.unwrap(), 1);
        assert!(matches!(
            manager.rotate_session(&first.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
        manager.rotate_session(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn rotation_rejects_access_tokens() {
        let manager = manager(AuthConfig::new());
        let session = manager.issue_session(&alice()).await.unwrap();
        assert!(matches!(
            manager.rotate_session(&session.access_token).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn cap_evicts_all_prior_sessions() {
        let manager = manager(AuthConfig::new().with_max_sessions(3));
        let mut sessions = Vec::new();
        for _ in 0..3 {
            sessions.push(manager.issue_session(&alice()).await.unwrap());
        }
        let fourth = manager.issue_session(&alice()).await.unwrap();

        assert_eq!(manager.store().count("alice").await.unwrap(), 1);
        for session in sessions {
            assert!(matches!(
                manager.rotate_session(&session.refresh_token).await,
                Err(AuthError::SessionRevoked)
            ));
        }
        manager.rotate_session(&fourth.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn end_all_sessions_clears_principal() {
        let manager = manager(AuthConfig::new());
        let first = manager.issue_session(&alice()).await.unwrap();
        manager.issue_session(&alice()).await.unwrap();

        assert_eq!(manager.end_all_sessions(&alice()).await.unwrap(), 2);
        assert!(matches!(
            manager.rotate_session(&first.refresh_token).await,
            Err(AuthError::SessionRevoked)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn backend_outage_is_internal_and_keeps_access_working() {
        let config = AuthConfig::new().with_store_timeout(Duration::from_millis(20));
        let manager = manager_with(config, Arc::new(StalledBackend));

        assert!(matches!(
            manager.issue_session(&alice()).await,
            Err(AuthError::Internal(_))
        ));

        let access = manager.codec().issue_access(&alice()).unwrap();
        let header = bearer(&access);
        assert_eq!(manager.authenticate(Some(&header)).unwrap(), alice());
    }

    #[test]
    fn authenticate_requires_bearer_header() {
        let manager = manager(AuthConfig::new());
        assert!(matches!(
            manager.authenticate(None),
            Err(AuthError::MissingHeader)
        ));
        assert!(matches!(
            manager.authenticate(Some("Basic abc")),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            manager.authenticate(Some("Bearer abc")),
            Err(AuthError::MalformedClaims)
        ));
    }
}
