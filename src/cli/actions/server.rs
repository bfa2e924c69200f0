use crate::{
    api,
    auth::{
        backend::{KeyValueBackend, MemoryBackend, RedisBackend},
        codec::TokenCodec,
        store::SessionStore,
        users::PgIdentityStore,
        AuthConfig, RotationPolicy, SessionManager,
    },
    cli::commands::store::SessionBackend,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_backend: SessionBackend,
    pub redis_url: String,
    pub store_timeout: Duration,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: Option<u64>,
    pub max_sessions: usize,
    pub rotation_policy: RotationPolicy,
    pub cookie_secure: bool,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        let config = AuthConfig::new().with_access_ttl_seconds(self.access_ttl_seconds);
        let config = match self.refresh_ttl_seconds {
            Some(seconds) => config.with_refresh_ttl_seconds(seconds),
            None => config,
        };
        config
            .with_max_sessions(self.max_sessions)
            .with_rotation_policy(self.rotation_policy)
            .with_store_timeout(self.store_timeout)
            .with_cookie_secure(self.cookie_secure)
    }

    fn codec(&self, config: &AuthConfig) -> Result<TokenCodec> {
        TokenCodec::new(
            self.access_token_secret.expose_secret().as_bytes(),
            self.refresh_token_secret.expose_secret().as_bytes(),
            config.access_ttl_seconds(),
            config.refresh_ttl_seconds(),
        )
        .context("Invalid token signing secrets")
    }
}

async fn session_backend(args: &Args) -> Result<Arc<dyn KeyValueBackend>> {
    match args.session_backend {
        SessionBackend::Redis => {
            let backend = RedisBackend::open(&args.redis_url).context("Invalid Redis URL")?;
            tokio::time::timeout(args.store_timeout, backend.ping())
                .await
                .context("Timed out connecting to Redis")?
                .context("Failed to connect to Redis")?;
            info!("Session backend: redis");
            Ok(Arc::new(backend))
        }
        SessionBackend::Memory => {
            warn!("Session backend: memory (sessions are process-local and lost on restart)");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing secrets are invalid, a backing store is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.auth_config();
    let codec = args.codec(&config)?;
    let backend = session_backend(&args).await?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let store = SessionStore::new(backend, &config);
    let manager = Arc::new(SessionManager::new(
        codec,
        store,
        Arc::new(PgIdentityStore::new(pool)),
        config,
    ));

    api::new(args.port, manager).await
}
