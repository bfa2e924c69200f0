//! Identity lookup for sign-in.

use crate::auth::{identity::Identity, password::hash_password};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use sqlx::{PgPool, Row};
use std::{collections::HashMap, future::Future, pin::Pin};
use tracing::Instrument;

pub type IdentityFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<UserRecord>>> + Send + 'a>>;

/// Stored identity plus the password hash it is checked against.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub identity: Identity,
    pub password_hash: String,
}

pub trait IdentityStore: Send + Sync {
    /// Look up a user by an already-normalized email.
    fn find_by_email<'a>(&'a self, email: &'a str) -> IdentityFuture<'a>;
}

/// Normalize an email for lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IdentityStore for PgIdentityStore {
    fn find_by_email<'a>(&'a self, email: &'a str) -> IdentityFuture<'a> {
        Box::pin(async move {
            let query = "SELECT id, username, password_hash FROM users WHERE email = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup user by email")?;

            row.map(|row| {
                let id: i64 = row.try_get("id").context("missing user id")?;
                let user_id =
                    u64::try_from(id).map_err(|_| anyhow!("negative user id: {id}"))?;
                Ok(UserRecord {
                    identity: Identity::new(
                        row.try_get::<String, _>("username")
                            .context("missing username")?,
                        user_id,
                    ),
                    password_hash: row
                        .try_get("password_hash")
                        .context("missing password hash")?,
                })
            })
            .transpose()
        })
    }
}

/// In-process identity store for tests and local development.
#[derive(Default)]
pub struct MemoryIdentityStore {
    users: HashMap<String, UserRecord>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, hashing `password` with Argon2id.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn with_user(mut self, email: &str, identity: Identity, password: &str) -> Result<Self> {
        let password_hash = hash_password(password)?;
        self.users.insert(
            normalize_email(email),
            UserRecord {
                identity,
                password_hash,
            },
        );
        Ok(self)
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn find_by_email<'a>(&'a self, email: &'a str) -> IdentityFuture<'a> {
        Box::pin(async move { Ok(self.users.get(email).cloned()) })
    }
}
