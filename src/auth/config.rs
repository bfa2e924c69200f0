//! Session lifecycle configuration.

use std::{fmt, str::FromStr, time::Duration};

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 24 * 60 * 60;
const REFRESH_TTL_MULTIPLIER: u64 = 30;
const DEFAULT_MAX_SESSIONS: usize = 5;
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REFRESH_COOKIE_NAME: &str = "refresh_token";

/// What happens to the presented refresh session when it is rotated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Leave the predecessor record in place until it expires or is evicted.
    #[default]
    Retain,
    /// Delete the predecessor record once the new one is stored.
    Revoke,
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "revoke" => Ok(Self::Revoke),
            other => Err(format!("invalid rotation policy: {other}")),
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Revoke => f.write_str("revoke"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
    max_sessions: usize,
    rotation_policy: RotationPolicy,
    store_timeout: Duration,
    refresh_cookie_name: String,
    cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS * REFRESH_TTL_MULTIPLIER,
            max_sessions: DEFAULT_MAX_SESSIONS,
            rotation_policy: RotationPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE_NAME.to_string(),
            cookie_secure: false,
        }
    }

    /// Set the access TTL; the refresh TTL follows at 30x unless set afterwards.
    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl_seconds = seconds;
        self.refresh_ttl_seconds = seconds.saturating_mul(REFRESH_TTL_MULTIPLIER);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    #[must_use]
    pub fn with_rotation_policy(mut self, policy: RotationPolicy) -> Self {
        self.rotation_policy = policy;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_name(mut self, name: String) -> Self {
        self.refresh_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> u64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> u64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_seconds)
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    #[must_use]
    pub fn rotation_policy(&self) -> RotationPolicy {
        self.rotation_policy
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> &str {
        &self.refresh_cookie_name
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_lifetimes() {
        let config = AuthConfig::new();
        assert_eq!(config.access_ttl_seconds(), 86_400);
        assert_eq!(config.refresh_ttl_seconds(), 30 * 86_400);
        assert_eq!(config.max_sessions(), 5);
        assert_eq!(config.rotation_policy(), RotationPolicy::Retain);
        assert_eq!(config.refresh_cookie_name(), "refresh_token");
        assert!(!config.cookie_secure());
    }

    #[test]
    fn refresh_ttl_tracks_access_ttl_unless_overridden() {
        let config = AuthConfig::new().with_access_ttl_seconds(60);
        assert_eq!(config.refresh_ttl_seconds(), 1800);

        let config = AuthConfig::new()
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(120);
        assert_eq!(config.refresh_ttl_seconds(), 120);
    }

    #[test]
    fn max_sessions_is_at_least_one() {
        assert_eq!(AuthConfig::new().with_max_sessions(0).max_sessions(), 1);
    }

    #[test]
    fn rotation_policy_parses_case_insensitively() {
        assert_eq!("Retain".parse::<RotationPolicy>(), Ok(RotationPolicy::Retain));
        assert_eq!("REVOKE".parse::<RotationPolicy>(), Ok(RotationPolicy::Revoke));
        assert!("drop".parse::<RotationPolicy>().is_err());
        assert_eq!(RotationPolicy::Revoke.to_string(), "revoke");
    }
}
