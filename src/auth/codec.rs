//! HS256 token codec for access and refresh credentials.
//!
//! Tokens are compact JWS strings (`header.claims.signature`, base64url without
//! padding). Access and refresh tokens are signed with independent keys, so a
//! token of one kind never verifies as the other.

use crate::auth::identity::Identity;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Source of the current unix time in seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub const ALGORITHM: &str = "HS256";
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token claims")]
    MalformedClaims,
    #[error("failed to encode token")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("{kind} signing secret must be at least {MIN_SECRET_LEN} bytes, got {len}")]
    TooShort { kind: &'static str, len: usize },
    #[error("access and refresh signing secrets must differ")]
    Shared,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct AccessClaims {
    username: String,
    user_id: u64,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct RefreshClaims {
    username: String,
    user_id: u64,
    jti: String,
    iat: i64,
    exp: i64,
}

/// A freshly minted refresh token and the session id embedded in it.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub session_id: Uuid,
}

/// Verified contents of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub identity: Identity,
    pub session_id: Uuid,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct TokenCodec {
    access_key: HmacSha256,
    refresh_key: HmacSha256,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    clock: Clock,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_key", &"***")
            .field("refresh_key", &"***")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec from the two signing secrets.
    ///
    /// # Errors
    /// Returns [`KeyError`] if either secret is shorter than [`MIN_SECRET_LEN`]
    /// or both secrets are identical.
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
    ) -> Result<Self, KeyError> {
        let access_key = mac_key("access", access_secret)?;
        let refresh_key = mac_key("refresh", refresh_secret)?;
        if access_secret == refresh_secret {
            return Err(KeyError::Shared);
        }

        Ok(Self {
            access_key,
            refresh_key,
            access_ttl_seconds: seconds(access_ttl_seconds),
            refresh_ttl_seconds: seconds(refresh_ttl_seconds),
            clock: Arc::new(unix_now),
        })
    }

    /// Replace the system clock used by the non-`_at` methods.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Sign an access token valid from now for the access TTL.
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if the claims cannot be serialized.
    pub fn issue_access(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_access_at(identity, self.now())
    }

    /// Sign an access token as if issued at `now` (unix seconds).
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if the claims cannot be serialized.
    pub fn issue_access_at(&self, identity: &Identity, now: i64) -> Result<String, TokenError> {
        let claims = AccessClaims {
            username: identity.username.clone(),
            user_id: identity.user_id,
            iat: now,
            exp: now.saturating_add(self.access_ttl_seconds),
        };
        sign(&self.access_key, &claims)
    }

    /// Sign a refresh token carrying a newly generated session id.
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if the claims cannot be serialized.
    pub fn issue_refresh(&self, identity: &Identity) -> Result<IssuedRefresh, TokenError> {
        self.issue_refresh_at(identity, self.now())
    }

    /// Sign a refresh token as if issued at `now` (unix seconds).
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if the claims cannot be serialized.
    pub fn issue_refresh_at(
        &self,
        identity: &Identity,
        now: i64,
    ) -> Result<IssuedRefresh, TokenError> {
        let session_id = Uuid::new_v4();
        let claims = RefreshClaims {
            username: identity.username.clone(),
            user_id: identity.user_id,
            jti: session_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.refresh_ttl_seconds),
        };
        let token = sign(&self.refresh_key, &claims)?;
        Ok(IssuedRefresh { token, session_id })
    }

    /// Verify an access token against the access key and the current clock.
    ///
    /// # Errors
    /// Returns [`TokenError::InvalidSignature`], [`TokenError::MalformedClaims`],
    /// or [`TokenError::Expired`].
    pub fn verify_access(&self, token: &str) -> Result<Identity, TokenError> {
        self.verify_access_at(token, self.now())
    }

    /// Verify an access token as of `now` (unix seconds).
    ///
    /// # Errors
    /// See [`TokenCodec::verify_access`].
    pub fn verify_access_at(&self, token: &str, now: i64) -> Result<Identity, TokenError> {
        let claims: AccessClaims = verify(&self.access_key, token)?;
        check_expiry(claims.exp, now)?;
        Ok(Identity {
            username: claims.username,
            user_id: claims.user_id,
        })
    }

    /// Verify a refresh token against the refresh key and the current clock.
    ///
    /// This only proves the token is authentic and unexpired; callers must still
    /// confirm the session record exists.
    ///
    /// # Errors
    /// Returns [`TokenError::InvalidSignature`], [`TokenError::MalformedClaims`],
    /// or [`TokenError::Expired`].
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshSession, TokenError> {
        self.verify_refresh_at(token, self.now())
    }

    /// Verify a refresh token as of `now` (unix seconds).
    ///
    /// # Errors
    /// See [`TokenCodec::verify_refresh`].
    pub fn verify_refresh_at(&self, token: &str, now: i64) -> Result<RefreshSession, TokenError> {
        let claims: RefreshClaims = verify(&self.refresh_key, token)?;
        check_expiry(claims.exp, now)?;
        let session_id = Uuid::parse_str(&claims.jti).map_err(|_| TokenError::MalformedClaims)?;
        Ok(RefreshSession {
            identity: Identity {
                username: claims.username,
                user_id: claims.user_id,
            },
            session_id,
            expires_at: claims.exp,
        })
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| seconds(elapsed.as_secs()))
}

fn seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn mac_key(kind: &'static str, secret: &[u8]) -> Result<HmacSha256, KeyError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(KeyError::TooShort {
            kind,
            len: secret.len(),
        });
    }
    HmacSha256::new_from_slice(secret).map_err(|_| KeyError::TooShort {
        kind,
        len: secret.len(),
    })
}

fn check_expiry(exp: i64, now: i64) -> Result<(), TokenError> {
    if exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(())
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::MalformedClaims)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedClaims)
}

fn sign<T: Serialize>(key: &HmacSha256, claims: &T) -> Result<String, TokenError> {
    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = key.clone();
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

fn verify<T: for<'de> Deserialize<'de>>(key: &HmacSha256, token: &str) -> Result<T, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::MalformedClaims)?;
    let claims_b64 = parts.next().ok_or(TokenError::MalformedClaims)?;
    let signature_b64 = parts.next().ok_or(TokenError::MalformedClaims)?;
    if parts.next().is_some() {
        return Err(TokenError::MalformedClaims);
    }

    // Only HS256 is accepted; the header is never trusted to pick the algorithm.
    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != ALGORITHM {
        return Err(TokenError::InvalidSignature);
    }

    let signature =
        Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::InvalidSignature)?;
    let mut mac = key.clone();
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    b64d_json(claims_b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Sha512;

    const ACCESS_SECRET: &[u8] = b"access-secret-0123456789abcdef0123456789";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-0123456789abcdef012345678";
    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        match TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET, 3600, 108_000) {
            Ok(codec) => codec,
            Err(err) => panic!("codec setup failed: {err}"),
        }
    }

    fn alice() -> Identity {
        Identity::new("alice", 1)
    }

    fn forge(header: &serde_json::Value, claims: &serde_json::Value, signature: &[u8]) -> String {
        let header_b64 = Base64UrlUnpadded::encode_string(header.to_string().as_bytes());
        let claims_b64 = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(signature);
        format!("{header_b64}.{claims_b64}.{signature_b64}")
    }

    #[test]
    fn access_token_round_trips_before_expiry() {
        let codec = codec();
        let token = codec.issue_access_at(&alice(), NOW).unwrap();
        assert_eq!(codec.verify_access_at(&token, NOW).unwrap(), alice());
        assert_eq!(codec.verify_access_at(&token, NOW + 3599).unwrap(), alice());
    }

    #[test]
    fn access_token_expires_at_ttl() {
        let codec = codec();
        let token = codec.issue_access_at(&alice(), NOW).unwrap();
        assert!(matches!(
            codec.verify_access_at(&token, NOW + 3600),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn refresh_token_carries_session_id() {
        let codec = codec();
        let issued = codec.issue_refresh_at(&alice(), NOW).unwrap();
        let session = codec.verify_refresh_at(&issued.token, NOW + 10).unwrap();
        assert_eq!(session.identity, alice());
        assert_eq!(session.session_id, issued.session_id);
        assert_eq!(session.expires_at, NOW + 108_000);
        assert!(matches!(
            codec.verify_refresh_at(&issued.token, NOW + 108_000),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn refresh_session_ids_are_unique() {
        let codec = codec();
        let first = codec.issue_refresh_at(&alice(), NOW).unwrap();
        let second = codec.issue_refresh_at(&alice(), NOW).unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn token_kinds_do_not_cross_verify() {
        let codec = codec();
        let access = codec.issue_access_at(&alice(), NOW).unwrap();
        let refresh = codec.issue_refresh_at(&alice(), NOW).unwrap();
        assert!(matches!(
            codec.verify_refresh_at(&access, NOW),
            Err(TokenError::InvalidSignature)
        ));
        assert!(matches!(
            codec.verify_access_at(&refresh.token, NOW),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_other_algorithms_even_with_valid_signature() {
        let codec = codec();
        let claims = serde_json::json!({
            "username": "alice",
            "user_id": 1,
            "iat": NOW,
            "exp": NOW + 60,
        });
        let header = serde_json::json!({"alg": "HS512", "typ": "JWT"});
        let header_b64 = Base64UrlUnpadded::encode_string(header.to_string().as_bytes());
        let claims_b64 = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
        let mut mac = Hmac::<Sha512>::new_from_slice(ACCESS_SECRET).unwrap();
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        let signature = mac.finalize().into_bytes();
        let token = forge(&header, &claims, &signature);

        assert!(matches!(
            codec.verify_access_at(&token, NOW),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_unsigned_tokens() {
        let codec = codec();
        let claims = serde_json::json!({
            "username": "alice",
            "user_id": 1,
            "iat": NOW,
            "exp": NOW + 60,
        });
        let token = forge(&serde_json::json!({"alg": "none", "typ": "JWT"}), &claims, b"");
        assert!(matches!(
            codec.verify_access_at(&token, NOW),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_tampered_claims() {
        let codec = codec();
        let token = codec.issue_access_at(&alice(), NOW).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = Base64UrlUnpadded::encode_string(
            serde_json::json!({"username": "mallory", "user_id": 2, "iat": NOW, "exp": NOW + 60})
                .to_string()
                .as_bytes(),
        );
        parts[1] = &forged_claims;
        let tampered = parts.join(".");
        assert!(matches!(
            codec.verify_access_at(&tampered, NOW),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_malformed_tokens() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(
                matches!(
                    codec.verify_access_at(token, NOW),
                    Err(TokenError::MalformedClaims)
                ),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn signed_but_incomplete_claims_are_malformed() {
        let claims = serde_json::json!({"username": "alice", "iat": NOW});
        let token = sign(&mac_key("access", ACCESS_SECRET).unwrap(), &claims).unwrap();
        assert!(matches!(
            codec().verify_access_at(&token, NOW),
            Err(TokenError::MalformedClaims)
        ));
    }

    #[test]
    fn refresh_with_non_uuid_session_id_is_malformed() {
        let claims = serde_json::json!({
            "username": "alice",
            "user_id": 1,
            "jti": "not-a-uuid",
            "iat": NOW,
            "exp": NOW + 60,
        });
        let token = sign(&mac_key("refresh", REFRESH_SECRET).unwrap(), &claims).unwrap();
        assert!(matches!(
            codec().verify_refresh_at(&token, NOW),
            Err(TokenError::MalformedClaims)
        ));
    }

    #[test]
    fn key_validation() {
        assert_eq!(
            TokenCodec::new(b"short", REFRESH_SECRET, 60, 60).err(),
            Some(KeyError::TooShort {
                kind: "access",
                len: 5
            })
        );
        assert_eq!(
            TokenCodec::new(ACCESS_SECRET, b"short", 60, 60).err(),
            Some(KeyError::TooShort {
                kind: "refresh",
                len: 5
            })
        );
        assert_eq!(
            TokenCodec::new(ACCESS_SECRET, ACCESS_SECRET, 60, 60).err(),
            Some(KeyError::Shared)
        );
    }

    #[test]
    fn debug_redacts_keys() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains("access-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn injected_clock_drives_issue_and_verify() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let now = Arc::new(AtomicI64::new(NOW));
        let source = Arc::clone(&now);
        let codec = codec().with_clock(Arc::new(move || source.load(Ordering::SeqCst)));

        let first = codec.issue_access(&alice()).unwrap();
        assert_eq!(first, codec.issue_access_at(&alice(), NOW).unwrap());

        now.store(NOW + 1, Ordering::SeqCst);
        let second = codec.issue_access(&alice()).unwrap();
        assert_ne!(first, second);

        now.store(NOW + 3600, Ordering::SeqCst);
        assert!(matches!(codec.verify_access(&first), Err(TokenError::Expired)));
        assert_eq!(codec.verify_access(&second).unwrap(), alice());
    }
}
