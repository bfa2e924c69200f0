//! # Issuegate (Authentication & Session Lifecycle)
//!
//! `issuegate` issues and verifies the credentials used by the issue tracker
//! and keeps a server-side record of live sessions.
//!
//! ## Credentials
//!
//! - **Access token:** short-lived HS256 JWT carried as `Authorization: Bearer`.
//!   Verified statelessly; never looked up in the session store.
//! - **Refresh token:** long-lived HS256 JWT carried in an `HttpOnly` cookie.
//!   Signed with a separate key and only honored while its session record exists,
//!   which is what makes logout and eviction effective.
//!
//! ## Sessions
//!
//! Each refresh token maps to one record keyed by `username:session_id`. Writes
//! enforce a per-principal cap atomically: when a principal already holds
//! `max_sessions` live records, all of them are evicted before the new one is stored.
//!
//! Revoking a session does not revoke access tokens already handed out; they stay
//! valid until their own expiry.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
