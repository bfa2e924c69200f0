//! Credential issuance, session tracking, and request guards.
//!
//! Flow Overview: `codec` mints and verifies tokens, `store` tracks refresh
//! sessions on top of a `backend`, `manager` ties both together for sign-in,
//! rotation, and logout, and `guard` enforces access tokens per request.

pub mod backend;
pub mod codec;
mod config;
pub mod cookie;
mod error;
pub mod guard;
mod identity;
pub(crate) mod manager;
pub mod password;
pub mod store;
pub mod users;

pub use config::{AuthConfig, RotationPolicy};
pub use error::AuthError;
pub use identity::Identity;
pub use manager::{IssuedSession, SessionManager};
