use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Principal a credential is issued for.
#[derive(ToSchema, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub user_id: u64,
}

impl Identity {
    #[must_use]
    pub fn new(username: impl Into<String>, user_id: u64) -> Self {
        Self {
            username: username.into(),
            user_id,
        }
    }
}
