use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A session token revoked before its natural expiry. `expires_at` mirrors
/// the token's own exp claim, so the row never needs to outlive the token
/// it blacklists; the sweep task deletes it once that moment passes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlacklistedToken {
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}
