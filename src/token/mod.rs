//! Session token issuance and verification.
//!
//! Tokens are HS256-signed JWTs carrying the user id as subject. They are
//! never persisted on issuance; a token is valid as long as its signature
//! checks out, its expiry has not passed, and it has not been blacklisted
//! by logout.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims embedded in a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user id this token asserts
    pub sub: String,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Issue a signed session token for a user.
///
/// The token embeds the user id, the issue time and an expiry `ttl_days`
/// out. Issuance has no side effects; nothing is written anywhere.
pub fn issue(user_id: &str, secret: &str, ttl_days: i64) -> Result<String> {
    let now = Utc::now();
    let exp = now + Duration::days(ttl_days);

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to sign session token")?;

    Ok(token)
}

/// Decode a session token, validating signature and expiry.
pub fn decode(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issue_and_decode() {
        let token = issue("user-1", SECRET, 30).unwrap();
        let claims = decode(&token, SECRET).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);
        // 30 days, allowing a little slack for test execution time
        assert!((claims.exp - claims.iat - 30 * 24 * 3600).abs() <= 5);
    }

    #[test]
    fn test_decode_wrong_secret() {
        let token = issue("user-1", SECRET, 30).unwrap();
        assert!(decode(&token, "other-secret").is_err());
    }

    #[test]
    fn test_decode_expired() {
        // Issued with a negative lifetime, expired a full day ago
        let token = issue("user-1", SECRET, -1).unwrap();
        assert!(decode(&token, SECRET).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode("not-a-token", SECRET).is_err());
        assert!(decode("", SECRET).is_err());
    }

    #[test]
    fn test_decode_tampered() {
        let token = issue("user-1", SECRET, 30).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(decode(&tampered, SECRET).is_err());
    }
}
