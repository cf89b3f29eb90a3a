use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::models::user::User;

/// Bearer token payload. `sub` is the canonical subject claim and carries the
/// user id as a string; `exp`/`iat` are integer UTC seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Fresh claims for a subject id, expiring after the configured lifetime
    /// (default 12h). Claims are built once per issuance; issued tokens are
    /// never mutated.
    pub fn for_subject(sub: impl Into<String>) -> Self {
        let now = Utc::now();
        let lifetime = Duration::hours(config::config().security.token_lifetime_hours);
        Self {
            sub: sub.into(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        }
    }

    pub fn for_user(user: &User) -> Self {
        Self::for_subject(user.id.to_string())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// One kind for every decode failure: bad signature, malformed claims,
    /// or expiry. Callers must not be able to tell which.
    #[error("token is invalid or expired")]
    Invalid,

    #[error("token secret is not configured")]
    MissingSecret,
}

pub fn encode_token(claims: &Claims) -> Result<String, TokenError> {
    let secret = &config::config().security.token_secret;
    if secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token encoding failed: {}", e);
        TokenError::Invalid
    })
}

pub fn decode_token(token: &str) -> Result<Claims, TokenError> {
    let secret = &config::config().security.token_secret;
    if secret.is_empty() {
        return Err(TokenError::Invalid);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn round_trips_claims() {
        let claims = Claims::for_subject(Uuid::new_v4().to_string());
        let token = encode_token(&claims).unwrap();
        let decoded = decode_token(&token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn expired_token_fails_even_with_valid_signature() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "x".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode_token(&claims).unwrap();
        assert!(matches!(decode_token(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn tampered_signature_fails() {
        let claims = Claims::for_subject("x");
        let mut token = encode_token(&claims).unwrap();
        // Corrupt the signature segment
        let flipped = if token.ends_with('A') { 'B' } else { 'A' };
        token.pop();
        token.push(flipped);
        assert!(decode_token(&token).is_err());
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(decode_token("not.a.token"), Err(TokenError::Invalid)));
    }

    #[test]
    fn expiry_is_lifetime_from_issue() {
        let claims = Claims::for_subject("x");
        let lifetime_secs = config::config().security.token_lifetime_hours * 3600;
        assert_eq!(claims.exp - claims.iat, lifetime_secs);
    }
}
