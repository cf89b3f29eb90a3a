use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::ApiError;

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    hash(plain, DEFAULT_COST).map_err(|e| {
        tracing::error!("password hashing failed: {}", e);
        ApiError::Internal
    })
}

/// Constant result shape: a malformed stored hash reads as "no match" rather
/// than an error the caller could distinguish.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    verify(plain, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hashed = hash_password("Passw0rd@").unwrap();
        assert!(verify_password("Passw0rd@", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }

    #[test]
    fn malformed_hash_is_no_match() {
        assert!(!verify_password("Passw0rd@", "not-a-bcrypt-hash"));
    }
}
