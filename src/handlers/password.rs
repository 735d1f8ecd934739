use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

// Argon2id work factor: 19 MiB memory, 2 passes, 1 lane. Each guess costs at
// least as much as bcrypt at cost 14; the digest comparison is constant-time.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hashing(argon2::password_hash::Error),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(argon2::password_hash::Error),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| PasswordError::Hashing(e.into()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordError::Hashing)?;
    Ok(hash.to_string())
}

/// Checks a candidate password against a stored PHC hash string.
///
/// A mismatch is `Ok(false)`; only an unparsable stored hash is an error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(PasswordError::MalformedHash)?;
    match hasher()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::MalformedHash(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_accepts_the_same_password() {
        let hash = hash_password("secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret123", &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_an_error() {
        let hash = hash_password("secret123").unwrap();
        assert!(!verify_password("secret124", &hash).unwrap());
    }

    #[test]
    fn hashes_carry_the_configured_work_factor() {
        let hash = hash_password("secret123").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(hash.contains("$m=19456,t=2,p=1$"));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("secret123").unwrap();
        let second = hash_password("secret123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let result = verify_password("secret123", "not-a-phc-string");
        assert!(matches!(result, Err(PasswordError::MalformedHash(_))));
    }
}
