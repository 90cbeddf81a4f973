use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use hmac::{Hmac, Mac};
use log::{debug, warn};
use sha2::Sha256;

/// Password hashing errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to hash password: {0}")]
    HashFailed(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// One-way password hashing
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Hash a password into a self-describing PHC string
    fn hash_password(&self, password: &str) -> Result<String, PasswordError>;

    /// Check a password against a stored hash
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, PasswordError>;
}

/// Argon2id hasher with an optional pepper kept outside the database
pub struct Argon2Hasher {
    params: Params,
    pepper: Option<Vec<u8>>,
}

impl Argon2Hasher {
    pub fn new(memory_kib: u32, iterations: u32, pepper: Option<&str>) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| PasswordError::InvalidParameters(e.to_string()))?;

        Ok(Self {
            params,
            pepper: pepper.filter(|p| !p.is_empty()).map(|p| p.as_bytes().to_vec()),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// HMAC-SHA256 the password with the pepper, when one is configured
    fn apply_pepper(&self, password: &str) -> Result<Vec<u8>, PasswordError> {
        match &self.pepper {
            Some(pepper) => {
                let mut mac = Hmac::<Sha256>::new_from_slice(pepper)
                    .map_err(|e| PasswordError::HashFailed(format!("Failed to create HMAC: {}", e)))?;
                mac.update(password.as_bytes());
                Ok(hex::encode(mac.finalize().into_bytes()).into_bytes())
            }
            None => Ok(password.as_bytes().to_vec()),
        }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let input = self.apply_pepper(password)?;

        let hash = self
            .argon2()
            .hash_password(&input, &salt)
            .map_err(|e| PasswordError::HashFailed(e.to_string()))?
            .to_string();

        debug!("Password hashed with Argon2id (m={}, t={})", self.params.m_cost(), self.params.t_cost());
        Ok(hash)
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        let input = self.apply_pepper(password)?;

        // Cost parameters are read from the stored hash, not from self
        match self.argon2().verify_password(&input, &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => {
                warn!("Password verification failed unexpectedly: {}", e);
                Err(PasswordError::MalformedHash(e.to_string()))
            }
        }
    }
}
