//! Password primitive injected into the account ledger.
//!
//! The store only ever sees `(salt, hash, iterations)`; the plaintext never
//! leaves the call that derives or verifies it.

use crate::core::error::LedgerError;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::num::NonZeroU32;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Salted, iterated key-derivation output, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    pub salt: String,
    pub hash: String,
    pub iterations: u32,
}

pub trait PasswordHasher: Send + Sync + fmt::Debug {
    fn hash(&self, password: &str) -> Result<PasswordDigest, LedgerError>;

    /// Must compare in constant time. Verification uses the iteration count
    /// stored in `digest`, not the hasher's current setting.
    fn verify(&self, password: &str, digest: &PasswordDigest) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a random 16-byte salt.
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl fmt::Debug for Pbkdf2Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pbkdf2Hasher")
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Result<Self, LedgerError> {
        let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
            LedgerError::ConfigError("password_iterations must be > 0".to_string())
        })?;
        Ok(Self {
            iterations,
            rng: SystemRandom::new(),
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<PasswordDigest, LedgerError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| LedgerError::IoError(std::io::Error::other("system RNG unavailable")))?;
        let mut out = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            password.as_bytes(),
            &mut out,
        );
        Ok(PasswordDigest {
            salt: hex::encode(salt),
            hash: hex::encode(out),
            iterations: self.iterations.get(),
        })
    }

    fn verify(&self, password: &str, digest: &PasswordDigest) -> bool {
        let Some(iterations) = NonZeroU32::new(digest.iterations) else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(&digest.salt), hex::decode(&digest.hash)) else {
            return false;
        };
        if salt.is_empty() || expected.is_empty() {
            return false;
        }
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &expected,
        )
        .is_ok()
    }
}
