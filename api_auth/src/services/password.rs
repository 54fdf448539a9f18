use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString,
        rand_core::OsRng,
    },
};
use common::error::{AppError, Res};

/// Argon2id memory cost in KiB.
const MEMORY_KIB: u32 = 19 * 1024;
const ITERATIONS: u32 = 2;
const LANES: u32 = 1;

/// Salted one-way hashing of user secrets.
#[derive(Clone)]
pub struct PasswordVerifier {
    argon2: Argon2<'static>,
    // verified against when the email is unknown so both login failures
    // cost the same
    dummy_digest: String,
}

impl PasswordVerifier {
    pub fn new() -> Res<Self> {
        Self::with_params(MEMORY_KIB, ITERATIONS, LANES)
    }

    pub fn with_params(memory_kib: u32, iterations: u32, lanes: u32) -> Res<Self> {
        let params = Params::new(memory_kib, iterations, lanes, None)
            .map_err(|e| AppError::Hashing(format!("invalid argon2 parameters: {}", e)))?;
        let mut verifier = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_digest: String::new(),
        };
        verifier.dummy_digest = verifier.hash("not-a-real-password")?;
        Ok(verifier)
    }

    /// Hashes `secret` with a fresh random salt into a PHC string.
    pub fn hash(&self, secret: &str) -> Res<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Hashing(e.to_string()))
    }

    /// Returns `Ok(false)` on mismatch. Errors only when `digest` is malformed.
    pub fn verify(&self, secret: &str, digest: &str) -> Res<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| AppError::Hashing(format!("malformed digest: {}", e)))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(HashError::Password) => Ok(false),
            Err(e) => Err(AppError::Hashing(e.to_string())),
        }
    }

    pub fn verify_dummy(&self, secret: &str) {
        let _ = self.verify(secret, &self.dummy_digest);
    }
}
