//! Random material for per-user signing secrets and session identifiers.

use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

/// Length of a per-user signing secret in bytes (256 bits).
pub const SECRET_KEY_BYTES: usize = 32;

/// Generates a signing secret from the OS RNG, hex-encoded.
pub fn generate_secret_key() -> Result<String, rand::Error> {
    let mut bytes = [0u8; SECRET_KEY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// A fresh random 128-bit token identifier.
pub fn generate_jti() -> String {
    Uuid::new_v4().to_string()
}
