//! Ephemeral X25519 key agreement.
//!
//! An [EphemeralSecret] can only be used once: [EphemeralSecret::diffie_hellman] consumes it, so
//! ephemeral material cannot be reused across handshake attempts.

use crate::Error;
use rand::{CryptoRng, RngCore};
pub use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Generate a fresh ephemeral secret.
pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> EphemeralSecret {
    EphemeralSecret::random_from_rng(rng)
}

pub fn decode_public_key(public_key: &[u8]) -> Result<PublicKey, Error> {
    // Construct a public key array from the data
    let public_key: [u8; PUBLIC_KEY_LENGTH] = match public_key.try_into() {
        Ok(key) => key,
        Err(_) => return Err(Error::InvalidEphemeralPublicKey),
    };

    // Create the public key from the array
    Ok(PublicKey::from(public_key))
}

pub fn encode_public_key(public_key: &PublicKey) -> [u8; PUBLIC_KEY_LENGTH] {
    public_key.to_bytes()
}
