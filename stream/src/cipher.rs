use crate::handshake::HandshakeError;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, KeySizeUser};
use hkdf::{hmac::digest::typenum::Unsigned, Hkdf};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The size of the key used by the ChaCha20Poly1305 cipher.
pub const KEY_LENGTH: usize = <ChaCha20Poly1305 as KeySizeUser>::KeySize::USIZE;

/// Context string bound into every session key.
///
/// Both peers must use the same value or they will derive different keys.
pub const KDF_INFO: &[u8] = b"shield-chat";

/// Symmetric key shared by both ends of a connection once the handshake completes.
///
/// The key is wiped from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LENGTH]);

impl SessionKey {
    /// Returns a ChaCha20Poly1305 cipher keyed with this session key.
    pub fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&self.0.into())
    }
}

impl AsRef<[u8]> for SessionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SessionKey {}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Derive a [SessionKey] from the input key material (usually the X25519 shared secret) with
/// HKDF-SHA256, no salt and [KDF_INFO] as context.
pub fn derive(ikm: &[u8]) -> Result<SessionKey, HandshakeError> {
    // HKDF-Extract: creates a pseudorandom key (PRK)
    let prk = Hkdf::<Sha256>::new(None, ikm);

    // HKDF-Expand: stretch the PRK into the session key
    let mut buf = [0u8; KEY_LENGTH];
    prk.expand(KDF_INFO, &mut buf)
        .map_err(|_| HandshakeError::KeyDerivation)?;
    let key = SessionKey(buf);
    buf.zeroize();
    Ok(key)
}
