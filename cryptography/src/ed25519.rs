//! Ed25519 identity keys.
//!
//! This implementation uses the `ed25519-consensus` crate to adhere to a strict
//! set of validation rules for Ed25519 signatures (every verifier must agree on
//! which signatures are valid, otherwise a pinned identity could be accepted by
//! one relay and rejected by another).
//!
//! All signatures are produced over `namespace || msg` (see [commonware_utils::union_unique]) so that
//! a signature produced for one protocol step can never be presented in another.

use crate::Error;
use commonware_utils::{hex, union_unique};
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use std::{
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    ops::Deref,
};
use zeroize::Zeroize;

pub const PRIVATE_KEY_LENGTH: usize = 32;
pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 Private Key.
#[derive(Clone)]
pub struct PrivateKey {
    raw: [u8; PRIVATE_KEY_LENGTH],
    key: ed25519_consensus::SigningKey,
}

impl PrivateKey {
    /// Generate a new private key from the provided source of randomness.
    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from(ed25519_consensus::SigningKey::new(rng))
    }

    /// Derive a private key from a fixed seed.
    ///
    /// # Warning
    ///
    /// This is insecure and should only be used for examples and testing.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Returns the public key associated with this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.key.verification_key())
    }

    /// Sign `msg` under `namespace`.
    pub fn sign(&self, namespace: &[u8], msg: &[u8]) -> Signature {
        let payload = union_unique(namespace, msg);
        Signature::from(self.key.sign(&payload))
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.raw.zeroize();
    }
}

impl Eq for PrivateKey {}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl From<ed25519_consensus::SigningKey> for PrivateKey {
    fn from(key: ed25519_consensus::SigningKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; PRIVATE_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidPrivateKeyLength)?;
        let key = ed25519_consensus::SigningKey::from(raw);
        Ok(Self { raw, key })
    }
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material
        write!(f, "PrivateKey({})", self.public_key())
    }
}

/// Ed25519 Public Key.
#[derive(Clone)]
pub struct PublicKey {
    raw: [u8; PUBLIC_KEY_LENGTH],
    key: ed25519_consensus::VerificationKey,
}

impl PublicKey {
    /// Verify that `signature` was produced over `msg` under `namespace` by the holder of this key.
    pub fn verify(&self, namespace: &[u8], msg: &[u8], signature: &Signature) -> bool {
        let payload = union_unique(namespace, msg);
        self.key.verify(&signature.signature, &payload).is_ok()
    }
}

impl Eq for PublicKey {}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Deref for PublicKey {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.raw
    }
}

impl From<ed25519_consensus::VerificationKey> for PublicKey {
    fn from(key: ed25519_consensus::VerificationKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; PUBLIC_KEY_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidPublicKeyLength)?;
        let key = ed25519_consensus::VerificationKey::try_from(raw)
            .map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self { raw, key })
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

/// Ed25519 Signature.
#[derive(Clone)]
pub struct Signature {
    raw: [u8; SIGNATURE_LENGTH],
    signature: ed25519_consensus::Signature,
}

impl Eq for Signature {}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Deref for Signature {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.raw
    }
}

impl From<ed25519_consensus::Signature> for Signature {
    fn from(signature: ed25519_consensus::Signature) -> Self {
        let raw = signature.to_bytes();
        Self { raw, signature }
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; SIGNATURE_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidSignatureLength)?;
        let signature = ed25519_consensus::Signature::from(raw);
        Ok(Self { raw, signature })
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}
