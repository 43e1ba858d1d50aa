//! JSON shapes exchanged on the wire. Binary fields are hex-encoded.

use commonware_utils::from_hex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// First handshake message, sent by the listener.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub xpub: String,
    pub sig: String,
}

/// Second handshake message, sent by the dialer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub xpub: String,
}

/// An encrypted frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: String,
    pub ciphertext: String,
}

/// Parse a JSON object, describing the failure as a string.
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, String> {
    serde_json::from_slice(buf).map_err(|err| err.to_string())
}

/// Serialize a JSON object.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    // Serializing plain structs of strings cannot fail
    serde_json::to_vec(value).unwrap_or_default()
}

/// Decode a hex field of any length.
pub fn field(name: &'static str, value: &str) -> Result<Vec<u8>, String> {
    from_hex(value).ok_or_else(|| format!("{name} is not valid hex"))
}

/// Decode a hex field of exactly `N` bytes.
pub fn fixed<const N: usize>(name: &'static str, value: &str) -> Result<[u8; N], String> {
    let raw = field(name, value)?;
    let len = raw.len();
    raw.try_into()
        .map_err(|_| format!("{name} has length {len}, expected {N}"))
}
