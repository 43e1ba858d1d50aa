//! JSON payloads carried inside encrypted envelopes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// First message of a client, binding its identifier to its identity key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentityProof {
    pub client_id: String,
    /// Hex signature over the identifier bytes.
    pub signature: String,
    /// PEM (SPKI) encoding of the identity public key.
    pub pub_key: String,
}

/// A message a client asks the relay to forward.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub target: String,
    pub text: String,
}

/// A message forwarded by the relay to its recipient.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub text: String,
    pub sender: String,
}

/// Serialize a payload.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    // Structs made only of strings always serialize
    serde_json::to_vec(value).unwrap_or_default()
}

/// Parse a payload, describing the failure as a string.
pub fn decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T, String> {
    serde_json::from_slice(buf).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_shape() {
        let delivery = Delivery {
            text: "hello bob".into(),
            sender: "alice".into(),
        };
        assert_eq!(
            encode(&delivery),
            br#"{"text":"hello bob","sender":"alice"}"#.to_vec()
        );
    }

    #[test]
    fn test_request_decode() {
        let request: Request = decode(br#"{"target":"bob","text":"hi"}"#).unwrap();
        assert_eq!(request.target, "bob");
        assert_eq!(request.text, "hi");

        assert!(decode::<Request>(br#"{"target":"bob"}"#).is_err());
        assert!(decode::<Request>(b"hi bob").is_err());
    }

    #[test]
    fn test_identity_proof_fields() {
        let proof: IdentityProof =
            decode(br#"{"client_id":"alice","signature":"00","pub_key":"pem"}"#).unwrap();
        assert_eq!(proof.client_id, "alice");
        assert_eq!(proof.signature, "00");
        assert_eq!(proof.pub_key, "pem");
    }
}
