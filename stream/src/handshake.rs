//! Two-message key exchange that authenticates the listener.
//!
//! # States
//!
//! ```text
//!   listener                                   dialer
//!   --------                                   ------
//!   Init                                       Init
//!    | listen_start                             |
//!   EphemeralSent  ---------- Hello -------->  EphemeralAwaited
//!    |                                          | dial (verify signature)
//!    |             <--------- Reply ---------  SharedSecretDerived
//!    | listen_end                               |
//!   SharedSecretDerived                        Complete
//!    |
//!   Complete
//! ```
//!
//! Any error moves the handshake to `Failed`. Nothing is retried: a new attempt requires a new
//! transport and new ephemeral keys. [listen_start], [listen_end] and [dial] perform no I/O, while
//! [listen] and [connect] drive them over a transport under [Config::handshake_timeout].

use crate::{
    channel::Connection,
    cipher::{self, SessionKey},
    transport::{Sink, Stream},
    utils::codec::{recv_frame, send_frame},
    wire, Config, Error,
};
use commonware_utils::hex;
use rand::{CryptoRng, RngCore};
use shield_cryptography::{ed25519::SIGNATURE_LENGTH, x25519, PrivateKey, PublicKey, Signature};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

/// Domain separator for the listener's signature over its ephemeral key.
pub const NAMESPACE: &[u8] = b"_SHIELD_HANDSHAKE";

/// Errors that can occur during the handshake. All of them are fatal to the connection.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("malformed handshake message: {0}")]
    Malformed(String),
    #[error("invalid ephemeral public key")]
    InvalidEphemeralPublicKey,
    #[error("invalid peer signature")]
    InvalidPeerSignature,
    #[error("shared secret was not contributory")]
    SharedSecretNotContributory,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("handshake timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[from] Error),
}

/// Sent by the listener: its ephemeral key, signed by its identity.
#[derive(Clone, Debug)]
pub struct Hello {
    pub ephemeral: x25519::PublicKey,
    pub signature: Signature,
}

impl Hello {
    /// Encode as `{"xpub": <hex>, "sig": <hex>}`.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode(&wire::Hello {
            xpub: hex(&x25519::encode_public_key(&self.ephemeral)),
            sig: hex(&self.signature),
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, HandshakeError> {
        let hello: wire::Hello = wire::decode(buf).map_err(HandshakeError::Malformed)?;
        let xpub = wire::field("xpub", &hello.xpub).map_err(HandshakeError::Malformed)?;
        let ephemeral = x25519::decode_public_key(&xpub)
            .map_err(|_| HandshakeError::InvalidEphemeralPublicKey)?;
        let sig = wire::fixed::<SIGNATURE_LENGTH>("sig", &hello.sig)
            .map_err(HandshakeError::Malformed)?;
        let signature = Signature::try_from(sig.as_ref())
            .map_err(|err| HandshakeError::Malformed(err.to_string()))?;
        Ok(Self {
            ephemeral,
            signature,
        })
    }
}

/// Sent by the dialer: its (unsigned) ephemeral key.
#[derive(Clone, Debug)]
pub struct Reply {
    pub ephemeral: x25519::PublicKey,
}

impl Reply {
    /// Encode as `{"xpub": <hex>}`.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode(&wire::Reply {
            xpub: hex(&x25519::encode_public_key(&self.ephemeral)),
        })
    }

    pub fn decode(buf: &[u8]) -> Result<Self, HandshakeError> {
        let reply: wire::Reply = wire::decode(buf).map_err(HandshakeError::Malformed)?;
        let xpub = wire::field("xpub", &reply.xpub).map_err(HandshakeError::Malformed)?;
        let ephemeral = x25519::decode_public_key(&xpub)
            .map_err(|_| HandshakeError::InvalidEphemeralPublicKey)?;
        Ok(Self { ephemeral })
    }
}

/// Listener state between sending [Hello] and receiving [Reply].
pub struct Listening {
    secret: x25519::EphemeralSecret,
}

/// Generate an ephemeral key and sign its public half with `identity`.
pub fn listen_start<R: RngCore + CryptoRng>(
    rng: &mut R,
    identity: &PrivateKey,
) -> (Listening, Hello) {
    let secret = x25519::new(rng);
    let ephemeral = x25519::PublicKey::from(&secret);
    let signature = identity.sign(NAMESPACE, &x25519::encode_public_key(&ephemeral));
    (
        Listening { secret },
        Hello {
            ephemeral,
            signature,
        },
    )
}

/// Complete the exchange with the dialer's [Reply].
pub fn listen_end(state: Listening, reply: Reply) -> Result<SessionKey, HandshakeError> {
    agree(state.secret, &reply.ephemeral)
}

/// Verify the listener's [Hello] against its known identity `peer`, then answer it.
pub fn dial<R: RngCore + CryptoRng>(
    rng: &mut R,
    peer: &PublicKey,
    hello: Hello,
) -> Result<(Reply, SessionKey), HandshakeError> {
    // Only the expected listener could have signed this ephemeral key
    if !peer.verify(
        NAMESPACE,
        &x25519::encode_public_key(&hello.ephemeral),
        &hello.signature,
    ) {
        return Err(HandshakeError::InvalidPeerSignature);
    }

    let secret = x25519::new(rng);
    let reply = Reply {
        ephemeral: x25519::PublicKey::from(&secret),
    };
    let key = agree(secret, &hello.ephemeral)?;
    Ok((reply, key))
}

fn agree(
    secret: x25519::EphemeralSecret,
    peer: &x25519::PublicKey,
) -> Result<SessionKey, HandshakeError> {
    let shared = secret.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(HandshakeError::SharedSecretNotContributory);
    }
    cipher::derive(shared.as_bytes())
}

/// Run the listener side of the handshake over `sink` and `stream`.
pub async fn listen<R, Si, St>(
    rng: &mut R,
    config: &Config,
    identity: &PrivateKey,
    mut sink: Si,
    mut stream: St,
) -> Result<Connection<Si, St>, HandshakeError>
where
    R: RngCore + CryptoRng + Send,
    Si: Sink,
    St: Stream,
{
    let exchange = async {
        let (state, hello) = listen_start(rng, identity);
        send_frame(&mut sink, &hello.encode(), config.max_message_size).await?;
        let msg = recv_frame(&mut stream, config.max_message_size).await?;
        let reply = Reply::decode(&msg)?;
        listen_end(state, reply)
    };
    let key = timeout(config.handshake_timeout, exchange)
        .await
        .map_err(|_| HandshakeError::Timeout)??;
    debug!("listener handshake complete");
    Ok(Connection::new(config, &key, sink, stream))
}

/// Run the dialer side of the handshake over `sink` and `stream`, expecting the listener to hold
/// the identity `peer`.
pub async fn connect<R, Si, St>(
    rng: &mut R,
    config: &Config,
    peer: &PublicKey,
    mut sink: Si,
    mut stream: St,
) -> Result<Connection<Si, St>, HandshakeError>
where
    R: RngCore + CryptoRng + Send,
    Si: Sink,
    St: Stream,
{
    let exchange = async {
        let msg = recv_frame(&mut stream, config.max_message_size).await?;
        let hello = Hello::decode(&msg)?;
        let (reply, key) = dial(rng, peer, hello)?;
        send_frame(&mut sink, &reply.encode(), config.max_message_size).await?;
        Ok::<_, HandshakeError>(key)
    };
    let key = timeout(config.handshake_timeout, exchange)
        .await
        .map_err(|_| HandshakeError::Timeout)??;
    debug!(%peer, "dialer handshake complete");
    Ok(Connection::new(config, &key, sink, stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use bytes::Bytes;
    use commonware_macros::test_traced;
    use rand::rngs::OsRng;
    use std::time::Duration;

    #[test]
    fn test_agreement_symmetry() {
        let identity = PrivateKey::from_seed(0);
        let (state, hello) = listen_start(&mut OsRng, &identity);
        let (reply, dialer_key) = dial(&mut OsRng, &identity.public_key(), hello).unwrap();
        let listener_key = listen_end(state, reply).unwrap();
        assert_eq!(dialer_key, listener_key);
    }

    #[test]
    fn test_fresh_keys_per_handshake() {
        let identity = PrivateKey::from_seed(0);
        let mut keys = Vec::new();
        for _ in 0..2 {
            let (state, hello) = listen_start(&mut OsRng, &identity);
            let (reply, key) = dial(&mut OsRng, &identity.public_key(), hello).unwrap();
            listen_end(state, reply).unwrap();
            keys.push(key);
        }
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_wrong_identity() {
        let identity = PrivateKey::from_seed(0);
        let impostor = PrivateKey::from_seed(1);
        let (_, hello) = listen_start(&mut OsRng, &impostor);
        assert!(matches!(
            dial(&mut OsRng, &identity.public_key(), hello),
            Err(HandshakeError::InvalidPeerSignature)
        ));
    }

    #[test_traced]
    fn test_signature_bit_flips() {
        let identity = PrivateKey::from_seed(0);
        let (_, hello) = listen_start(&mut OsRng, &identity);
        let encoded = hello.signature.to_vec();
        for i in 0..encoded.len() * 8 {
            let mut sig = encoded.clone();
            sig[i / 8] ^= 1 << (i % 8);

            // Some flips produce an encoding that is not a signature at all
            let Ok(signature) = Signature::try_from(sig.as_ref()) else {
                continue;
            };
            let tampered = Hello {
                ephemeral: hello.ephemeral,
                signature,
            };
            assert!(matches!(
                dial(&mut OsRng, &identity.public_key(), tampered),
                Err(HandshakeError::InvalidPeerSignature)
            ));
        }
    }

    #[test_traced]
    fn test_ephemeral_bit_flips() {
        let identity = PrivateKey::from_seed(0);
        let (_, hello) = listen_start(&mut OsRng, &identity);
        let encoded = x25519::encode_public_key(&hello.ephemeral);
        for i in 0..encoded.len() * 8 {
            let mut xpub = encoded;
            xpub[i / 8] ^= 1 << (i % 8);
            let tampered = Hello {
                ephemeral: x25519::PublicKey::from(xpub),
                signature: hello.signature.clone(),
            };
            assert!(matches!(
                dial(&mut OsRng, &identity.public_key(), tampered),
                Err(HandshakeError::InvalidPeerSignature)
            ));
        }
    }

    #[test]
    fn test_low_order_point() {
        let identity = PrivateKey::from_seed(0);
        let (state, _) = listen_start(&mut OsRng, &identity);
        let reply = Reply {
            ephemeral: x25519::PublicKey::from([0u8; 32]),
        };
        assert!(matches!(
            listen_end(state, reply),
            Err(HandshakeError::SharedSecretNotContributory)
        ));
    }

    #[test]
    fn test_hello_json() {
        let identity = PrivateKey::from_seed(0);
        let (_, hello) = listen_start(&mut OsRng, &identity);
        let encoded: serde_json::Value = serde_json::from_slice(&hello.encode()).unwrap();
        assert_eq!(encoded["xpub"].as_str().unwrap().len(), 64);
        assert_eq!(encoded["sig"].as_str().unwrap().len(), 128);

        let decoded = Hello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded.ephemeral, hello.ephemeral);
        assert_eq!(decoded.signature, hello.signature);
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            Hello::decode(b"{}"),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            Hello::decode(br#"{"xpub":"00","sig":"00"}"#),
            Err(HandshakeError::InvalidEphemeralPublicKey)
        ));
        assert!(matches!(
            Reply::decode(br#"{"xpub":"not hex"}"#),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            Reply::decode(br#"{"xpub":"0011"}"#),
            Err(HandshakeError::InvalidEphemeralPublicKey)
        ));
    }

    #[tokio::test]
    async fn test_listen_connect() {
        let identity = PrivateKey::from_seed(0);
        let peer = identity.public_key();
        let config = Config::default();
        let ((l_sink, l_stream), (d_sink, d_stream)) = mocks::duplex();

        let listener_config = config.clone();
        let listener = tokio::spawn(async move {
            listen(&mut OsRng, &listener_config, &identity, l_sink, l_stream).await
        });
        let dialer = connect(&mut OsRng, &config, &peer, d_sink, d_stream)
            .await
            .unwrap();
        let listener = listener.await.unwrap().unwrap();

        let (mut d_sender, mut d_receiver) = dialer.split();
        let (mut l_sender, mut l_receiver) = listener.split();
        d_sender.send(b"hello").await.unwrap();
        assert_eq!(l_receiver.recv().await.unwrap(), Bytes::from_static(b"hello"));
        l_sender.send(b"world").await.unwrap();
        assert_eq!(d_receiver.recv().await.unwrap(), Bytes::from_static(b"world"));
    }

    #[tokio::test]
    async fn test_connect_wrong_identity() {
        let identity = PrivateKey::from_seed(0);
        let expected = PrivateKey::from_seed(1).public_key();
        let config = Config::default();
        let ((l_sink, l_stream), (d_sink, d_stream)) = mocks::duplex();

        let listener_config = config.clone();
        let listener = tokio::spawn(async move {
            listen(&mut OsRng, &listener_config, &identity, l_sink, l_stream).await
        });
        let result = connect(&mut OsRng, &config, &expected, d_sink, d_stream).await;
        assert!(matches!(result, Err(HandshakeError::InvalidPeerSignature)));

        // The dialer hung up, so the listener observes a closed transport
        assert!(matches!(
            listener.await.unwrap(),
            Err(HandshakeError::Transport(Error::Closed))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let identity = PrivateKey::from_seed(0);
        let config = Config {
            handshake_timeout: Duration::from_millis(50),
            ..Config::default()
        };

        // The dialer never answers
        let ((l_sink, l_stream), _dialer) = mocks::duplex();
        let result = listen(&mut OsRng, &config, &identity, l_sink, l_stream).await;
        assert!(matches!(result, Err(HandshakeError::Timeout)));
    }

    #[tokio::test]
    async fn test_connect_malformed_hello() {
        let peer = PrivateKey::from_seed(0).public_key();
        let config = Config::default();
        let ((mut l_sink, _l_stream), (d_sink, d_stream)) = mocks::duplex();
        send_frame(&mut l_sink, b"{\"xpub\":42}", config.max_message_size)
            .await
            .unwrap();
        let result = connect(&mut OsRng, &config, &peer, d_sink, d_stream).await;
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }
}
