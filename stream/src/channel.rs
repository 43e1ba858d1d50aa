//! Authenticated encryption of application payloads with a [SessionKey].

use crate::{
    cipher::SessionKey,
    replay::ReplayGuard,
    transport::{Sink, Stream},
    utils::codec::{recv_frame, send_frame},
    wire, Config, Error,
};
use bytes::Bytes;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305};
use commonware_utils::hex;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use thiserror::Error;
use tracing::debug;

/// Size of the random nonce drawn for every envelope (96 bits).
pub const NONCE_LENGTH: usize = 12;

/// Size of the Poly1305 authentication tag appended to every ciphertext.
pub const TAG_LENGTH: usize = 16;

/// Errors that can occur when exchanging encrypted messages.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The authentication tag did not verify (wrong key, altered nonce or ciphertext).
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(#[from] Error),
}

/// A nonce and the ciphertext sealed under it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode as `{"nonce": <hex>, "ciphertext": <hex>}`.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode(&wire::Envelope {
            nonce: hex(&self.nonce),
            ciphertext: hex(&self.ciphertext),
        })
    }

    /// Decode from its JSON form.
    pub fn decode(buf: &[u8]) -> Result<Self, ChannelError> {
        let envelope: wire::Envelope = wire::decode(buf).map_err(ChannelError::Malformed)?;
        let nonce = wire::fixed("nonce", &envelope.nonce).map_err(ChannelError::Malformed)?;
        let ciphertext =
            wire::field("ciphertext", &envelope.ciphertext).map_err(ChannelError::Malformed)?;
        if ciphertext.len() < TAG_LENGTH {
            return Err(ChannelError::Malformed("ciphertext shorter than tag".into()));
        }
        Ok(Self { nonce, ciphertext })
    }
}

/// Seals and opens [Envelope]s with a single session key.
#[derive(Clone)]
pub struct Channel {
    cipher: ChaCha20Poly1305,
}

impl Channel {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: key.cipher(),
        }
    }

    /// Encrypt `plaintext` under a freshly drawn random nonce.
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Envelope, ChannelError> {
        let mut nonce = [0u8; NONCE_LENGTH];
        rng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(&nonce.into(), plaintext)
            .map_err(|_| ChannelError::EncryptionFailed)?;
        Ok(Envelope { nonce, ciphertext })
    }

    /// Decrypt `envelope`, failing if its tag does not verify.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, ChannelError> {
        self.cipher
            .decrypt(&envelope.nonce.into(), envelope.ciphertext.as_ref())
            .map_err(|_| ChannelError::AuthenticationFailed)
    }
}

/// A transport bound to a session key.
pub struct Connection<Si: Sink, St: Stream> {
    config: Config,
    channel: Channel,
    sink: Si,
    stream: St,
}

impl<Si: Sink, St: Stream> Connection<Si, St> {
    pub fn new(config: &Config, key: &SessionKey, sink: Si, stream: St) -> Self {
        Self {
            config: config.clone(),
            channel: Channel::new(key),
            sink,
            stream,
        }
    }

    /// Split the connection into a [Sender] and a [Receiver] that can be driven independently.
    pub fn split(self) -> (Sender<Si>, Receiver<St>) {
        (
            Sender {
                sink: self.sink,
                max_message_size: self.config.max_message_size,
                channel: self.channel.clone(),
            },
            Receiver {
                stream: self.stream,
                max_message_size: self.config.max_message_size,
                channel: self.channel,
                guard: ReplayGuard::new(self.config.nonce_history),
            },
        )
    }
}

/// The half of a [Connection] that encrypts and sends.
pub struct Sender<Si: Sink> {
    sink: Si,
    max_message_size: usize,
    channel: Channel,
}

impl<Si: Sink> Sender<Si> {
    /// Seal `msg` and send it as a single frame.
    pub async fn send(&mut self, msg: &[u8]) -> Result<(), ChannelError> {
        let envelope = self.channel.seal(&mut OsRng, msg)?;
        send_frame(&mut self.sink, &envelope.encode(), self.max_message_size).await?;
        Ok(())
    }
}

/// The half of a [Connection] that receives and decrypts.
pub struct Receiver<St: Stream> {
    stream: St,
    max_message_size: usize,
    channel: Channel,
    guard: ReplayGuard<NONCE_LENGTH>,
}

impl<St: Stream> Receiver<St> {
    /// Receive the next message that was not seen before on this connection.
    ///
    /// Replayed envelopes are dropped without surfacing an error. Any other failure is fatal
    /// to the connection.
    pub async fn recv(&mut self) -> Result<Bytes, ChannelError> {
        loop {
            let frame = recv_frame(&mut self.stream, self.max_message_size).await?;
            let envelope = Envelope::decode(&frame)?;
            if self.guard.observe(envelope.nonce) {
                debug!(nonce = %hex(&envelope.nonce), "dropping replayed envelope");
                continue;
            }
            return self.channel.open(&envelope).map(Bytes::from);
        }
    }
}
