//! Prove and verify a client identity over an established channel.
//!
//! The client first sends an [IdentityProof] binding its identifier to its identity key. The
//! relay resolves the key it trusts for that identifier (see [crate::trust]), checks the proof
//! and then asks the client to sign a fresh random challenge. A captured proof is useless on its
//! own because every connection receives a different challenge.

use crate::{
    router::{Mailbox, RegistryError, Relay},
    trust::{TrustError, TrustPolicy},
    wire::{self, IdentityProof},
};
use commonware_utils::{from_hex, hex};
use rand::{CryptoRng, RngCore};
use shield_cryptography::{pem, PrivateKey, PublicKey, Signature};
use shield_stream::{
    transport::{Sink, Stream},
    ChannelError, Receiver, Sender,
};
use thiserror::Error;
use tracing::debug;

/// Domain separator for signatures over a client identifier.
pub const IDENTITY_NAMESPACE: &[u8] = b"_SHIELD_IDENTITY";

/// Domain separator for signatures over a challenge.
pub const CHALLENGE_NAMESPACE: &[u8] = b"_SHIELD_CHALLENGE";

/// Shortest challenge the relay will ever issue (in bytes).
pub const MIN_CHALLENGE_LENGTH: usize = 16;

/// Errors that can occur while authenticating a client. All of them close the connection.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid identity signature")]
    InvalidSignature,
    #[error("identifier already in use: {0}")]
    IdentifierInUse(String),
    #[error("challenge failed")]
    ChallengeFailed,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("trust error: {0}")]
    Trust(#[from] TrustError),
}

/// An identifier whose ownership was proven, registered with the router.
#[derive(Clone, Debug)]
pub struct Claim {
    pub client_id: String,
    pub public_key: PublicKey,
    /// Registration number to present when deregistering.
    pub session: u64,
}

fn signature(encoded: &str) -> Option<Signature> {
    let raw = from_hex(encoded)?;
    Signature::try_from(raw.as_slice()).ok()
}

/// Prove ownership of `client_id` with `identity`.
///
/// Returns once the challenge response is sent. The relay closes the connection if it rejects
/// the proof.
pub async fn prove<Si: Sink, St: Stream>(
    identity: &PrivateKey,
    client_id: &str,
    sender: &mut Sender<Si>,
    receiver: &mut Receiver<St>,
) -> Result<(), AuthError> {
    // Bind the identifier to our key
    let proof = IdentityProof {
        client_id: client_id.to_string(),
        signature: hex(&identity.sign(IDENTITY_NAMESPACE, client_id.as_bytes())),
        pub_key: pem::encode_public_key(&identity.public_key()),
    };
    sender.send(&wire::encode(&proof)).await?;

    // Answer the challenge
    let challenge = receiver.recv().await?;
    let challenge = std::str::from_utf8(&challenge)
        .ok()
        .and_then(from_hex)
        .ok_or_else(|| AuthError::Malformed("challenge is not hex".into()))?;
    let response = identity.sign(CHALLENGE_NAMESPACE, &challenge);
    sender.send(hex(&response).as_bytes()).await?;
    debug!(client_id, "answered challenge");
    Ok(())
}

/// Authenticates clients on behalf of the relay.
#[derive(Clone)]
pub struct Verifier<T: TrustPolicy> {
    trust: T,
    router: Mailbox,
    challenge_length: usize,
}

impl<T: TrustPolicy> Verifier<T> {
    /// Create a new verifier issuing challenges of `challenge_length` bytes (never fewer than
    /// [MIN_CHALLENGE_LENGTH]).
    pub fn new(trust: T, router: Mailbox, challenge_length: usize) -> Self {
        Self {
            trust,
            router,
            challenge_length: challenge_length.max(MIN_CHALLENGE_LENGTH),
        }
    }

    /// Authenticate the client on the other end of `sender` and `receiver` and, on success,
    /// register `relay` as its connection.
    pub async fn verify<R, Si, St>(
        &self,
        rng: &mut R,
        sender: &mut Sender<Si>,
        receiver: &mut Receiver<St>,
        relay: Relay,
    ) -> Result<Claim, AuthError>
    where
        R: RngCore + CryptoRng + Send,
        Si: Sink,
        St: Stream,
    {
        // Parse the claim
        let msg = receiver.recv().await?;
        let proof: IdentityProof = wire::decode(&msg).map_err(AuthError::Malformed)?;

        // A pinned key takes precedence over the presented one
        let public_key = match self.trust.pinned(&proof.client_id) {
            Some(pinned) => pinned,
            None => {
                let presented = pem::decode_public_key(&proof.pub_key)
                    .map_err(|err| AuthError::Malformed(err.to_string()))?;
                self.trust.pin(&proof.client_id, presented).await?
            }
        };

        // Verify the identifier signature
        let valid = signature(&proof.signature).is_some_and(|sig| {
            public_key.verify(IDENTITY_NAMESPACE, proof.client_id.as_bytes(), &sig)
        });
        if !valid {
            return Err(AuthError::InvalidSignature);
        }

        // Only one live connection per identifier
        if self.router.online(proof.client_id.clone()).await {
            return Err(AuthError::IdentifierInUse(proof.client_id));
        }

        // Challenge the client to sign fresh bytes
        let mut challenge = vec![0u8; self.challenge_length];
        rng.fill_bytes(&mut challenge);
        sender.send(hex(&challenge).as_bytes()).await?;
        let response = receiver.recv().await?;
        let valid = std::str::from_utf8(&response)
            .ok()
            .and_then(signature)
            .is_some_and(|sig| public_key.verify(CHALLENGE_NAMESPACE, &challenge, &sig));
        if !valid {
            return Err(AuthError::ChallengeFailed);
        }

        // Register the connection
        let session = self
            .router
            .register(proof.client_id.clone(), relay)
            .await
            .map_err(|err| match err {
                RegistryError::DuplicateIdentifier(client_id) => {
                    AuthError::IdentifierInUse(client_id)
                }
                RegistryError::Closed => {
                    ChannelError::Transport(shield_stream::Error::Closed).into()
                }
            })?;
        debug!(client_id = %proof.client_id, session, "client authenticated");
        Ok(Claim {
            client_id: proof.client_id,
            public_key,
            session,
        })
    }
}
