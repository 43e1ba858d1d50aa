#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shield_stream::{
    channel::{Channel, NONCE_LENGTH},
    cipher, Envelope,
};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ikm: [u8; 32],
    nonce: [u8; NONCE_LENGTH],
    ciphertext: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let key = cipher::derive(&input.ikm).unwrap();
    let channel = Channel::new(&key);

    // Forged envelopes never open
    let envelope = Envelope {
        nonce: input.nonce,
        ciphertext: input.ciphertext,
    };
    assert!(channel.open(&envelope).is_err());
});
