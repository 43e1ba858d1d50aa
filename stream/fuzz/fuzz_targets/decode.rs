#![no_main]

use libfuzzer_sys::fuzz_target;
use shield_stream::{
    handshake::{Hello, Reply},
    Envelope,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(hello) = Hello::decode(data) {
        assert!(Hello::decode(&hello.encode()).is_ok());
    }
    if let Ok(reply) = Reply::decode(data) {
        assert!(Reply::decode(&reply.encode()).is_ok());
    }
    if let Ok(envelope) = Envelope::decode(data) {
        assert_eq!(Envelope::decode(&envelope.encode()).unwrap(), envelope);
    }
});
