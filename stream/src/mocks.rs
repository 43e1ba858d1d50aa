//! In-memory transport for tests and simulations.

use crate::Error;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Sending half of an in-memory [Channel].
pub struct Sink {
    sender: mpsc::UnboundedSender<Bytes>,
}

impl crate::transport::Sink for Sink {
    async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        if msg.is_empty() {
            return Ok(());
        }
        self.sender
            .send(Bytes::copy_from_slice(msg))
            .map_err(|_| Error::Closed)
    }
}

/// Receiving half of an in-memory [Channel].
pub struct Stream {
    receiver: mpsc::UnboundedReceiver<Bytes>,
    buffer: BytesMut,
}

impl crate::transport::Stream for Stream {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        // Bytes are moved into the local buffer as they arrive, so dropping this
        // future part-way never loses data.
        while self.buffer.len() < buf.len() {
            match self.receiver.recv().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return Err(Error::Closed),
            }
        }
        buf.copy_from_slice(&self.buffer.split_to(buf.len()));
        Ok(())
    }
}

/// A unidirectional in-memory byte pipe.
pub struct Channel;

impl Channel {
    /// Returns a connected [Sink] and [Stream]. Dropping the [Sink] closes the [Stream].
    pub fn init() -> (Sink, Stream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Sink { sender },
            Stream {
                receiver,
                buffer: BytesMut::new(),
            },
        )
    }
}

/// Returns two ends of a bidirectional in-memory connection.
pub fn duplex() -> ((Sink, Stream), (Sink, Stream)) {
    let (a_sink, b_stream) = Channel::init();
    let (b_sink, a_stream) = Channel::init();
    ((a_sink, a_stream), (b_sink, b_stream))
}
