//! Raw bidirectional transport consumed by this crate.
//!
//! A transport moves bytes in order and reports failure; it does not encrypt or authenticate
//! anything. Frames are layered on top with [crate::utils::codec]. Closing a connection is done by
//! dropping its [Sink] and [Stream].

use crate::Error;
use std::{future::Future, net::SocketAddr};

/// Interface that any transport must implement to send bytes over a connection.
pub trait Sink: Send + 'static {
    /// Send all of `msg` to the sink.
    fn send(&mut self, msg: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Interface that any transport must implement to receive bytes over a connection.
pub trait Stream: Send + 'static {
    /// Receive exactly `buf.len()` bytes from the stream.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Interface that any transport must implement to handle incoming connections.
pub trait Listener: Send + 'static {
    /// The type of [Sink] that's returned when accepting a connection.
    type Sink: Sink;
    /// The type of [Stream] that's returned when accepting a connection.
    type Stream: Stream;

    /// Accept an incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(SocketAddr, Self::Sink, Self::Stream), Error>> + Send;

    /// Returns the local address of the listener.
    fn local_addr(&self) -> Result<SocketAddr, std::io::Error>;
}
