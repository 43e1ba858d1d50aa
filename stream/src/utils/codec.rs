use crate::{
    transport::{Sink, Stream},
    Error,
};
use bytes::Bytes;

/// Sends data to the sink with a 4-byte length prefix.
/// Returns an error if the message is too large or the stream is closed.
pub async fn send_frame<S: Sink>(
    sink: &mut S,
    buf: &[u8],
    max_message_size: usize,
) -> Result<(), Error> {
    // Validate frame size
    let n = buf.len();
    if n == 0 {
        return Err(Error::SendZeroSize);
    }
    if n > max_message_size {
        return Err(Error::SendTooLarge(n));
    }
    let len: u32 = n.try_into().map_err(|_| Error::SendTooLarge(n))?;

    // Prefix the message with its length and send both at once
    let mut frame = Vec::with_capacity(4 + n);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(buf);
    sink.send(&frame).await
}

/// Receives data from the stream with a 4-byte length prefix.
/// Returns an error if the message is too large or the stream is closed.
pub async fn recv_frame<T: Stream>(stream: &mut T, max_message_size: usize) -> Result<Bytes, Error> {
    // Read the first 4 bytes to get the length of the message
    let mut buf = [0u8; 4];
    stream.recv(&mut buf).await?;

    // Validate frame size
    let len = u32::from_be_bytes(buf) as usize;
    if len > max_message_size {
        return Err(Error::RecvTooLarge(len));
    }
    if len == 0 {
        return Err(Error::Closed);
    }

    // Read the rest of the message
    let mut buf = vec![0u8; len];
    stream.recv(&mut buf).await?;
    Ok(Bytes::from(buf))
}
