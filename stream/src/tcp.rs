//! TCP transport backed by [tokio].

use crate::Error;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time::timeout,
};
use tracing::warn;

/// Implementation of [crate::transport::Sink] over a TCP connection.
pub struct Sink {
    write_timeout: Duration,
    sink: OwnedWriteHalf,
}

impl crate::transport::Sink for Sink {
    async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        // Time out if we take too long to write
        timeout(self.write_timeout, self.sink.write_all(msg))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::SendFailed)?;
        Ok(())
    }
}

/// Implementation of [crate::transport::Stream] over a TCP connection.
///
/// Uses a [`BufReader`] to reduce syscall overhead. Multiple small reads
/// can be satisfied from the buffer without additional network operations.
pub struct Stream {
    read_timeout: Duration,
    stream: BufReader<OwnedReadHalf>,
}

impl crate::transport::Stream for Stream {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }

        // Time out if we take too long to read
        timeout(self.read_timeout, self.stream.read_exact(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::Closed,
                _ => Error::RecvFailed,
            })?;
        Ok(())
    }
}

/// Implementation of [crate::transport::Listener] over a TCP socket.
pub struct Listener {
    cfg: Config,
    listener: TcpListener,
}

impl crate::transport::Listener for Listener {
    type Sink = Sink;
    type Stream = Stream;

    async fn accept(&mut self) -> Result<(SocketAddr, Self::Sink, Self::Stream), Error> {
        // Accept a new TCP stream
        let (stream, addr) = self.listener.accept().await.map_err(|_| Error::Closed)?;
        let (sink, stream) = self.cfg.split(stream);
        Ok((addr, sink, stream))
    }

    fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }
}

/// Configuration for the TCP [Network].
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether or not to disable Nagle's algorithm.
    ///
    /// Chat traffic is made of small, latency-sensitive frames, so disabling the algorithm
    /// sends them as soon as possible.
    pub tcp_nodelay: Option<bool>,

    /// Read timeout for connections, after which the connection will be closed.
    ///
    /// This doubles as the keepalive of idle connections: a peer that sends nothing for this
    /// long is disconnected.
    pub read_timeout: Duration,

    /// Write timeout for connections, after which the connection will be closed.
    pub write_timeout: Duration,

    /// Size of the read buffer for batching network reads.
    pub read_buffer_size: usize,
}

impl Config {
    fn split(&self, stream: TcpStream) -> (Sink, Stream) {
        // Set TCP_NODELAY if configured
        if let Some(tcp_nodelay) = self.tcp_nodelay {
            if let Err(err) = stream.set_nodelay(tcp_nodelay) {
                warn!(?err, "failed to set TCP_NODELAY");
            }
        }

        let (read_half, write_half) = stream.into_split();
        (
            Sink {
                write_timeout: self.write_timeout,
                sink: write_half,
            },
            Stream {
                read_timeout: self.read_timeout,
                stream: BufReader::with_capacity(self.read_buffer_size, read_half),
            },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_nodelay: Some(true),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(30),
            read_buffer_size: 64 * 1024,
        }
    }
}

/// TCP network that binds listeners and dials remote sockets.
#[derive(Clone, Debug, Default)]
pub struct Network {
    cfg: Config,
}

impl From<Config> for Network {
    fn from(cfg: Config) -> Self {
        Self { cfg }
    }
}

impl Network {
    /// Bind to the given socket address.
    pub async fn bind(&self, socket: SocketAddr) -> Result<Listener, Error> {
        TcpListener::bind(socket)
            .await
            .map_err(|_| Error::BindFailed)
            .map(|listener| Listener {
                cfg: self.cfg.clone(),
                listener,
            })
    }

    /// Dial the given socket address.
    pub async fn dial(&self, socket: SocketAddr) -> Result<(Sink, Stream), Error> {
        let stream = TcpStream::connect(socket)
            .await
            .map_err(|_| Error::DialFailed)?;
        Ok(self.cfg.split(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Listener as _, Sink as _, Stream as _};

    #[tokio::test]
    async fn test_loopback() {
        let network = Network::default();
        let mut listener = network.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = listener.local_addr().unwrap();

        let (mut dialer_sink, mut dialer_stream) = network.dial(address).await.unwrap();
        let (_, mut listener_sink, mut listener_stream) = listener.accept().await.unwrap();

        dialer_sink.send(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        listener_stream.recv(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        listener_sink.send(b"world").await.unwrap();
        dialer_stream.recv(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        // Dropping the sink closes the connection
        drop(dialer_sink);
        drop(dialer_stream);
        assert!(matches!(
            listener_stream.recv(&mut buf).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let network = Network::from(Config {
            read_timeout: Duration::from_millis(50),
            ..Default::default()
        });
        let mut listener = network.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let address = listener.local_addr().unwrap();

        let _dialer = network.dial(address).await.unwrap();
        let (_, _sink, mut stream) = listener.accept().await.unwrap();

        let mut buf = [0u8; 1];
        assert!(matches!(stream.recv(&mut buf).await, Err(Error::Timeout)));
    }
}
