use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use rustls::ServerConfig;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::{
    classifier::{Protocol, classify_stream},
    lookahead::LookaheadStream,
    tls::LazyTlsStream,
};

/// Default time a peer has to send enough bytes to be classified.
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection-level data attached to every HTTP request as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub protocol: Protocol,
    pub remote_address: SocketAddr,
}

#[derive(thiserror::Error, Debug)]
pub enum AcceptError {
    #[error("Unable to accept connection: {0}")]
    Listener(#[source] io::Error),
    #[error("Connection from {address} closed before it could be classified")]
    ShortRead { address: SocketAddr },
    #[error("Timed out classifying connection from {address}")]
    Timeout { address: SocketAddr },
    #[error("Error classifying connection from {address}: {source}")]
    Io {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A classified connection: either a TLS session (handshaking lazily) or the plain stream.
///
/// In both cases the bytes peeked during classification are the first bytes read by the
/// consumer (through the TLS layer for encrypted connections).
pub enum SplitStream<S> {
    Plain(LookaheadStream<S>),
    Encrypted(Box<LazyTlsStream<LookaheadStream<S>>>),
}

impl<S> SplitStream<S> {
    pub fn protocol(&self) -> Protocol {
        match self {
            SplitStream::Plain(_) => Protocol::Plain,
            SplitStream::Encrypted(_) => Protocol::Encrypted,
        }
    }
}

impl<S> AsyncRead for SplitStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SplitStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            SplitStream::Encrypted(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S> AsyncWrite for SplitStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SplitStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            SplitStream::Encrypted(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SplitStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            SplitStream::Encrypted(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SplitStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            SplitStream::Encrypted(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Classifies accepted streams and wraps the encrypted ones in TLS.
#[derive(Clone)]
pub struct SplitAcceptor {
    acceptor: TlsAcceptor,
    classify_timeout: Duration,
}

impl SplitAcceptor {
    pub fn new(tls_config: Arc<ServerConfig>, classify_timeout: Duration) -> Self {
        SplitAcceptor {
            acceptor: TlsAcceptor::from(tls_config),
            classify_timeout,
        }
    }

    /// Peek the start of `stream` and return it as a plain or TLS stream.
    ///
    /// On failure, the stream is dropped (closing the connection).
    pub async fn split<S>(
        &self,
        stream: S,
        address: SocketAddr,
    ) -> Result<SplitStream<S>, AcceptError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = LookaheadStream::new(stream);
        let classified = timeout(self.classify_timeout, classify_stream(&mut stream)).await;
        let protocol = match classified {
            Ok(Ok(protocol)) => protocol,
            Ok(Err(error)) if error.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(%address, buffered = stream.buffered().len(), "Short read while classifying.");
                return Err(AcceptError::ShortRead { address });
            }
            Ok(Err(error)) => {
                debug!(%address, %error, "Error while classifying.");
                return Err(AcceptError::Io {
                    address,
                    source: error,
                });
            }
            Err(_) => {
                debug!(%address, "Timed out while classifying.");
                return Err(AcceptError::Timeout { address });
            }
        };
        debug!(%address, ?protocol, "Classified connection.");
        Ok(match protocol {
            Protocol::Encrypted => {
                SplitStream::Encrypted(Box::new(LazyTlsStream::new(&self.acceptor, stream)))
            }
            Protocol::Plain => SplitStream::Plain(stream),
        })
    }
}

/// A TCP listener that serves TLS and plaintext on the same port.
pub struct SplitListener {
    listener: TcpListener,
    acceptor: SplitAcceptor,
}

impl SplitListener {
    pub fn new(listener: TcpListener, acceptor: SplitAcceptor) -> Self {
        SplitListener { listener, acceptor }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn acceptor(&self) -> &SplitAcceptor {
        &self.acceptor
    }

    /// Accept and classify the next connection.
    ///
    /// An error only concerns the current connection; the listener can keep accepting.
    pub async fn accept(&self) -> Result<(SplitStream<TcpStream>, SocketAddr), AcceptError> {
        let (stream, address) = self.accept_raw().await?;
        let stream = self.acceptor.split(stream, address).await?;
        Ok((stream, address))
    }

    /// Accept the next connection without classifying it, so that classification can happen
    /// in the connection's own task.
    pub async fn accept_raw(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        let (stream, address) = self.listener.accept().await.map_err(AcceptError::Listener)?;
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%error, %address, "Error setting nodelay.");
        }
        Ok((stream, address))
    }
}
