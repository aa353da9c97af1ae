//! Client stream abstraction.
//!
//! One stream type for plaintext, TLS and caller-supplied transports, so
//! the protocol layer does not care how the bytes travel.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Any bidirectional byte stream usable as an IRC transport.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// A connection to the IRC server.
pub enum IrcStream {
    /// Plaintext TCP connection.
    Plain(TcpStream),
    /// TLS-encrypted connection.
    Tls(Box<TlsStream<TcpStream>>),
    /// Any other transport, e.g. an in-memory pipe.
    Custom(Box<dyn AsyncStream>),
}

impl IrcStream {
    /// Wrap an arbitrary transport.
    pub fn custom(stream: impl AsyncStream + 'static) -> Self {
        Self::Custom(Box::new(stream))
    }

    /// Returns true if this is a TLS-encrypted connection.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for IrcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            IrcStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            IrcStream::Custom(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IrcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            IrcStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            IrcStream::Custom(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            IrcStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            IrcStream::Custom(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IrcStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            IrcStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            IrcStream::Custom(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
