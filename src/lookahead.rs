use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// A byte stream with non-destructive lookahead.
///
/// Bytes returned by [`LookaheadStream::peek`] are kept in an internal buffer and handed out again
/// by the [`AsyncRead`] implementation before anything else is read from the underlying stream, so
/// every byte received is observed exactly once and in order by the eventual reader.
#[derive(Debug)]
pub struct LookaheadStream<S> {
    inner: S,
    // Bytes read from `inner` but not consumed yet start at `position`.
    buffer: Vec<u8>,
    position: usize,
}

impl<S> LookaheadStream<S> {
    pub fn new(inner: S) -> Self {
        LookaheadStream {
            inner,
            buffer: Vec::new(),
            position: 0,
        }
    }

    /// The peeked bytes that haven't been consumed by a read yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.position..]
    }
}

impl<S: AsyncRead + Unpin> LookaheadStream<S> {
    /// Return the next `len` bytes without advancing the read position.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the stream ends before `len` bytes arrive.
    pub async fn peek(&mut self, len: usize) -> io::Result<&[u8]> {
        while self.buffer.len() - self.position < len {
            if self.position > 0 {
                self.buffer.drain(..self.position);
                self.position = 0;
            }
            self.buffer.reserve(len - self.buffer.len());
            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream closed after {} of {len} bytes",
                        self.buffer.len()
                    ),
                ));
            }
        }
        Ok(&self.buffer[self.position..self.position + len])
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for LookaheadStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.position < this.buffer.len() {
            let unread = &this.buffer[this.position..];
            let len = unread.len().min(buf.remaining());
            buf.put_slice(&unread[..len]);
            this.position += len;
            if this.position == this.buffer.len() {
                // Drained; release the lookahead memory for long-lived connections.
                this.buffer = Vec::new();
                this.position = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for LookaheadStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
