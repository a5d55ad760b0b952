use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::{Digest, DigestState};

/// Pass-through reader that digests every byte it yields.
///
/// The digest is only meaningful once the inner reader is exhausted; [`finish`](Self::finish)
/// drains whatever is left before producing it.
pub struct DigestingReader<R> {
    inner: R,
    state: Box<dyn DigestState>,
    consumed: u64,
}

impl<R> DigestingReader<R> {
    pub fn new(inner: R, state: Box<dyn DigestState>) -> Self {
        Self {
            inner,
            state,
            consumed: 0,
        }
    }

    /// Bytes passed through so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: AsyncRead + Unpin> DigestingReader<R> {
    /// Read the remainder of the stream and return its digest
    pub async fn finish(mut self) -> io::Result<Digest> {
        tokio::io::copy(&mut self, &mut tokio::io::sink()).await?;
        Ok(self.state.finish())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DigestingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        this.state.update(fresh);
        this.consumed += fresh.len() as u64;
        Poll::Ready(Ok(()))
    }
}
