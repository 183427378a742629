use bytes::Bytes;
use futures::Stream;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

type Chunks = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy)]
enum PendingSeek {
    To(u64),
    End(i64),
}

/// Read/seek view over a stream of byte chunks, e.g. a peer's response body.
///
/// Chunks are pulled only as far as the logical position requires and kept
/// in a growing buffer, so seeking backwards is free. Seeking to the end, or
/// reading with no limit, drains the source; from then on the reader behaves
/// like an in-memory buffer.
pub struct StreamedReader {
    chunks: Chunks,
    buffer: Vec<u8>,
    position: u64,
    exhausted: bool,
    pending_seek: Option<PendingSeek>,
}

impl StreamedReader {
    pub fn new<S>(chunks: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            chunks: Box::pin(chunks),
            buffer: Vec::new(),
            position: 0,
            exhausted: false,
            pending_seek: None,
        }
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Bytes pulled from the source so far.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_drained(&self) -> bool {
        self.exhausted
    }

    /// Reads exactly `n` bytes, or up to EOF if fewer remain. `None` reads
    /// everything that is left.
    pub async fn read_bytes(&mut self, n: Option<usize>) -> io::Result<Bytes> {
        let target = n.map(|n| self.position.saturating_add(n as u64));
        futures::future::poll_fn(|cx| self.poll_fill(cx, target)).await?;

        let len = self.buffer.len();
        let start = (self.position as usize).min(len);
        let end = target.map_or(len, |t| t.min(len as u64) as usize);
        let out = Bytes::copy_from_slice(&self.buffer[start..end]);
        self.position = end as u64;
        Ok(out)
    }

    /// Releases the buffer and detaches from the source.
    pub fn close(&mut self) {
        self.buffer = Vec::new();
        self.position = 0;
        self.exhausted = true;
        self.pending_seek = None;
        self.chunks = Box::pin(futures::stream::empty());
    }

    /// Pulls chunks until `target` bytes are buffered, or until the source
    /// ends. `None` means drain.
    fn poll_fill(&mut self, cx: &mut Context<'_>, target: Option<u64>) -> Poll<io::Result<()>> {
        while !self.exhausted && target.map_or(true, |t| (self.buffer.len() as u64) < t) {
            match ready!(self.chunks.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => self.exhausted = true,
            }
        }
        Poll::Ready(Ok(()))
    }
}

fn offset(base: u64, delta: i64) -> io::Result<u64> {
    let target = base as i128 + delta as i128;
    if target < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative position",
        ));
    }
    Ok(target as u64)
}

impl AsyncRead for StreamedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.position >= this.buffer.len() as u64 {
            ready!(this.poll_fill(cx, Some(this.position + 1)))?;
        }

        let start = this.position as usize;
        let available = this.buffer.len().saturating_sub(start);
        let n = available.min(buf.remaining());
        if n > 0 {
            buf.put_slice(&this.buffer[start..start + n]);
            this.position += n as u64;
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for StreamedReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        let pending = match position {
            SeekFrom::Start(n) => PendingSeek::To(n),
            SeekFrom::Current(delta) => PendingSeek::To(offset(this.position, delta)?),
            SeekFrom::End(delta) => PendingSeek::End(delta),
        };
        this.pending_seek = Some(pending);
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        let Some(pending) = this.pending_seek else {
            return Poll::Ready(Ok(this.position));
        };

        let target = match pending {
            PendingSeek::To(n) => Some(n),
            PendingSeek::End(_) => None,
        };
        let filled = ready!(this.poll_fill(cx, target));
        this.pending_seek = None;
        filled?;

        let len = this.buffer.len() as u64;
        // Positions past EOF clamp to EOF.
        this.position = match pending {
            PendingSeek::To(n) => n.min(len),
            PendingSeek::End(delta) => offset(len, delta)?.min(len),
        };
        Poll::Ready(Ok(this.position))
    }
}
