use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Reader that reports every successful read to a callback
pub struct ProgressReader<R, F> {
    inner: R,
    on_read: F,
}

impl<R, F> ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: Fn(usize) + Unpin,
{
    pub fn new(inner: R, on_read: F) -> Self {
        Self { inner, on_read }
    }
}

impl<R, F> AsyncRead for ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: Fn(usize) + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            if n > 0 {
                (this.on_read)(n);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_counts_bytes() {
        let seen = AtomicUsize::new(0);
        let data: &[u8] = &[7u8; 10_000];
        let mut reader = ProgressReader::new(data, |n| {
            seen.fetch_add(n, Ordering::Relaxed);
        });

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        assert_eq!(sink.len(), 10_000);
        assert_eq!(seen.load(Ordering::Relaxed), 10_000);
    }
}
