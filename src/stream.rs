use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use futures::stream::FusedStream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::AsyncSeekStart;

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Response body over a window of a resource. Implements [`Stream`],
/// [`Body`], and [`IntoResponse`].
///
/// Nothing is read until the stream is polled, and at most one 64 KiB
/// buffer is held at a time. Dropping the stream drops
/// the reader, which closes the underlying file.
#[pin_project]
pub struct WindowStream<B> {
    state: StreamState,
    length: u64,
    #[pin]
    body: B,
}

impl<B: AsyncRead + AsyncSeekStart> WindowStream<B> {
    /// Streams `length` bytes of `body` starting at byte offset `start`.
    pub fn new(body: B, start: u64, length: u64) -> Self {
        let state = if length == 0 {
            StreamState::Done
        } else {
            StreamState::Seek { start }
        };
        WindowStream { state, length, body }
    }

    /// Total number of bytes this stream yields when read to the end.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl<B> std::fmt::Debug for WindowStream<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .finish()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Done,
}

impl<B: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for WindowStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: AsyncRead + AsyncSeekStart> Body for WindowStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: AsyncRead + AsyncSeekStart> FusedStream for WindowStream<B> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, StreamState::Done)
    }
}

impl<B: AsyncRead + AsyncSeekStart> Stream for WindowStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.project();

        let result = poll_window(this.state, this.body, *this.length, cx);
        if let Poll::Ready(Some(Err(e))) = &result {
            tracing::error!(error = %e, "resource read failed mid-stream");
            // a failed read ends the stream, the body must not look complete
            *this.state = StreamState::Done;
        }
        result
    }
}

fn poll_window<B: AsyncRead + AsyncSeekStart>(
    state: &mut StreamState,
    mut body: Pin<&mut B>,
    length: u64,
    cx: &mut Context<'_>,
) -> Poll<Option<io::Result<Bytes>>> {
    if let StreamState::Seek { start } = *state {
        match body.as_mut().start_seek(start) {
            Err(e) => { return Poll::Ready(Some(Err(e))); }
            Ok(()) => {
                *state = StreamState::Seeking { remaining: length };
            }
        }
    }

    if let StreamState::Seeking { remaining } = *state {
        match body.as_mut().poll_complete(cx) {
            Poll::Pending => { return Poll::Pending; }
            Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
            Poll::Ready(Ok(())) => {
                let buffer = allocate_buffer();
                *state = StreamState::Reading { buffer, remaining };
            }
        }
    }

    match state {
        StreamState::Reading { buffer, remaining } => {
            // never read past the end of the window
            let nbytes = IO_BUFFER_SIZE.min(usize::try_from(*remaining).unwrap_or(usize::MAX));
            buffer.resize(nbytes, 0);

            let mut read_buf = ReadBuf::new(&mut buffer[..]);
            match body.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
                Poll::Ready(Ok(())) => {
                    let n = read_buf.filled().len();
                    if n == 0 {
                        let e = io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("resource ended with {remaining} bytes of the window unread"),
                        );
                        return Poll::Ready(Some(Err(e)));
                    }

                    buffer.truncate(n);
                    let chunk = mem::replace(buffer, allocate_buffer()).freeze();
                    *remaining -= n as u64;
                    if *remaining == 0 {
                        *state = StreamState::Done;
                    }
                    Poll::Ready(Some(Ok(chunk)))
                }
            }
        }
        StreamState::Done => Poll::Ready(None),
        StreamState::Seek { .. } | StreamState::Seeking { .. } => unreachable!(),
    }
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::{pin_mut, StreamExt};
    use tokio::io::AsyncSeek;

    use super::*;

    /// Cursor that fails once `fail_at` is reached and records being dropped.
    struct Faulty {
        inner: Cursor<Vec<u8>>,
        fail_at: u64,
        dropped: Arc<AtomicBool>,
    }

    impl Faulty {
        fn new(data: Vec<u8>, fail_at: u64) -> (Self, Arc<AtomicBool>) {
            let dropped = Arc::new(AtomicBool::new(false));
            let faulty = Faulty { inner: Cursor::new(data), fail_at, dropped: dropped.clone() };
            (faulty, dropped)
        }
    }

    impl Drop for Faulty {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl AsyncRead for Faulty {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.inner.position() >= self.fail_at {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk on fire")));
            }
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for Faulty {
        fn start_seek(mut self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
            AsyncSeek::start_seek(Pin::new(&mut self.inner), position)
        }

        fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            AsyncSeek::poll_complete(Pin::new(&mut self.inner), cx)
        }
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn collect(stream: impl Stream<Item = io::Result<Bytes>>) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_window_bytes() {
        let source = b"Hello world this is a file to test range requests on!\n".to_vec();
        let stream = WindowStream::new(Cursor::new(source), 30, 24);
        assert_eq!(24, stream.len());
        assert_eq!(b"test range requests on!\n".to_vec(), collect(stream).await.unwrap());
    }

    #[tokio::test]
    async fn test_large_window_is_chunked() {
        let source = data(300 * 1024);
        let stream = WindowStream::new(Cursor::new(source.clone()), 1000, 200 * 1024);
        pin_mut!(stream);

        let mut received = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= IO_BUFFER_SIZE);
            received.extend_from_slice(&chunk);
            chunks += 1;
        }
        assert!(chunks >= 4);
        assert_eq!(&source[1000..1000 + 200 * 1024], &received[..]);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let stream = WindowStream::new(Cursor::new(data(10)), 0, 0);
        assert!(stream.is_empty());
        assert!(stream.is_end_stream());
        assert!(collect(stream).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_error_is_terminal() {
        let (reader, _) = Faulty::new(data(200 * 1024), 70 * 1024);
        let stream = WindowStream::new(reader, 0, 200 * 1024);
        pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(IO_BUFFER_SIZE, first.len());
        // the second read starts before the failure point, the third after it
        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!("disk on fire", err.to_string());
        assert!(stream.next().await.is_none());
        assert!(stream.is_terminated());
    }

    #[tokio::test]
    async fn test_truncated_resource_is_an_error() {
        // the resource is shorter than the window it was described with
        let stream = WindowStream::new(Cursor::new(data(100)), 50, 100);
        let err = collect(stream).await.unwrap_err();
        assert_eq!(io::ErrorKind::UnexpectedEof, err.kind());
    }

    #[tokio::test]
    async fn test_drop_releases_reader() {
        let (reader, dropped) = Faulty::new(data(200 * 1024), u64::MAX);
        let mut stream = Box::pin(WindowStream::new(reader, 0, 200 * 1024));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(IO_BUFFER_SIZE, first.len());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
