use std::{
    ops::ControlFlow,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::StreamExt;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::{Body, Frame};

use crate::error::Error;

/// Body type accepted by [`crate::http_client::HttpClient`].
///
/// Either a complete in-memory payload (queries, small inserts) or a
/// channel-fed stream whose other end is a [`ChunkSender`] (progressive
/// inserts).
pub(crate) struct RequestBody(BoxBody<Bytes, Error>);

impl RequestBody {
    pub(crate) fn empty() -> Self {
        Self(
            Empty::new()
                .map_err(|never: std::convert::Infallible| match never {})
                .boxed(),
        )
    }

    pub(crate) fn full(bytes: Bytes) -> Self {
        Self(
            Full::new(bytes)
                .map_err(|never: std::convert::Infallible| match never {})
                .boxed(),
        )
    }

    /// Creates a body fed by a background task through the returned sender.
    pub(crate) fn chunked() -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::channel(1);
        let stream = rx.map(|bytes: Bytes| Ok::<_, Error>(Frame::data(bytes)));
        (
            ChunkSender(tx),
            Self(BodyExt::boxed(http_body_util::StreamBody::new(stream))),
        )
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().0).poll_frame(cx)
    }
}

/// The writing half of a [`RequestBody::chunked`] pair.
pub(crate) struct ChunkSender(mpsc::Sender<Bytes>);

impl ChunkSender {
    /// Polls for capacity to send another chunk without blocking.
    ///
    /// Returns `Ready(false)` if the receiving end (the HTTP request body)
    /// has been dropped, e.g. because the connection failed.
    pub(crate) fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
        self.0.poll_ready(cx).map(|res| res.is_ok())
    }

    /// Attempts to hand off a chunk without blocking.
    ///
    /// Must only be called after [`poll_ready`](Self::poll_ready) returned
    /// `Ready(true)`. Returns the bytes back on transient backpressure so the
    /// caller can retry after polling readiness again.
    pub(crate) fn try_send(&mut self, bytes: Bytes) -> ControlFlow<crate::error::Result<()>, Bytes> {
        match self.0.try_send(bytes) {
            Ok(()) => ControlFlow::Break(Ok(())),
            Err(err) if err.is_full() => ControlFlow::Continue(err.into_inner()),
            Err(err) => ControlFlow::Break(Err(Error::Network(err.into()))),
        }
    }

    /// Ends the stream, letting the server process what has been sent so far.
    pub(crate) fn close(&mut self) {
        self.0.close_channel();
    }

    /// Drops the sender without a clean close, causing the server to see a
    /// truncated body and reject the whole `INSERT`.
    pub(crate) fn abort(self) {
        drop(self);
    }

    /// Sends a complete chunk, retrying until capacity is available.
    pub(crate) async fn send(&mut self, mut bytes: Bytes) -> crate::error::Result<()> {
        loop {
            if !std::future::poll_fn(|cx| self.poll_ready(cx)).await {
                return Err(Error::Network("request body receiver dropped".into()));
            }
            match self.try_send(bytes) {
                ControlFlow::Break(result) => return result,
                ControlFlow::Continue(unsent) => bytes = unsent,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn chunked_body_streams_sent_bytes() {
        let (mut sender, body) = RequestBody::chunked();
        assert!(matches!(
            sender.try_send(Bytes::from_static(b"abc")),
            ControlFlow::Break(Ok(()))
        ));
        sender.close();

        let mut stream = body.0.into_data_stream();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert!(stream.next().await.is_none());
    }
}
