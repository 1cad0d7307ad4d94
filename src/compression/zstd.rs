use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_util::stream::Stream;

use crate::{
    error::{Error, Result},
    response::Chunk,
};

/// Decodes a zstd-compressed response body.
///
/// Unlike [`crate::compression::lz4::Lz4Decoder`], ClickHouse doesn't frame
/// zstd responses into independently-decodable blocks: the whole body is one
/// zstd frame signalled through the standard `Content-Encoding: zstd`
/// header. That rules out incremental decoding without vendoring a streaming
/// zstd decompressor, so this buffers the full response before decoding it
/// in one shot, trading the other cursors' "decode as chunks arrive"
/// behavior for simplicity.
pub(crate) struct ZstdDecoder<S> {
    stream: S,
    buffer: BytesMut,
    done: bool,
}

impl<S> ZstdDecoder<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            done: false,
        }
    }
}

impl<S> Stream for ZstdDecoder<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => {
                    self.done = true;
                    let net_size = self.buffer.len();
                    if net_size == 0 {
                        return Poll::Ready(None);
                    }
                    let decoded = ::zstd::stream::decode_all(&self.buffer[..])
                        .map_err(|err| Error::Decompression(err.into()))?;
                    return Poll::Ready(Some(Ok(Chunk {
                        data: decoded.into(),
                        net_size,
                    })));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, TryStreamExt};

    #[tokio::test]
    async fn decodes_full_frame_after_stream_ends() {
        let source = b"some text to round trip through zstd".to_vec();
        let compressed = ::zstd::stream::encode_all(&source[..], 0).unwrap();

        let chunks: Vec<Result<Bytes>> = compressed
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut decoder = ZstdDecoder::new(stream::iter(chunks));

        let decoded = decoder.try_next().await.unwrap().unwrap();
        assert_eq!(&decoded.data[..], &source[..]);
        assert!(decoder.try_next().await.unwrap().is_none());
    }
}
