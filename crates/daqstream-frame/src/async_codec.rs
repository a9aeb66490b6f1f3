use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, peek_length, Frame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the same length-prefixed format as
/// [`FrameReader`](crate::FrameReader) and [`FrameWriter`](crate::FrameWriter).
#[derive(Debug, Clone)]
pub struct SampleFrameCodec {
    max_payload_size: usize,
}

impl SampleFrameCodec {
    /// Codec with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Codec with an explicit payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for SampleFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SampleFrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let expected = peek_length(src).map_or(HEADER_SIZE, |len| HEADER_SIZE + len);
        Err(FrameError::TruncatedFrame {
            expected,
            received: src.len(),
        })
    }
}

impl Encoder<Bytes> for SampleFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::element::encode_elements;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(client, SampleFrameCodec::new());
        let mut stream = FramedRead::new(server, SampleFrameCodec::new());

        sink.send(encode_elements(&[0.0f64, 0.5])).await.unwrap();
        sink.send(encode_elements(&[9.0f64, 8.0, 7.0, 6.0]))
            .await
            .unwrap();
        drop(sink);

        let time = stream.next().await.unwrap().unwrap();
        let data = stream.next().await.unwrap().unwrap();
        assert_eq!(time.elements::<f64>().unwrap(), vec![0.0, 0.5]);
        assert_eq!(data.elements::<f64>().unwrap(), vec![9.0, 8.0, 7.0, 6.0]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncated() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, SampleFrameCodec::new());

        client.write_all(&[8, 0, 0, 0, 1, 2, 3]).await.unwrap();
        drop(client);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::TruncatedFrame {
                expected: 12,
                received: 7
            }
        ));
    }

    #[tokio::test]
    async fn encoder_enforces_payload_limit() {
        let (client, _server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, SampleFrameCodec::with_max_payload(8));

        let err = sink
            .send(encode_elements(&[1.0f64, 2.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 16, max: 8 }));
    }
}
