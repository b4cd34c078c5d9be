//! Length-prefixed framing of [`Frame`]s over a byte stream.
//!
//! ```text
//! +----------------------------+------------------+
//! | Length (4 bytes, BE)       | Encoded frame    |
//! +----------------------------+------------------+
//! ```
//!
//! The declared length is checked against the configured maximum before any
//! body bytes are buffered.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, S2aStreamError};
use crate::frame::Frame;

/// Default maximum encoded frame size: 4 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Codec turning a byte stream into [`Frame`]s and back.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = S2aStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = (&src[..LENGTH_PREFIX]).get_u32() as usize;
        if len == 0 {
            return Err(S2aStreamError::EmptyFrame);
        }
        if len > self.max_frame_size {
            return Err(S2aStreamError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let body = src.split_to(len);
        Frame::decode(&body).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = S2aStreamError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.encoded_len();
        if len > self.max_frame_size {
            return Err(S2aStreamError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        dst.reserve(LENGTH_PREFIX + len);
        dst.put_u32(len as u32);
        frame.encode_into(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn partial_input_waits_for_more() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::Data {
                    stream_id: 1,
                    payload: Bytes::from_static(b"request"),
                },
                &mut buf,
            )
            .unwrap();

        let mut partial = buf.split_to(6);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.stream_id(), 1);
        assert!(partial.is_empty());
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::Open { stream_id: 1 }, &mut buf).unwrap();
        codec.encode(Frame::Fin { stream_id: 1 }, &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Open { stream_id: 1 })
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Fin { stream_id: 1 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn oversize_length_rejected_before_buffering() {
        let mut codec = FrameCodec::with_max_frame_size(16);
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            S2aStreamError::FrameTooLarge { size: 1024, max: 16 }
        ));
    }

    #[test]
    fn oversize_frame_not_encoded() {
        let mut codec = FrameCodec::with_max_frame_size(8);
        let mut buf = BytesMut::new();
        let err = codec
            .encode(
                Frame::Data {
                    stream_id: 1,
                    payload: Bytes::from(vec![0u8; 64]),
                },
                &mut buf,
            )
            .unwrap_err();
        assert!(matches!(err, S2aStreamError::FrameTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_is_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap_err(),
            S2aStreamError::EmptyFrame
        ));
    }
}
