//! Wire frames carried on an S2AStream connection.
//!
//! A connection multiplexes many session streams. Every frame names the
//! stream it belongs to; the payload of a DATA frame is one opaque
//! application message (one encoded protobuf message for session streams).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, S2aStreamError};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Open = 0x01,
    Data = 0x02,
    Fin = 0x03,
    Rst = 0x04,
}

impl TryFrom<u8> for FrameType {
    type Error = S2aStreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameType::Open),
            0x02 => Ok(FrameType::Data),
            0x03 => Ok(FrameType::Fin),
            0x04 => Ok(FrameType::Rst),
            other => Err(S2aStreamError::UnknownFrameType(other)),
        }
    }
}

/// Error codes carried in RST frames.
pub mod reset_code {
    pub const NO_ERROR: u32 = 0;
    pub const PROTOCOL_ERROR: u32 = 1;
    pub const REFUSED_STREAM: u32 = 2;
    pub const CANCEL: u32 = 3;
    pub const INTERNAL_ERROR: u32 = 4;
}

/// S2AStream wire frame.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// +-------+----------+--- variable ---+
/// | type  |  ... fields per type ...  |
/// | (1B)  |                            |
/// +-------+----------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// OPEN: stream_id(4)
    Open { stream_id: u32 },
    /// DATA: stream_id(4) + payload_len(4) + payload(N)
    Data { stream_id: u32, payload: Bytes },
    /// FIN: stream_id(4)
    Fin { stream_id: u32 },
    /// RST: stream_id(4) + error_code(4)
    Rst { stream_id: u32, error_code: u32 },
}

impl Frame {
    /// Return the frame type discriminant.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Open { .. } => FrameType::Open,
            Frame::Data { .. } => FrameType::Data,
            Frame::Fin { .. } => FrameType::Fin,
            Frame::Rst { .. } => FrameType::Rst,
        }
    }

    /// The stream this frame belongs to.
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Open { stream_id }
            | Frame::Data { stream_id, .. }
            | Frame::Fin { stream_id }
            | Frame::Rst { stream_id, .. } => *stream_id,
        }
    }

    /// Encode this frame into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.frame_type() as u8);
        match self {
            Frame::Open { stream_id } | Frame::Fin { stream_id } => {
                buf.put_u32(*stream_id);
            }
            Frame::Data { stream_id, payload } => {
                buf.put_u32(*stream_id);
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            Frame::Rst {
                stream_id,
                error_code,
            } => {
                buf.put_u32(*stream_id);
                buf.put_u32(*error_code);
            }
        }
    }

    /// The total number of bytes this frame will occupy when encoded.
    pub fn encoded_len(&self) -> usize {
        // 1 byte for type tag in every variant
        1 + match self {
            Frame::Open { .. } | Frame::Fin { .. } => 4,
            Frame::Data { payload, .. } => 4 + 4 + payload.len(),
            Frame::Rst { .. } => 4 + 4,
        }
    }

    /// Decode exactly one frame from `data`.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(S2aStreamError::FrameTooShort {
                expected: 1,
                actual: 0,
            });
        }

        let frame_type = FrameType::try_from(data[0])?;
        data = &data[1..];

        let (frame, consumed) = match frame_type {
            FrameType::Open => {
                Self::ensure_len(data, 4)?;
                (
                    Frame::Open {
                        stream_id: (&data[0..4]).get_u32(),
                    },
                    4,
                )
            }
            FrameType::Data => {
                Self::ensure_len(data, 8)?;
                let stream_id = (&data[0..4]).get_u32();
                let payload_len = (&data[4..8]).get_u32() as usize;
                Self::ensure_len(&data[8..], payload_len)?;
                let payload = Bytes::copy_from_slice(&data[8..8 + payload_len]);
                (Frame::Data { stream_id, payload }, 8 + payload_len)
            }
            FrameType::Fin => {
                Self::ensure_len(data, 4)?;
                (
                    Frame::Fin {
                        stream_id: (&data[0..4]).get_u32(),
                    },
                    4,
                )
            }
            FrameType::Rst => {
                Self::ensure_len(data, 8)?;
                let stream_id = (&data[0..4]).get_u32();
                let error_code = (&data[4..8]).get_u32();
                (
                    Frame::Rst {
                        stream_id,
                        error_code,
                    },
                    8,
                )
            }
        };

        if data.len() > consumed {
            return Err(S2aStreamError::TrailingBytes(data.len() - consumed));
        }
        Ok(frame)
    }

    fn ensure_len(data: &[u8], needed: usize) -> Result<()> {
        if data.len() < needed {
            Err(S2aStreamError::FrameTooShort {
                expected: needed,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}
