//! Frame and codec tests over the public API.

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use s2astream::frame::{reset_code, FrameType};
use s2astream::{Frame, FrameCodec, S2aStreamError};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

#[test]
fn every_frame_type_decodes_to_itself() {
    let frames = [
        Frame::Open { stream_id: 1 },
        Frame::Data {
            stream_id: 1,
            payload: Bytes::from_static(b"session request"),
        },
        Frame::Data {
            stream_id: 9,
            payload: Bytes::new(),
        },
        Frame::Fin { stream_id: 1 },
        Frame::Rst {
            stream_id: 3,
            error_code: reset_code::REFUSED_STREAM,
        },
    ];
    for frame in frames {
        let bytes = frame.encode();
        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }
}

#[test]
fn frame_type_tags() {
    assert_eq!(FrameType::try_from(0x01).unwrap(), FrameType::Open);
    assert_eq!(FrameType::try_from(0x04).unwrap(), FrameType::Rst);
    assert!(matches!(
        FrameType::try_from(0x00),
        Err(S2aStreamError::UnknownFrameType(0))
    ));
}

#[test]
fn empty_input_is_too_short() {
    assert!(matches!(
        Frame::decode(&[]),
        Err(S2aStreamError::FrameTooShort {
            expected: 1,
            actual: 0
        })
    ));
}

#[test]
fn codec_rejects_garbage_body() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    buf.put_u32(2);
    buf.put_slice(&[0x09, 0x00]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(S2aStreamError::UnknownFrameType(0x09))
    ));
}

#[tokio::test]
async fn framed_pipe_preserves_order() {
    let (a, b) = tokio::io::duplex(64);
    let mut writer = FramedWrite::new(a, FrameCodec::new());
    let mut reader = FramedRead::new(b, FrameCodec::new());

    let sent: Vec<Frame> = (0..20u32)
        .map(|i| Frame::Data {
            stream_id: 1,
            payload: Bytes::from(i.to_be_bytes().to_vec()),
        })
        .collect();

    let to_send = sent.clone();
    let write = tokio::spawn(async move {
        for frame in to_send {
            writer.send(frame).await.unwrap();
        }
    });

    for expected in &sent {
        let got = reader.next().await.unwrap().unwrap();
        assert_eq!(&got, expected);
    }
    write.await.unwrap();
}
