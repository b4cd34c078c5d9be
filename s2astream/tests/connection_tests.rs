//! End-to-end stream tests over in-memory and TCP byte pipes.

use std::time::Duration;

use bytes::Bytes;
use s2astream::frame::reset_code;
use s2astream::{Channel, Connection, ConnectionConfig, S2aStreamError, StreamState};
use tokio::net::{TcpListener, TcpStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pair() -> (s2astream::ClientConnection, s2astream::ServerConnection) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (
        Connection::client(a, ConnectionConfig::default()),
        Connection::server(b, ConnectionConfig::default()),
    )
}

#[tokio::test]
async fn request_response_on_one_stream() {
    let (client, mut server) = pair();

    let mut stream = client.open_stream().await.unwrap();
    stream.send(Bytes::from_static(b"ping")).await.unwrap();

    let mut accepted = server.accept().await.unwrap();
    assert_eq!(accepted.id(), stream.id());
    assert_eq!(&accepted.recv().await.unwrap().unwrap()[..], b"ping");
    accepted.send(Bytes::from_static(b"pong")).await.unwrap();

    assert_eq!(&stream.recv().await.unwrap().unwrap()[..], b"pong");
}

#[tokio::test]
async fn finish_is_seen_after_all_data() {
    let (client, mut server) = pair();

    let mut stream = client.open_stream().await.unwrap();
    for i in 0..10u8 {
        stream.send(Bytes::from(vec![i])).await.unwrap();
    }
    stream.finish().await.unwrap();
    assert_eq!(stream.state(), StreamState::HalfClosedLocal);

    let mut accepted = server.accept().await.unwrap();
    for i in 0..10u8 {
        assert_eq!(accepted.recv().await.unwrap().unwrap()[..], [i]);
    }
    assert!(accepted.recv().await.unwrap().is_none());
    assert_eq!(accepted.state(), StreamState::HalfClosedRemote);
    assert!(!accepted.is_cancelled());

    // Half-closed: the server may still answer.
    accepted.send(Bytes::from_static(b"bye")).await.unwrap();
    accepted.finish().await.unwrap();
    assert_eq!(&stream.recv().await.unwrap().unwrap()[..], b"bye");
    assert!(stream.recv().await.unwrap().is_none());
    assert_eq!(stream.state(), StreamState::Closed);
}

#[tokio::test]
async fn streams_are_independent() {
    let (client, mut server) = pair();

    let mut first = client.open_stream().await.unwrap();
    let mut second = client.open_stream().await.unwrap();
    assert_ne!(first.id(), second.id());

    second.send(Bytes::from_static(b"two")).await.unwrap();
    first.send(Bytes::from_static(b"one")).await.unwrap();

    let mut a = server.accept().await.unwrap();
    let mut b = server.accept().await.unwrap();
    assert_eq!(a.id(), first.id());
    assert_eq!(&a.recv().await.unwrap().unwrap()[..], b"one");
    assert_eq!(&b.recv().await.unwrap().unwrap()[..], b"two");

    // Resetting one stream leaves the other usable.
    a.reset(reset_code::CANCEL).await.unwrap();
    let err = first.recv().await.unwrap_err();
    assert!(matches!(
        err,
        S2aStreamError::StreamReset {
            error_code: reset_code::CANCEL,
            ..
        }
    ));

    b.send(Bytes::from_static(b"still here")).await.unwrap();
    assert_eq!(&second.recv().await.unwrap().unwrap()[..], b"still here");
}

#[tokio::test]
async fn dropping_a_stream_cancels_the_peer() {
    let (client, mut server) = pair();

    let stream = client.open_stream().await.unwrap();
    let accepted = server.accept().await.unwrap();
    let token = Channel::cancellation(&accepted);
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .unwrap();
}

#[tokio::test]
async fn refused_when_over_stream_limit() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let client = Connection::client(a, ConnectionConfig::default());
    let mut server = Connection::server(
        b,
        ConnectionConfig {
            max_streams: 1,
            ..ConnectionConfig::default()
        },
    );

    let _first = client.open_stream().await.unwrap();
    let _accepted = server.accept().await.unwrap();

    let mut second = client.open_stream().await.unwrap();
    let err = second.recv().await.unwrap_err();
    assert!(matches!(
        err,
        S2aStreamError::StreamReset {
            error_code: reset_code::REFUSED_STREAM,
            ..
        }
    ));
}

#[tokio::test]
async fn connection_loss_cancels_streams() {
    init_tracing();
    let (client, mut server) = pair();

    let mut stream = client.open_stream().await.unwrap();
    stream.send(Bytes::from_static(b"x")).await.unwrap();
    let accepted = server.accept().await.unwrap();
    let token = accepted.cancellation_token();

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .unwrap();
    server.closed().await.unwrap();

    assert!(matches!(
        stream.send(Bytes::from_static(b"late")).await,
        Err(S2aStreamError::StreamClosed(_)) | Err(S2aStreamError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn works_over_tcp() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut conn = Connection::server(socket, ConnectionConfig::default());
        let mut stream = conn.accept().await.unwrap();
        while let Some(msg) = stream.recv().await.unwrap() {
            stream.send(msg).await.unwrap();
        }
        stream.finish().await.unwrap();
        conn.closed().await
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let client = Connection::client(socket, ConnectionConfig::default());
    let mut stream = client.open_stream().await.unwrap();
    for word in ["alpha", "beta", "gamma"] {
        stream.send(Bytes::from(word)).await.unwrap();
        assert_eq!(&stream.recv().await.unwrap().unwrap()[..], word.as_bytes());
    }
    stream.finish().await.unwrap();
    assert!(stream.recv().await.unwrap().is_none());

    drop(stream);
    client.close();
    client.closed().await.unwrap();
    server.await.unwrap().unwrap();
}
