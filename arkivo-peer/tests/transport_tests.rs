use arkivo_peer::transport::mock::MockTransport;
use arkivo_peer::{Channel, PeerError, Transport};

#[tokio::test]
async fn connect_requires_reachable_address() {
    let transport = MockTransport::new();
    assert!(matches!(
        transport.connect("unknown").await,
        Err(PeerError::Unreachable(_))
    ));

    transport.set_reachable("known");
    assert!(transport.connect("known").await.is_ok());
}

#[tokio::test]
async fn send_is_recorded_per_address() {
    let transport = MockTransport::new();
    transport.set_reachable("a");
    let mut channel = transport.connect("a").await.unwrap();

    transport.send(&mut channel, b"hello").await.unwrap();
    transport.send(&mut channel, b"world").await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], ("a".to_string(), b"hello".to_vec()));
}

#[tokio::test]
async fn receive_drains_queued_frames() {
    let transport = MockTransport::new();
    transport.set_reachable("a");
    transport.queue_incoming("a", b"first".to_vec());
    transport.queue_incoming("a", b"second".to_vec());
    let mut channel = transport.connect("a").await.unwrap();

    assert_eq!(transport.receive(&mut channel).await.unwrap(), b"first");
    assert_eq!(transport.receive(&mut channel).await.unwrap(), b"second");
    assert!(matches!(
        transport.receive(&mut channel).await,
        Err(PeerError::ChannelClosed)
    ));
}

#[tokio::test]
async fn channel_downcast_roundtrip() {
    let channel = Channel::new(42u32);
    assert_eq!(channel.downcast_ref::<u32>(), Some(&42));
    assert_eq!(channel.downcast::<u32>(), Some(42));

    let channel = Channel::new("addr".to_string());
    assert!(channel.downcast::<u32>().is_none());
}
