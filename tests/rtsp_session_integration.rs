//! RTSP session flow against a live receiver

mod common;

use airtunes::protocol::crypto::{decode_base64, encode_base64};
use airtunes::protocol::raop::{build_response_message, digest};
use airtunes::protocol::rtsp::{Method, StatusCode};
use airtunes::receiver::{MacAddress, ReceiverEvent, SessionState};
use common::{TestSender, next_event, pcm_sdp, server_key, start_receiver, test_config};
use rsa::Pkcs1v15Sign;

#[tokio::test]
async fn test_pipelined_options_answered_in_order() {
    let (mut receiver, _events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    let mut batch = Vec::new();
    for cseq in 0..100 {
        batch.extend_from_slice(format!("OPTIONS * RTSP/1.0\r\nCSeq: {cseq}\r\n\r\n").as_bytes());
    }
    sender.send_raw(&batch).await.unwrap();

    for cseq in 0..100 {
        let response = sender.read_response().await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.cseq(), Some(cseq));
        assert_eq!(response.headers.get("Server"), Some("AirTunes/105.1"));
        assert!(response.headers.get("Public").unwrap().contains("SET_PARAMETER"));
    }

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_full_session_flow() {
    let (mut receiver, mut events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    assert_eq!(sender.options().await.unwrap().status, StatusCode::OK);
    assert_eq!(sender.announce(&pcm_sdp(Some("Kitchen"))).await.unwrap().status, StatusCode::OK);

    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientNameChanged(n) if n == "Kitchen"));
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    let setup = sender.setup().await.unwrap();
    assert_eq!(setup.status, StatusCode::OK);
    assert!(setup.session().is_some());
    assert_eq!(setup.headers.get("Audio-Jack-Status"), Some("connected; type=analog"));
    assert!(sender.ports().is_some());

    let record = sender.record().await.unwrap();
    assert_eq!(record.status, StatusCode::OK);
    assert_eq!(record.headers.get("Audio-Latency"), Some("11025"));

    let controller = receiver.controller().unwrap();
    assert_eq!(controller.session_state().await, SessionState::Streaming);

    assert_eq!(sender.teardown().await.unwrap().status, StatusCode::OK);
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientDisconnected));

    receiver.stop().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::Stopped));
}

#[tokio::test]
async fn test_second_client_refused_while_streaming() {
    let (mut receiver, mut events, addr) = start_receiver(test_config()).await;

    let mut first = TestSender::connect(addr).await.unwrap();
    first.announce(&pcm_sdp(None)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    let mut second = TestSender::connect(addr).await.unwrap();
    let response = second.announce(&pcm_sdp(None)).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_ENOUGH_BANDWIDTH);

    // the first client is untouched
    assert_eq!(first.setup().await.unwrap().status, StatusCode::OK);
    assert!(events.try_recv().is_err());

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_negotiating_connection_blocks_newcomers() {
    let (mut receiver, _events, addr) = start_receiver(test_config()).await;

    let mut first = TestSender::connect(addr).await.unwrap();
    assert_eq!(first.options().await.unwrap().status, StatusCode::OK);

    let mut second = TestSender::connect(addr).await.unwrap();
    assert!(second.is_closed().await);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_volume_event() {
    let (mut receiver, mut events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    sender.announce(&pcm_sdp(None)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    assert_eq!(sender.set_volume(-2.25).await.unwrap().status, StatusCode::OK);
    match next_event(&mut events).await {
        ReceiverEvent::VolumeChanged(volume) => assert!((volume - -2.25).abs() < f32::EPSILON),
        other => panic!("Expected VolumeChanged, got {other:?}"),
    }

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let (mut receiver, mut events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    sender.announce(&pcm_sdp(None)).await.unwrap();
    sender.setup().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    assert_eq!(sender.teardown().await.unwrap().status, StatusCode::OK);
    assert_eq!(sender.teardown().await.unwrap().status, StatusCode::OK);
    drop(sender);

    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientDisconnected));
    receiver.stop().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::Stopped));
}

#[tokio::test]
async fn test_apple_challenge() {
    let mac = MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    let (mut receiver, _events, addr) = start_receiver(test_config().mac_address(mac)).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    let challenge = [0x5Au8; 16];
    let response = sender
        .request(Method::Options, &[("Apple-Challenge", &encode_base64(&challenge))], None)
        .await
        .unwrap();

    let signature = decode_base64(response.headers.get("Apple-Response").unwrap()).unwrap();
    let message = build_response_message(&challenge, &addr.ip(), &mac.octets());
    server_key()
        .public_key()
        .verify(Pkcs1v15Sign::new_unprefixed(), &message, &signature)
        .unwrap();

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_password_protected_announce() {
    let (mut receiver, mut events, addr) = start_receiver(test_config().password("secret")).await;
    let mut sender = TestSender::connect(addr).await.unwrap();
    let sdp = pcm_sdp(None);

    let challenge = sender.announce(&sdp).await.unwrap();
    assert_eq!(challenge.status, StatusCode::UNAUTHORIZED);
    let header = challenge.headers.get("WWW-Authenticate").unwrap();
    let nonce = header.split("nonce=\"").nth(1).unwrap().trim_end_matches('"').to_string();

    let uri = sender.uri();
    let wrong = format!(
        "Digest username=\"iTunes\", realm=\"roap\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{}\"",
        digest::digest_response("iTunes", "roap", "guess", &nonce, &uri, "ANNOUNCE")
    );
    let rejected = sender
        .request(Method::Announce, &[("Authorization", &wrong)], Some(("application/sdp", sdp.as_bytes())))
        .await
        .unwrap();
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
    assert!(rejected.headers.get("WWW-Authenticate").is_none());

    let right = format!(
        "Digest username=\"iTunes\", realm=\"roap\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{}\"",
        digest::digest_response("iTunes", "roap", "secret", &nonce, &uri, "ANNOUNCE")
    );
    let accepted = sender
        .request(Method::Announce, &[("Authorization", &right)], Some(("application/sdp", sdp.as_bytes())))
        .await
        .unwrap();
    assert_eq!(accepted.status, StatusCode::OK);
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let (mut receiver, _events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    sender.send_raw(b"PLAY rtsp://x RTSP/1.0\r\nCSeq: 4\r\n\r\n").await.unwrap();
    let response = sender.read_response().await.unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.cseq(), Some(4));
    assert!(sender.is_closed().await);

    // the slot frees up once the server side has finished with the socket
    let mut answered = false;
    for _ in 0..20 {
        let mut next = TestSender::connect(addr).await.unwrap();
        if let Ok(response) = next.options().await {
            answered = response.status == StatusCode::OK;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(answered);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_disconnects_client() {
    let (mut receiver, mut events, addr) = start_receiver(test_config()).await;
    let mut sender = TestSender::connect(addr).await.unwrap();

    sender.announce(&pcm_sdp(None)).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientConnected(_)));

    receiver.stop().await.unwrap();
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::ClientDisconnected));
    assert!(matches!(next_event(&mut events).await, ReceiverEvent::Stopped));
    assert!(sender.is_closed().await);
}
