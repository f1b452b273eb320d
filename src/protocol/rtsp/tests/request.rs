use crate::protocol::rtsp::{Method, RtspRequest};
use std::str::FromStr;

#[test]
fn test_request_encode_simple() {
    let request = RtspRequest::builder(Method::Options, "*")
        .cseq(1)
        .header("Apple-Challenge", "AAAA")
        .build();

    let encoded = String::from_utf8(request.encode()).unwrap();

    assert!(encoded.starts_with("OPTIONS * RTSP/1.0\r\n"));
    assert!(encoded.contains("CSeq: 1\r\n"));
    assert!(encoded.contains("Apple-Challenge: AAAA\r\n"));
    assert!(encoded.ends_with("\r\n\r\n"));
}

#[test]
fn test_request_encode_with_body() {
    let request = RtspRequest::builder(Method::SetParameter, "rtsp://example.com/1")
        .cseq(5)
        .content_type("text/parameters")
        .body("volume: -2.250000\r\n")
        .build();

    let encoded = String::from_utf8(request.encode()).unwrap();

    assert!(encoded.contains("Content-Type: text/parameters\r\n"));
    assert!(encoded.contains("Content-Length: 19\r\n"));
    assert!(encoded.ends_with("volume: -2.250000\r\n"));
    assert_eq!(request.body_text(), "volume: -2.250000\r\n");
}

#[test]
fn test_method_round_trip() {
    for method in Method::ALL {
        assert_eq!(Method::from_str(method.as_str()), Ok(method));
    }
    assert_eq!(Method::from_str("options"), Err(()));
    assert_eq!(Method::from_str("Announce"), Err(()));
    assert_eq!(Method::from_str("PLAY"), Err(()));
    assert_eq!(Method::from_str("POST"), Err(()));
}

#[test]
fn test_public_header() {
    assert_eq!(
        Method::public_header(),
        "ANNOUNCE, SETUP, RECORD, FLUSH, TEARDOWN, OPTIONS, GET_PARAMETER, SET_PARAMETER"
    );
}
