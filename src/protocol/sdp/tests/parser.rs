use crate::protocol::sdp::SdpParser;

const ITUNES_SDP: &str = "v=0\r\n\
o=iTunes 3413821438 0 IN IP4 192.168.1.12\r\n\
s=iTunes\r\n\
c=IN IP4 192.168.1.12\r\n\
t=0 0\r\n\
m=audio 0 RTP/AVP 96\r\n\
a=rtpmap:96 AppleLossless\r\n\
a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100\r\n\
i=Living Room Mac\r\n";

#[test]
fn test_single_valued_fields() {
    let sdp = SdpParser::parse(ITUNES_SDP);

    assert_eq!(sdp.get("v"), Some("0"));
    assert_eq!(sdp.get("s"), Some("iTunes"));
    assert_eq!(sdp.get("m"), Some("audio 0 RTP/AVP 96"));
    assert_eq!(sdp.client_name(), Some("Living Room Mac"));
    assert!(!sdp.is_ipv6());
}

#[test]
fn test_attributes_accumulate_in_order() {
    let sdp = SdpParser::parse(ITUNES_SDP);

    assert_eq!(
        sdp.values("a"),
        &[
            "rtpmap:96 AppleLossless".to_string(),
            "fmtp:96 352 0 16 40 10 14 2 255 0 0 44100".to_string()
        ]
    );
    assert_eq!(sdp.attribute("rtpmap"), Some("96 AppleLossless"));
    assert_eq!(sdp.attribute("missing"), None);
}

#[test]
fn test_last_occurrence_wins() {
    let sdp = SdpParser::parse("s=first\r\ns=second\r\np=+1 555\r\np=+1 666\r\n");

    assert_eq!(sdp.get("s"), Some("second"));
    assert_eq!(sdp.values("p").len(), 2);
    assert_eq!(sdp.values("p")[1], "+1 666");
    assert!(sdp.values("b").is_empty());
}

#[test]
fn test_repeated_attribute_last_wins() {
    let sdp = SdpParser::parse("a=rtpmap:96 AppleLossless\r\na=aesiv:AAAA\r\na=rtpmap:96 L16/44100/2\r\n");

    assert_eq!(sdp.attribute("rtpmap"), Some("96 L16/44100/2"));
    assert_eq!(sdp.attribute("aesiv"), Some("AAAA"));
}

#[test]
fn test_value_keeps_later_equals_signs() {
    let sdp = SdpParser::parse("a=fmtp:96 mode=record\r\n");
    assert_eq!(sdp.attribute("fmtp"), Some("96 mode=record"));
}

#[test]
fn test_malformed_lines_ignored() {
    let sdp = SdpParser::parse("garbage line\r\n\r\nv=0\r\nanother\r\n");
    assert_eq!(sdp.get("v"), Some("0"));
    assert_eq!(sdp.get("garbage line"), None);
}

#[test]
fn test_flag_attribute_without_colon() {
    let sdp = SdpParser::parse("a=recvonly\r\n");
    let attrs: Vec<_> = sdp.attributes().collect();
    assert_eq!(attrs, vec![("recvonly", "")]);
}

#[test]
fn test_bare_lf_and_ipv6() {
    let sdp = SdpParser::parse("v=0\nc=IN IP6 fe80::1\ni=Phone\n");
    assert!(sdp.is_ipv6());
    assert_eq!(sdp.client_name(), Some("Phone"));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_never_panics(input in "\\PC*") {
            let _ = SdpParser::parse(&input);
        }

        #[test]
        fn attribute_count_matches_a_lines(values in proptest::collection::vec("[a-z]{1,8}:[ -~]{0,16}", 0..10)) {
            let body: String = values.iter().map(|v| format!("a={v}\r\n")).collect();
            let sdp = SdpParser::parse(&body);
            prop_assert_eq!(sdp.values("a").len(), values.len());
        }
    }
}
