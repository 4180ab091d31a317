use proptest::prelude::*;
use sipbell_sip_core::{Headline, Message, StreamParser};

fn parse_one(bytes: &[u8]) -> Option<Message> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    rt.block_on(async {
        let mut parser = StreamParser::new(bytes);
        parser.next_message().await.unwrap()
    })
}

fn headline() -> impl Strategy<Value = Headline> {
    prop_oneof![
        (
            prop::sample::select(vec!["REGISTER", "INVITE", "CANCEL", "OPTIONS", "MESSAGE"]),
            "sip:[a-z]{1,8}@[a-z]{1,8}\\.com",
        )
            .prop_map(|(method, uri)| Headline::request(method, uri)),
        (100u16..700, "[A-Za-z ]{0,20}").prop_map(|(code, reason)| Headline::response(code, reason)),
    ]
}

proptest! {
    /// Serializing and re-parsing keeps headline, header order and body.
    #[test]
    fn serialize_then_parse_is_identity(
        headline in headline(),
        headers in prop::collection::vec(("[A-Z][a-z]{1,10}", "[ -~]{0,30}"), 0..8),
        body in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut msg = Message::from_headline(headline);
        for (name, value) in &headers {
            msg.add_header(name.as_str(), value.as_str());
        }
        msg.set_content_length(body.len());
        msg.set_body(body.clone());

        let wire = msg.to_bytes();
        let parsed = parse_one(&wire);
        prop_assert!(parsed.is_some());
        let parsed = parsed.unwrap();

        prop_assert_eq!(parsed.headline(), msg.headline());
        prop_assert_eq!(parsed.headers(), msg.headers());
        prop_assert_eq!(&parsed.body()[..], &body[..]);
        prop_assert_eq!(parsed.to_bytes(), wire);
    }
}
