use leetbot::irc::{EventKind, TagValue, parse};
use rstest::rstest;

#[test]
fn it_should_parse_channel_privmsg() {
    let event = parse(":nick!user@example.com PRIVMSG #channel :hello, world!").unwrap();

    assert_eq!(event.kind, EventKind::Privmsg);
    assert_eq!(event.sender_nick.as_deref(), Some("nick"));
    assert_eq!(event.sender_host.as_deref(), Some("nick!user@example.com"));
    assert_eq!(event.user(), Some("user"));
    assert_eq!(event.host(), Some("example.com"));
    assert_eq!(event.target.as_deref(), Some("#channel"));
    assert_eq!(event.text.as_deref(), Some("hello, world!"));
    assert_eq!(event.command_token, "PRIVMSG");
    assert!(event.is_channel_message());
    assert!(!event.is_private_message());
}

#[test]
fn it_should_parse_private_privmsg() {
    let event = parse(":nick!user@host PRIVMSG leetbot :hi there").unwrap();

    assert!(event.is_private_message());
    assert!(!event.is_channel_message());
    assert_eq!(event.target.as_deref(), Some("leetbot"));
}

#[rstest]
#[case(":a!b@c PRIVMSG #chan :!help", true)]
#[case(":a!b@c PRIVMSG #chan :!", true)]
#[case(":a!b@c PRIVMSG #chan :hello !help", false)]
#[case(":a!b@c PRIVMSG #chan : !help", false)]
fn it_should_detect_commands(#[case] line: &str, #[case] expected: bool) {
    assert_eq!(parse(line).unwrap().is_command(), expected);
}

#[test]
fn it_should_parse_tags() {
    let event = parse("@time=2024-01-01T13:37:00.000Z;draft/bot :n!u@h PRIVMSG #c :x").unwrap();

    assert_eq!(
        event.tag("time"),
        Some(&TagValue::Value("2024-01-01T13:37:00.000Z".to_string()))
    );
    assert_eq!(event.tag("draft/bot"), Some(&TagValue::Flag));
    assert_eq!(event.tag("missing"), None);
    assert_eq!(event.kind, EventKind::Privmsg);
}

#[test]
fn it_should_use_server_prefix_as_sender() {
    let event = parse(":irc.example.net 001 leetbot :Welcome to the network").unwrap();

    assert_eq!(event.kind, EventKind::Numeric);
    assert_eq!(event.command_token, "001");
    assert_eq!(event.sender_nick.as_deref(), Some("irc.example.net"));
    assert_eq!(event.user(), None);
    assert_eq!(event.host(), None);
    assert_eq!(event.params, vec!["leetbot".to_string()]);
}

#[test]
fn it_should_parse_ping_without_prefix() {
    let event = parse("PING :irc.example.net").unwrap();

    assert_eq!(event.kind, EventKind::Ping);
    assert_eq!(event.sender_nick, None);
    assert_eq!(event.target, None);
    assert_eq!(event.text.as_deref(), Some("irc.example.net"));
}

#[test]
fn it_should_parse_message_without_text() {
    let event = parse(":nick!user@host MODE #channel +o other").unwrap();

    assert_eq!(event.kind, EventKind::Mode);
    assert_eq!(event.target.as_deref(), Some("#channel"));
    assert_eq!(event.text, None);
    assert_eq!(event.params, vec!["#channel", "+o", "other"]);
}

#[rstest]
#[case(":nick!user@host KICK #channel victim :bye", EventKind::Kick, Some("#channel"))]
#[case(":nick!user@host PART #channel :later", EventKind::Part, Some("#channel"))]
#[case(":nick!user@host QUIT :gone", EventKind::Quit, None)]
#[case(":nick!user@host NICK :newnick", EventKind::Nick, None)]
#[case(":nick!user@host NOTICE #channel :psst", EventKind::Notice, Some("#channel"))]
#[case(":nick!user@host JOIN #channel", EventKind::Join, Some("#channel"))]
#[case(":server FOO bar", EventKind::Unknown, None)]
fn it_should_classify_commands(
    #[case] line: &str,
    #[case] kind: EventKind,
    #[case] target: Option<&str>,
) {
    let event = parse(line).unwrap();

    assert_eq!(event.kind, kind);
    assert_eq!(event.target.as_deref(), target);
}

#[rstest]
#[case("")]
#[case("\r\n")]
#[case("@only-tags")]
#[case(":only-prefix")]
fn it_should_reject_malformed_lines(#[case] line: &str) {
    assert_eq!(parse(line), None);
}
