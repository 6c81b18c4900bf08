//! Parser for single lines of the IRC client protocol.

use std::collections::HashMap;

use super::event::{Event, EventKind, TagValue};

/// Parses a single line into an [`Event`].
///
/// Returns `None` for empty lines and lines that are cut short after the tags or prefix.
/// Lines with an unrecognized command, or without the parameters their command needs, are
/// returned with [`EventKind::Unknown`].
///
/// # Example
///
/// ```rust
/// use leetbot::irc::{parse, EventKind};
///
/// let event = parse(":nick!user@host PRIVMSG #chan :hello").unwrap();
///
/// assert_eq!(event.kind, EventKind::Privmsg);
/// assert_eq!(event.target.as_deref(), Some("#chan"));
/// assert_eq!(event.text.as_deref(), Some("hello"));
/// ```
#[must_use]
pub fn parse(line: &str) -> Option<Event> {
    let raw = line.trim_end_matches(['\r', '\n']);

    if raw.is_empty() {
        return None;
    }

    let mut rest = raw;

    let tags = match rest.strip_prefix('@') {
        Some(tagged) => {
            let (block, remainder) = tagged.split_once(' ')?;
            rest = remainder;

            parse_tags(block)
        }
        None => HashMap::new(),
    };

    let sender_host = match rest.strip_prefix(':') {
        Some(prefixed) => {
            let (prefix, remainder) = prefixed.split_once(' ')?;
            rest = remainder;

            Some(prefix.to_string())
        }
        None => None,
    };

    let sender_nick = sender_host
        .as_deref()
        .map(|prefix| prefix.split_once('!').map_or(prefix, |(nick, _)| nick).to_string());

    // Everything after the first " :" is the trailing parameter. A line that consists of
    // only a command and a trailing parameter (`PING :x`) has no middle to split off.
    let (middle, text) = match rest.split_once(" :") {
        Some((middle, text)) => (middle, Some(text.to_string())),
        None => (rest, None),
    };

    let mut tokens = middle.split(' ').filter(|token| !token.is_empty());
    let command_token = tokens.next()?.to_ascii_uppercase();
    let params: Vec<String> = tokens
        .filter(|token| !token.starts_with(':'))
        .map(str::to_string)
        .collect();

    let (kind, target) = classify(&command_token, &params, text.as_deref());

    Some(Event {
        raw: raw.to_string(),
        kind,
        sender_nick,
        sender_host,
        target,
        text,
        command_token,
        params,
        tags,
    })
}

/// Splits a tag block (without the leading `@`) into its keys and values.
fn parse_tags(block: &str) -> HashMap<String, TagValue> {
    block
        .split(';')
        .filter(|tag| !tag.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((key, value)) => (key.to_string(), TagValue::Value(value.to_string())),
            None => (tag.to_string(), TagValue::Flag),
        })
        .collect()
}

/// Maps a command token to an event kind and extracts the target.
fn classify(command: &str, params: &[String], text: Option<&str>) -> (EventKind, Option<String>) {
    let first = params.first().cloned();

    match command {
        "PRIVMSG" | "NOTICE" | "PART" | "MODE" if first.is_some() => {
            let kind = match command {
                "PRIVMSG" => EventKind::Privmsg,
                "NOTICE" => EventKind::Notice,
                "PART" => EventKind::Part,
                _ => EventKind::Mode,
            };

            (kind, first)
        }
        // Some servers send the channel of a JOIN as the trailing parameter.
        "JOIN" => match first.or_else(|| text.map(str::to_string)) {
            Some(channel) => (EventKind::Join, Some(channel)),
            None => (EventKind::Unknown, None),
        },
        "KICK" if params.len() >= 2 => (EventKind::Kick, first),
        "QUIT" => (EventKind::Quit, None),
        "NICK" => (EventKind::Nick, None),
        "PING" => (EventKind::Ping, None),
        "PONG" => (EventKind::Pong, None),
        _ if command.bytes().all(|b| b.is_ascii_digit()) => (EventKind::Numeric, None),
        _ => (EventKind::Unknown, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_strip_line_endings_from_raw() {
        let event = parse("PING :abc\r\n").unwrap();

        assert_eq!(event.raw, "PING :abc");
        assert_eq!(event.text.as_deref(), Some("abc"));
    }

    #[test]
    fn it_should_return_none_for_truncated_prefix() {
        assert_eq!(parse(":nick!user@host"), None);
        assert_eq!(parse("@a=1"), None);
        assert_eq!(parse("\r\n"), None);
    }

    #[test]
    fn it_should_treat_missing_params_as_unknown() {
        let event = parse(":nick!user@host PRIVMSG").unwrap();

        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.target, None);
    }

    #[test]
    fn it_should_take_join_channel_from_trailing() {
        let event = parse(":nick!user@host JOIN :#leet").unwrap();

        assert_eq!(event.kind, EventKind::Join);
        assert_eq!(event.target.as_deref(), Some("#leet"));
    }
}
