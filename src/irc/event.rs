use std::collections::HashMap;
use std::fmt;

/// The value of a single IRCv3 message tag.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TagValue {
    /// `key=value`
    Value(String),
    /// A bare `key` with no value.
    Flag,
}

/// The kind of an IRC event, derived from its command token.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// A message to a channel or user.
    Privmsg,
    /// A notice to a channel or user.
    Notice,
    /// A user joined a channel.
    Join,
    /// A user left a channel.
    Part,
    /// A user disconnected.
    Quit,
    /// A user changed nickname.
    Nick,
    /// A user was kicked from a channel.
    Kick,
    /// A channel or user mode change.
    Mode,
    /// A keepalive request.
    Ping,
    /// A keepalive reply.
    Pong,
    /// A numeric server reply.
    Numeric,
    /// Anything else.
    Unknown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Privmsg => "PRIVMSG",
            EventKind::Notice => "NOTICE",
            EventKind::Join => "JOIN",
            EventKind::Part => "PART",
            EventKind::Quit => "QUIT",
            EventKind::Nick => "NICK",
            EventKind::Kick => "KICK",
            EventKind::Mode => "MODE",
            EventKind::Ping => "PING",
            EventKind::Pong => "PONG",
            EventKind::Numeric => "NUMERIC",
            EventKind::Unknown => "UNKNOWN",
        };

        f.write_str(name)
    }
}

/// A single parsed line from the server.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    /// The original line with the trailing CR/LF stripped.
    pub raw: String,
    /// The kind of event.
    pub kind: EventKind,
    /// The nickname part of the prefix, or the whole prefix for server messages.
    pub sender_nick: Option<String>,
    /// The full prefix, e.g. `nick!user@host`.
    pub sender_host: Option<String>,
    /// The channel or nickname the event applies to.
    pub target: Option<String>,
    /// The trailing parameter.
    pub text: Option<String>,
    /// The command verb, uppercased, or a numeric reply code.
    pub command_token: String,
    /// Middle parameters, excluding the trailing one.
    pub params: Vec<String>,
    /// IRCv3 message tags.
    pub tags: HashMap<String, TagValue>,
}

impl Event {
    /// Returns the `user` portion of a `nick!user@host` prefix.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        let (_, rest) = self.sender_host.as_deref()?.split_once('!')?;

        Some(rest.split_once('@').map_or(rest, |(user, _)| user))
    }

    /// Returns the `host` portion of a `nick!user@host` prefix.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        let (_, host) = self.sender_host.as_deref()?.split_once('@')?;

        Some(host)
    }

    /// Returns whether the target is a channel, or `None` if there is no target.
    fn channel_target(&self) -> Option<bool> {
        self.target.as_deref().map(|target| target.starts_with('#'))
    }

    /// Returns true if this is a `PRIVMSG` addressed to something other than a channel.
    #[must_use]
    pub fn is_private_message(&self) -> bool {
        self.kind == EventKind::Privmsg && self.channel_target() == Some(false)
    }

    /// Returns true if this is a `PRIVMSG` addressed to a channel.
    #[must_use]
    pub fn is_channel_message(&self) -> bool {
        self.kind == EventKind::Privmsg && self.channel_target() == Some(true)
    }

    /// Returns true if the text starts with `!`.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.text.as_deref().is_some_and(|text| text.starts_with('!'))
    }

    /// Returns the tag value for `key`, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}
