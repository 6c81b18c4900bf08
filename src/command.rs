//! The contract between the dispatcher and whatever executes `!commands`.

use async_trait::async_trait;

use crate::Error;

/// The prefix that marks a message as a command.
pub const COMMAND_PREFIX: char = '!';

/// Where a command came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
    /// The nickname of the sender, or `None` on the console.
    pub sender: Option<String>,
    /// The channel or nickname the command was sent to, or `None` on the console.
    pub target: Option<String>,
    /// Sent as a private message to the bot.
    pub is_private: bool,
    /// Typed on the console.
    pub is_console: bool,
    /// The server the command arrived on.
    pub server_id: String,
}

impl CommandContext {
    /// Returns a context for a command typed on the console.
    #[must_use]
    pub fn console() -> Self {
        CommandContext {
            is_console: true,
            server_id: String::from("console"),
            ..Default::default()
        }
    }

    /// Returns true for private messages and console input.
    #[must_use]
    pub const fn is_admin_context(&self) -> bool {
        self.is_private || self.is_console
    }
}

/// The result of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Whether anything should be sent back.
    pub should_respond: bool,
    /// The text to send. May contain newlines.
    pub message: String,
    /// Split lines that are too long for a single protocol line.
    pub split_long_messages: bool,
}

impl CommandResponse {
    /// A response that sends `message`, split as needed.
    pub fn reply(message: impl Into<String>) -> Self {
        CommandResponse {
            should_respond: true,
            message: message.into(),
            split_long_messages: true,
        }
    }

    /// A response that sends `message` one line per newline, without length splitting.
    pub fn unsplit(message: impl Into<String>) -> Self {
        CommandResponse {
            split_long_messages: false,
            ..Self::reply(message)
        }
    }

    /// A response that sends nothing.
    #[must_use]
    pub const fn silent() -> Self {
        CommandResponse {
            should_respond: false,
            message: String::new(),
            split_long_messages: false,
        }
    }
}

/// Resolves and executes a `!command` line.
#[async_trait]
pub trait CommandResolver: Send + Sync {
    /// Executes the command in `text`, which starts with `!`.
    ///
    /// Returns `Ok(None)` if no command matched.
    async fn resolve(
        &self,
        text: &str,
        context: &CommandContext,
    ) -> Result<Option<CommandResponse>, Error>;
}

/// A command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The lowercased command name without the prefix.
    pub name: String,
    /// Whitespace separated arguments.
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Returns the arguments joined by single spaces.
    #[must_use]
    pub fn args_text(&self) -> String {
        self.args.join(" ")
    }
}

/// Splits a `!command arg1 arg2` line into its name and arguments.
///
/// Returns `None` if `message` doesn't start with the prefix or has no name after it.
///
/// # Example
///
/// ```rust
/// use leetbot::command::parse_command_message;
///
/// let command = parse_command_message("!Kaiku hello  world").unwrap();
///
/// assert_eq!(command.name, "kaiku");
/// assert_eq!(command.args, vec!["hello", "world"]);
/// assert_eq!(parse_command_message("hello"), None);
/// ```
#[must_use]
pub fn parse_command_message(message: &str) -> Option<ParsedCommand> {
    let mut parts = message.strip_prefix(COMMAND_PREFIX)?.split_whitespace();
    let name = parts.next()?.to_lowercase();

    Some(ParsedCommand {
        name,
        args: parts.map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_args() {
        let command = parse_command_message("!test --help me").unwrap();

        assert_eq!(command.name, "test");
        assert_eq!(command.args_text(), "--help me");
    }

    #[test]
    fn parse_command_without_args() {
        let command = parse_command_message("!TEST").unwrap();

        assert_eq!(command.name, "test");
        assert!(command.args.is_empty());
    }

    #[test]
    fn skip_bare_prefix() {
        assert_eq!(parse_command_message("!"), None);
        assert_eq!(parse_command_message("!   "), None);
    }

    #[test]
    fn console_context_is_admin() {
        let context = CommandContext::console();

        assert!(context.is_admin_context());
        assert_eq!(context.sender, None);
        assert_eq!(context.server_id, "console");
    }

    #[test]
    fn silent_response_does_not_respond() {
        assert!(!CommandResponse::silent().should_respond);
        assert!(CommandResponse::reply("hi").split_long_messages);
        assert!(!CommandResponse::unsplit("hi").split_long_messages);
    }
}
