//! Routes parsed events through the fixed chain of message processors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::Error;
use crate::command::{CommandContext, CommandResponse};
use crate::config::BotConfig;
use crate::consts::{MAX_CHAT_LINES, MAX_RESPONSE_LENGTH, SAFE_PAYLOAD_BYTES};
use crate::irc::{Event, EventHandler, EventKind, MessageSink, Sender};
use crate::leet::{LeetDetector, LeetMatcher};
use crate::services::BotServices;
use crate::trackers::{find_drinks, tokenize_words};
use crate::utils::{split_message_intelligently, wrap_utf8_bytes};

/// The notice sent to a user whose command failed.
const COMMAND_ERROR_NOTICE: &str = "Sorry, that command failed. Please try again later.";

/// Whether the chain should go on after a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next processor.
    Continue,
    /// The message was handled, skip the remaining processors.
    Stop,
}

/// A single step of the message chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    /// Drops messages sent by the bot itself.
    IgnoreSelf,
    /// Counts words in free text.
    WordTracking,
    /// Counts drink announcements in free text.
    DrinkTracking,
    /// Announces titles of linked pages in channels.
    UrlTitles,
    /// Executes `!commands`.
    Commands,
    /// Answers private messages and mentions with the chat service.
    AiChat,
}

/// The order messages are processed in.
pub const CHAIN: [Processor; 6] = [
    Processor::IgnoreSelf,
    Processor::WordTracking,
    Processor::DrinkTracking,
    Processor::UrlTitles,
    Processor::Commands,
    Processor::AiChat,
];

/// A `PRIVMSG` with the fields every processor needs.
struct Message<'a> {
    event: &'a Event,
    nick: &'a str,
    text: &'a str,
    is_private_to_bot: bool,
    mention: Option<&'a str>,
}

impl Message<'_> {
    /// Where replies go: the sender for private messages, the channel otherwise.
    fn reply_target(&self) -> &str {
        if self.event.is_private_message() {
            self.nick
        } else {
            self.event.target.as_deref().unwrap_or(self.nick)
        }
    }
}

/// Runs events through the message processors.
pub struct Dispatcher {
    nickname: String,
    services: BotServices,
    leet: Arc<dyn LeetMatcher>,
    leet_announcers: Vec<String>,
    use_notices: bool,
    command_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher for a bot configured with `config`.
    #[must_use]
    pub fn new(config: &BotConfig, services: BotServices) -> Self {
        Dispatcher {
            nickname: config.nickname.clone(),
            services,
            leet: Arc::new(LeetDetector),
            leet_announcers: config
                .leet_announcers
                .iter()
                .map(|nick| nick.to_lowercase())
                .collect(),
            use_notices: config.use_notices,
            command_timeout: config.timing.command_timeout,
        }
    }

    /// Replaces the leet announcement matcher.
    #[must_use]
    pub fn with_leet_matcher(mut self, matcher: Arc<dyn LeetMatcher>) -> Self {
        self.leet = matcher;
        self
    }

    /// Returns the services available to the processors.
    #[must_use]
    pub const fn services(&self) -> &BotServices {
        &self.services
    }

    /// Handles a single event, replying through `sink`.
    pub async fn dispatch(&self, event: &Event, sink: &dyn MessageSink) {
        let nick = event.sender_nick.as_deref().unwrap_or("?");
        let server = sink.server_id();

        match event.kind {
            EventKind::Privmsg => self.process_message(event, sink).await,
            EventKind::Notice => self.process_notice(event, sink),
            EventKind::Join => info!(%server, %nick, channel = ?event.target, "joined"),
            EventKind::Part => {
                let reason = event.text.as_deref().unwrap_or("No reason");
                info!(%server, %nick, channel = ?event.target, %reason, "left");
            }
            EventKind::Quit => {
                let reason = event.text.as_deref().unwrap_or("No reason");
                info!(%server, %nick, %reason, "quit");
            }
            EventKind::Nick => {
                let new_nick = event.text.as_deref().or(event.params.first().map(String::as_str));
                info!(%server, %nick, new_nick = ?new_nick, "changed nick");
            }
            _ => trace!(%server, kind = %event.kind, "ignoring event"),
        }
    }

    /// Returns true if `nick` is the bot, by configured or current nickname.
    fn is_own_nick(&self, nick: &str, sink: &dyn MessageSink) -> bool {
        nick.eq_ignore_ascii_case(&self.nickname) || nick.eq_ignore_ascii_case(&sink.nickname())
    }

    /// Returns the text after a leading `nick:` or `nick,` addressed to the bot.
    fn strip_mention<'a>(&self, text: &'a str, sink: &dyn MessageSink) -> Option<&'a str> {
        let current = sink.nickname();

        [self.nickname.as_str(), current.as_str()]
            .into_iter()
            .filter(|name| !name.is_empty())
            .find_map(|name| {
                let head = text.get(..name.len())?;
                let rest = &text[name.len()..];

                (head.eq_ignore_ascii_case(name) && (rest.starts_with(':') || rest.starts_with(',')))
                    .then(|| rest[1..].trim())
            })
    }

    async fn process_message(&self, event: &Event, sink: &dyn MessageSink) {
        let (Some(nick), Some(text)) = (event.sender_nick.as_deref(), event.text.as_deref()) else {
            debug!(raw = %event.raw, "ignoring message without sender or text");
            return;
        };
        let message = Message {
            event,
            nick,
            text,
            is_private_to_bot: event
                .target
                .as_deref()
                .is_some_and(|target| self.is_own_nick(target, sink)),
            mention: self.strip_mention(text, sink),
        };

        for processor in CHAIN {
            match self.run(processor, &message, sink).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    trace!(?processor, "message handled");
                    break;
                }
                Err(err) => warn!(?processor, %err, "message processor failed"),
            }
        }

        // Announcements are counted even when a processor above handled the message.
        if let Err(err) = self.track_leet(event, nick, sink.server_id()) {
            warn!(%err, "leet tracking failed");
        }
    }

    /// Notices are never answered; they are only scanned for leet announcements.
    fn process_notice(&self, event: &Event, sink: &dyn MessageSink) {
        let Some(nick) = event.sender_nick.as_deref() else {
            trace!(raw = %event.raw, "ignoring server notice");
            return;
        };

        if self.is_own_nick(nick, sink) {
            return;
        }

        if let Err(err) = self.track_leet(event, nick, sink.server_id()) {
            warn!(%err, "leet tracking failed");
        }
    }

    async fn run(
        &self,
        processor: Processor,
        message: &Message<'_>,
        sink: &dyn MessageSink,
    ) -> Result<Flow, Error> {
        match processor {
            Processor::IgnoreSelf => Ok(self.ignore_self(message, sink)),
            Processor::WordTracking => self.track_words(message, sink.server_id()),
            Processor::DrinkTracking => self.track_drinks(message, sink.server_id()),
            Processor::UrlTitles => self.announce_titles(message, sink).await,
            Processor::Commands => self.run_command(message, sink).await,
            Processor::AiChat => self.chat(message, sink).await,
        }
    }

    fn ignore_self(&self, message: &Message<'_>, sink: &dyn MessageSink) -> Flow {
        if self.is_own_nick(message.nick, sink) {
            trace!("ignoring own message");
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn track_words(&self, message: &Message<'_>, server_id: &str) -> Result<Flow, Error> {
        let Some(words) = &self.services.words else {
            return Ok(Flow::Continue);
        };

        if !message.event.is_command() {
            let tokens = tokenize_words(message.text);

            if !tokens.is_empty() {
                words.track_words(server_id, message.nick, &tokens)?;
            }
        }

        Ok(Flow::Continue)
    }

    fn track_drinks(&self, message: &Message<'_>, server_id: &str) -> Result<Flow, Error> {
        let Some(drinks) = &self.services.drinks else {
            return Ok(Flow::Continue);
        };

        if message.event.is_command() {
            return Ok(Flow::Continue);
        }

        for mention in find_drinks(message.text) {
            debug!(nick = message.nick, word = %mention.word, detail = %mention.detail, "drink");
            drinks.track_drink(server_id, message.nick, &mention.word, &mention.detail)?;
        }

        Ok(Flow::Continue)
    }

    async fn announce_titles(
        &self,
        message: &Message<'_>,
        sink: &dyn MessageSink,
    ) -> Result<Flow, Error> {
        let Some(titles) = &self.services.titles else {
            return Ok(Flow::Continue);
        };

        if message.event.is_channel_message() {
            for line in titles.fetch_titles(message.text).await? {
                self.send_reply(sink, message.reply_target(), &line).await?;
            }
        }

        Ok(Flow::Continue)
    }

    async fn run_command(&self, message: &Message<'_>, sink: &dyn MessageSink) -> Result<Flow, Error> {
        let Some(commands) = &self.services.commands else {
            return Ok(Flow::Continue);
        };

        if !message.event.is_command() {
            return Ok(Flow::Continue);
        }

        let context = CommandContext {
            sender: Some(message.nick.to_string()),
            target: message.event.target.clone(),
            is_private: message.event.is_private_message(),
            is_console: false,
            server_id: sink.server_id().to_string(),
        };
        let result = time::timeout(self.command_timeout, commands.resolve(message.text, &context))
            .await
            .unwrap_or_else(|_| Err(Error::CommandTimeout(self.command_timeout)));

        match result {
            Ok(Some(response)) if response.should_respond && !response.message.is_empty() => {
                let target = message.reply_target();

                for line in response_lines(&response) {
                    self.send_reply(sink, target, &line).await?;
                }

                Ok(Flow::Stop)
            }
            Ok(_) => Ok(Flow::Continue),
            Err(err) => {
                warn!(nick = message.nick, text = message.text, %err, "command failed");

                if let Err(err) = sink.send_notice(message.nick, COMMAND_ERROR_NOTICE).await {
                    warn!(%err, "could not send command error notice");
                }

                Ok(Flow::Stop)
            }
        }
    }

    async fn chat(&self, message: &Message<'_>, sink: &dyn MessageSink) -> Result<Flow, Error> {
        let Some(chat) = &self.services.chat else {
            return Ok(Flow::Continue);
        };

        let prompt = match message.mention {
            Some(rest) => rest,
            None if message.is_private_to_bot => message.text,
            None => return Ok(Flow::Continue),
        };

        let reply = chat.chat(message.nick, prompt).await?;

        if reply.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let target = if message.is_private_to_bot {
            message.nick
        } else {
            message.reply_target()
        };

        for line in wrap_utf8_bytes(&reply, SAFE_PAYLOAD_BYTES, MAX_CHAT_LINES, "...") {
            self.send_reply(sink, target, &line).await?;
        }

        Ok(Flow::Stop)
    }

    fn track_leet(&self, event: &Event, nick: &str, server_id: &str) -> Result<(), Error> {
        let Some(leet) = &self.services.leet else {
            return Ok(());
        };

        if !self.leet_announcers.is_empty() && !self.leet_announcers.contains(&nick.to_lowercase()) {
            return Ok(());
        }

        for found in self.leet.scan(&event.raw) {
            info!(nick, kind = %event.kind, ?found, "leet announcement");
            leet.record(server_id, &found)?;
        }

        Ok(())
    }

    async fn send_reply(&self, sink: &dyn MessageSink, target: &str, text: &str) -> Result<(), Error> {
        if self.use_notices {
            sink.send_notice(target, text).await
        } else {
            sink.send_message(target, text).await
        }
    }

    /// Executes a `!command` typed on the console.
    ///
    /// Returns the lines to print, or `None` if no command matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the command failed or timed out.
    pub async fn handle_console(&self, text: &str) -> Result<Option<Vec<String>>, Error> {
        let Some(commands) = &self.services.commands else {
            return Ok(None);
        };

        let context = CommandContext::console();
        let response = time::timeout(self.command_timeout, commands.resolve(text, &context))
            .await
            .map_err(|_| Error::CommandTimeout(self.command_timeout))??;

        Ok(response.map(|response| {
            if response.should_respond {
                response_lines(&response)
            } else {
                vec![]
            }
        }))
    }

    /// Asks the chat service on behalf of the console.
    ///
    /// Returns `None` if no chat service is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat service failed or timed out.
    pub async fn handle_console_chat(&self, text: &str) -> Result<Option<Vec<String>>, Error> {
        let Some(chat) = &self.services.chat else {
            return Ok(None);
        };

        let reply = time::timeout(self.command_timeout, chat.chat("console", text))
            .await
            .map_err(|_| Error::CommandTimeout(self.command_timeout))??;

        Ok(Some(wrap_utf8_bytes(
            &reply,
            SAFE_PAYLOAD_BYTES,
            MAX_CHAT_LINES,
            "...",
        )))
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(&self, event: &Event, sender: &Sender) -> Result<(), Error> {
        if event.kind == EventKind::Nick {
            let own = event
                .sender_nick
                .as_deref()
                .is_some_and(|nick| nick.eq_ignore_ascii_case(&sender.nickname()));
            let new_nick = event.text.as_deref().or(event.params.first().map(String::as_str));

            // The server confirmed a change of our own nickname.
            if let (true, Some(new_nick)) = (own, new_nick) {
                sender.update_info(|info| info.nickname = new_nick.to_string());
            }
        }

        self.dispatch(event, sender).await;

        Ok(())
    }
}

/// Splits a command response into the lines to send.
///
/// Newlines always start a new line; long lines are split only if the response asks for it.
#[must_use]
pub fn response_lines(response: &CommandResponse) -> Vec<String> {
    response
        .message
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| {
            if response.split_long_messages {
                split_message_intelligently(line, MAX_RESPONSE_LENGTH)
            } else {
                vec![line.to_string()]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_split_response_on_newlines() {
        let response = CommandResponse::unsplit("one\r\ntwo\n\nthree");

        assert_eq!(response_lines(&response), vec!["one", "two", "three"]);
    }

    #[test]
    fn it_should_split_long_lines_when_asked() {
        let long = "word ".repeat(200);

        let split = response_lines(&CommandResponse::reply(long.clone()));
        let unsplit = response_lines(&CommandResponse::unsplit(long));

        assert!(split.len() > 1);
        assert!(split.iter().all(|line| line.chars().count() <= MAX_RESPONSE_LENGTH));
        assert_eq!(unsplit.len(), 1);
    }

    #[test]
    fn it_should_keep_chain_order() {
        assert_eq!(CHAIN.first(), Some(&Processor::IgnoreSelf));
        assert_eq!(CHAIN.last(), Some(&Processor::AiChat));
    }
}
