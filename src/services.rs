//! Collaborator services the dispatcher calls into.
//!
//! Every capability is optional: the dispatcher skips a processing step when its service is
//! missing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Error;
use crate::command::CommandResolver;
use crate::leet::LeetMatch;

/// Counts words people say.
pub trait WordTracker: Send + Sync {
    /// Records `words` said by `nick` on `server_id`.
    fn track_words(&self, server_id: &str, nick: &str, words: &[String]) -> Result<(), Error>;

    /// Persists any pending state.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Counts drink announcements such as `krak (olut)`.
pub trait DrinkTracker: Send + Sync {
    /// Records that `nick` announced `drink_word` with the given `detail`.
    fn track_drink(
        &self,
        server_id: &str,
        nick: &str,
        drink_word: &str,
        detail: &str,
    ) -> Result<(), Error>;

    /// Persists any pending state.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Counts leet winners.
pub trait LeetTracker: Send + Sync {
    /// Records a detected announcement.
    fn record(&self, server_id: &str, leet: &LeetMatch) -> Result<(), Error>;

    /// Persists any pending state.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Looks up titles of URLs mentioned in a message.
#[async_trait]
pub trait TitleFetcher: Send + Sync {
    /// Returns the lines to announce for URLs in `text`, if any.
    async fn fetch_titles(&self, text: &str) -> Result<Vec<String>, Error>;
}

/// Produces conversational replies.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Returns a reply to `text` from `sender`.
    async fn chat(&self, sender: &str, text: &str) -> Result<String, Error>;
}

/// The set of services available to the dispatcher.
#[derive(Clone, Default)]
pub struct BotServices {
    /// Word counting.
    pub words: Option<Arc<dyn WordTracker>>,
    /// Drink counting.
    pub drinks: Option<Arc<dyn DrinkTracker>>,
    /// Leet winner counting.
    pub leet: Option<Arc<dyn LeetTracker>>,
    /// URL titles.
    pub titles: Option<Arc<dyn TitleFetcher>>,
    /// `!command` execution.
    pub commands: Option<Arc<dyn CommandResolver>>,
    /// AI chat.
    pub chat: Option<Arc<dyn ChatService>>,
}

impl BotServices {
    /// Returns an empty set of services.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the word tracker.
    #[must_use]
    pub fn with_words(mut self, words: Arc<dyn WordTracker>) -> Self {
        self.words = Some(words);
        self
    }

    /// Sets the drink tracker.
    #[must_use]
    pub fn with_drinks(mut self, drinks: Arc<dyn DrinkTracker>) -> Self {
        self.drinks = Some(drinks);
        self
    }

    /// Sets the leet tracker.
    #[must_use]
    pub fn with_leet(mut self, leet: Arc<dyn LeetTracker>) -> Self {
        self.leet = Some(leet);
        self
    }

    /// Sets the title fetcher.
    #[must_use]
    pub fn with_titles(mut self, titles: Arc<dyn TitleFetcher>) -> Self {
        self.titles = Some(titles);
        self
    }

    /// Sets the command resolver.
    #[must_use]
    pub fn with_commands(mut self, commands: Arc<dyn CommandResolver>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Sets the chat service.
    #[must_use]
    pub fn with_chat(mut self, chat: Arc<dyn ChatService>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Persists the state of every tracker, logging failures.
    pub fn flush(&self) {
        let results = [
            ("words", self.words.as_ref().map(|s| s.flush())),
            ("drinks", self.drinks.as_ref().map(|s| s.flush())),
            ("leet", self.leet.as_ref().map(|s| s.flush())),
        ];

        for (service, result) in results {
            if let Some(Err(err)) = result {
                warn!(%service, %err, "could not persist tracker state");
            }
        }
    }
}
