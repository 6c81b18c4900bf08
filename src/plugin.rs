//! Built-in command plugins and the registry that resolves `!commands` to them.

use async_trait::async_trait;
use tracing::debug;

use crate::Error;
use crate::command::{CommandContext, CommandResolver, CommandResponse, ParsedCommand};

/// The name of a plugin.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Name(pub &'static str);
/// The author of a plugin.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Author(pub &'static str);
/// The version of a plugin.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Version(pub &'static str);

/// Echoes text back to the sender
pub mod echo;
/// Tells the current time
pub mod time;
/// Reports the bot version
pub mod version;

/// Common includes used in plugins.
mod prelude {
    pub use super::{Author, Name, Plugin, Version};
    pub use crate::Error;
    pub use crate::command::{CommandContext, CommandResponse, ParsedCommand};
    pub use async_trait::async_trait;
}

/// The base trait that all plugins must implement.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Returns the name of the plugin, which is also its command name.
    fn name() -> Name
    where
        Self: Sized;

    /// Returns the author of the plugin.
    fn author() -> Author
    where
        Self: Sized;

    /// Returns the version of the plugin.
    fn version() -> Version
    where
        Self: Sized;

    /// Returns alternative command names.
    fn aliases() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }

    /// Returns a one-line usage description.
    fn usage() -> &'static str
    where
        Self: Sized;

    /// The constructor for a new plugin.
    fn new() -> Self
    where
        Self: Sized;

    /// Executes the command.
    async fn execute(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse, Error>;
}

struct Entry {
    name: Name,
    aliases: &'static [&'static str],
    usage: &'static str,
    plugin: Box<dyn Plugin>,
}

impl Entry {
    fn matches(&self, command: &str) -> bool {
        self.name.0 == command || self.aliases.contains(&command)
    }
}

/// Plugin registry.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// Constructs and returns a new, empty plugin registry.
    #[must_use]
    pub fn new() -> Registry {
        Registry { entries: vec![] }
    }

    /// Constructs and returns a new plugin registry with the built-in plugins.
    #[must_use]
    pub fn preloaded() -> Registry {
        let mut registry = Self::new();
        debug!("registering plugins");

        registry.register::<echo::Echo>();
        registry.register::<time::Time>();
        registry.register::<version::BotVersion>();

        let num_plugins = registry.entries.len();
        debug!(%num_plugins, "finished registering plugins");

        registry
    }

    /// Registers a new plugin based on its type.
    ///
    /// Returns `false` if a plugin already answers to the same name.
    pub fn register<P: Plugin + 'static>(&mut self) -> bool {
        let name = P::name();

        if self.find(name.0).is_some() {
            return false;
        }

        debug!(name = name.0, version = P::version().0, author = P::author().0, "registering plugin");

        self.entries.push(Entry {
            name,
            aliases: P::aliases(),
            usage: P::usage(),
            plugin: Box::new(P::new()),
        });

        true
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, command: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.matches(command))
    }

    fn help(&self, command: &ParsedCommand) -> CommandResponse {
        if let Some(topic) = command.args.first() {
            let topic = topic.trim_start_matches('!').to_lowercase();

            return match self.find(&topic) {
                Some(entry) => CommandResponse::reply(format!("!{}: {}", entry.name.0, entry.usage)),
                None => CommandResponse::reply(format!("Unknown command: !{topic}")),
            };
        }

        let names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                if entry.aliases.is_empty() {
                    format!("!{}", entry.name.0)
                } else {
                    format!("!{} ({})", entry.name.0, entry.aliases.join(", "))
                }
            })
            .collect();

        CommandResponse::reply(format!("Commands: !help, {}", names.join(", ")))
    }
}

#[async_trait]
impl CommandResolver for Registry {
    async fn resolve(
        &self,
        text: &str,
        context: &CommandContext,
    ) -> Result<Option<CommandResponse>, Error> {
        let Some(command) = crate::command::parse_command_message(text) else {
            return Ok(None);
        };

        if command.name == "help" {
            return Ok(Some(self.help(&command)));
        }

        let Some(entry) = self.find(&command.name) else {
            return Ok(None);
        };

        debug!(name = entry.name.0, args = ?command.args, "executing command");

        entry
            .plugin
            .execute(&command, context)
            .await
            .map(Some)
            .map_err(|err| Error::Command {
                name: command.name.clone(),
                source: Box::new(err),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name() -> Name {
            Name("fail")
        }

        fn author() -> Author {
            Author("test")
        }

        fn version() -> Version {
            Version("0.1")
        }

        fn usage() -> &'static str {
            "always fails"
        }

        fn new() -> Self {
            Failing
        }

        async fn execute(
            &self,
            _command: &ParsedCommand,
            _context: &CommandContext,
        ) -> Result<CommandResponse, Error> {
            Err(Error::NotConnected)
        }
    }

    #[tokio::test]
    async fn it_should_resolve_by_alias_case_insensitively() {
        let registry = Registry::preloaded();
        let context = CommandContext {
            sender: Some("nick".to_string()),
            ..Default::default()
        };

        let response = registry.resolve("!ECHO hi there", &context).await.unwrap();

        assert_eq!(response, Some(CommandResponse::reply("nick: hi there")));
    }

    #[tokio::test]
    async fn it_should_return_none_for_unknown_commands() {
        let registry = Registry::preloaded();

        let response = registry
            .resolve("!nosuchcommand", &CommandContext::console())
            .await
            .unwrap();

        assert_eq!(response, None);
    }

    #[tokio::test]
    async fn it_should_list_commands_in_help() {
        let registry = Registry::preloaded();

        let response = registry
            .resolve("!help", &CommandContext::console())
            .await
            .unwrap()
            .unwrap();

        assert!(response.message.contains("!kaiku (echo)"));
        assert!(response.message.contains("!version"));
    }

    #[tokio::test]
    async fn it_should_wrap_plugin_errors() {
        let mut registry = Registry::new();

        assert!(registry.register::<Failing>());
        assert!(!registry.register::<Failing>());

        let result = registry.resolve("!fail", &CommandContext::console()).await;

        assert!(matches!(result, Err(Error::Command { name, .. }) if name == "fail"));
    }
}
