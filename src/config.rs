use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::consts;

/// The prefix for environment variables that override configuration values.
pub const ENV_PREFIX: &str = "LEETBOT_";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Bot behaviour configuration
    pub bot: BotConfig,
    /// The IRC servers to connect to
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Config {
    /// Loads the configuration from the TOML file at `path`, with `LEETBOT_`-prefixed
    /// environment variables taking precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or required values are missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Returns the figment used to load the configuration.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BotConfig {
    /// The nickname the bot registers with, unless a server overrides it
    pub nickname: String,
    /// The message sent with `QUIT` on shutdown
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
    /// Send replies as `NOTICE` rather than `PRIVMSG`
    #[serde(default)]
    pub use_notices: bool,
    /// Read commands from standard input
    #[serde(default = "default_true")]
    pub console: bool,
    /// Fetch and announce titles of URLs posted in channels
    #[serde(default = "default_true")]
    pub fetch_titles: bool,
    /// Directory where tracker state is persisted
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Nicknames whose leet summaries are counted. Empty means everyone.
    #[serde(default)]
    pub leet_announcers: Vec<String>,
    /// Timeouts and delays
    #[serde(default)]
    pub timing: TimingConfig,
}

impl BotConfig {
    /// Returns a config for `nickname` with every other value at its default.
    #[must_use]
    pub fn new(nickname: impl Into<String>) -> Self {
        BotConfig {
            nickname: nickname.into(),
            quit_message: default_quit_message(),
            use_notices: false,
            console: true,
            fetch_titles: true,
            data_dir: default_data_dir(),
            leet_announcers: vec![],
            timing: TimingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Deadline for opening the socket and, separately, for registration
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout of a single socket read
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Minimum delay between two outbound lines
    #[serde(default = "default_send_delay", with = "humantime_serde")]
    pub send_delay: Duration,
    /// Idle period after which a keepalive `PING` is sent
    #[serde(default = "default_keepalive_idle", with = "humantime_serde")]
    pub keepalive_idle: Duration,
    /// How often the keepalive task wakes up
    #[serde(default = "default_keepalive_tick", with = "humantime_serde")]
    pub keepalive_tick: Duration,
    /// How long to wait for the keepalive task to exit on disconnect
    #[serde(default = "default_keepalive_join_timeout", with = "humantime_serde")]
    pub keepalive_join_timeout: Duration,
    /// Wait between reconnect attempts
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
    /// Upper bound for a single command invocation
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
    /// How long to wait for the console task on shutdown
    #[serde(default = "default_console_join_timeout", with = "humantime_serde")]
    pub console_join_timeout: Duration,
    /// How often tracker state is written to disk while running
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            connect_timeout: consts::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: consts::DEFAULT_READ_TIMEOUT,
            send_delay: consts::DEFAULT_SEND_DELAY,
            keepalive_idle: consts::DEFAULT_KEEPALIVE_IDLE,
            keepalive_tick: consts::DEFAULT_KEEPALIVE_TICK,
            keepalive_join_timeout: consts::DEFAULT_KEEPALIVE_JOIN_TIMEOUT,
            reconnect_delay: consts::DEFAULT_RECONNECT_DELAY,
            command_timeout: consts::DEFAULT_COMMAND_TIMEOUT,
            console_join_timeout: consts::DEFAULT_CONSOLE_JOIN_TIMEOUT,
            flush_interval: consts::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// The channel name, including the `#`.
    pub name: String,
    /// The shared key to access the channel.
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Identifier used in logs and by the notification sink.
    pub name: String,
    /// The hostname of the server to connect to.
    pub hostname: String,
    /// The port number of the server to connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overrides the bot's nickname on this server.
    pub nickname: Option<String>,
    /// Channels to join once registered, in order.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl ServerConfig {
    /// Returns the nickname to register with, falling back to `default`.
    #[must_use]
    pub fn nickname_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.nickname.as_deref().unwrap_or(default)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Enable exporting spans over OTLP
    #[serde(default)]
    pub enabled: bool,
    /// Format of the log lines written to stdout
    #[serde(default)]
    pub format: LogFormat,
}

fn default_quit_message() -> String {
    String::from("Goodbye!")
}

const fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_port() -> u16 {
    6667
}

#[must_use]
pub const fn default_connect_timeout() -> Duration {
    consts::DEFAULT_CONNECT_TIMEOUT
}

#[must_use]
pub const fn default_read_timeout() -> Duration {
    consts::DEFAULT_READ_TIMEOUT
}

#[must_use]
pub const fn default_send_delay() -> Duration {
    consts::DEFAULT_SEND_DELAY
}

#[must_use]
pub const fn default_keepalive_idle() -> Duration {
    consts::DEFAULT_KEEPALIVE_IDLE
}

#[must_use]
pub const fn default_keepalive_tick() -> Duration {
    consts::DEFAULT_KEEPALIVE_TICK
}

#[must_use]
pub const fn default_keepalive_join_timeout() -> Duration {
    consts::DEFAULT_KEEPALIVE_JOIN_TIMEOUT
}

#[must_use]
pub const fn default_reconnect_delay() -> Duration {
    consts::DEFAULT_RECONNECT_DELAY
}

#[must_use]
pub const fn default_command_timeout() -> Duration {
    consts::DEFAULT_COMMAND_TIMEOUT
}

#[must_use]
pub const fn default_console_join_timeout() -> Duration {
    consts::DEFAULT_CONSOLE_JOIN_TIMEOUT
}

#[must_use]
pub const fn default_flush_interval() -> Duration {
    consts::DEFAULT_FLUSH_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        [bot]
        nickname = "leetbot"
        leet_announcers = ["Beici"]

        [bot.timing]
        send_delay = "250ms"
        reconnect_delay = "1m"
        flush_interval = "10m"

        [[servers]]
        name = "local"
        hostname = "127.0.0.1"
        channels = [{ name = "#leet", key = "hunter2" }, { name = "#other" }]
    "##;

    #[test]
    fn it_should_load_config_with_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let config = Config::load("config.toml")?;

            assert_eq!(config.bot.nickname, "leetbot");
            assert_eq!(config.bot.quit_message, "Goodbye!");
            assert!(config.bot.console);
            assert_eq!(config.bot.timing.send_delay, Duration::from_millis(250));
            assert_eq!(config.bot.timing.reconnect_delay, Duration::from_secs(60));
            assert_eq!(config.bot.timing.keepalive_idle, Duration::from_secs(120));
            assert_eq!(config.bot.timing.flush_interval, Duration::from_secs(600));
            assert_eq!(config.servers[0].port, 6667);
            assert_eq!(config.servers[0].channels[0].key.as_deref(), Some("hunter2"));
            assert_eq!(config.servers[0].channels[1].key, None);

            Ok(())
        });
    }

    #[test]
    fn it_should_let_env_override_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("LEETBOT_BOT__NICKNAME", "otherbot");
            jail.set_env("LEETBOT_BOT__USE_NOTICES", "true");

            let config = Config::load("config.toml")?;

            assert_eq!(config.bot.nickname, "otherbot");
            assert!(config.bot.use_notices);

            Ok(())
        });
    }

    #[test]
    fn server_nickname_falls_back_to_default() {
        let mut server = ServerConfig::default();

        assert_eq!(server.nickname_or("leetbot"), "leetbot");

        server.nickname = Some("leetbot2".to_string());

        assert_eq!(server.nickname_or("leetbot"), "leetbot2");
    }
}
