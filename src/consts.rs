use std::time::Duration;

/// The `User-Agent` header to send when issuing HTTP requests.
pub const HTTP_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:141.0) Gecko/20100101 Firefox/141.0";

/// The duration before a HTTP request times out.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// The default deadline for opening the socket and for completing registration.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The default per-read timeout. Kept short so the read loop notices shutdown quickly.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The default minimum delay between two outbound lines.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_secs(1);

/// The default idle period after which the keepalive task sends a `PING`.
pub const DEFAULT_KEEPALIVE_IDLE: Duration = Duration::from_secs(120);

/// The default sleep increment of the keepalive task.
pub const DEFAULT_KEEPALIVE_TICK: Duration = Duration::from_secs(1);

/// The default time to wait for the keepalive task to exit on disconnect.
pub const DEFAULT_KEEPALIVE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// The default upper bound for a single command invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// The default interval between saves of tracker state.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// The default time to wait for the console task on shutdown.
pub const DEFAULT_CONSOLE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The longest inbound line accepted, in bytes, including tags and the line terminator.
pub const MAX_LINE_LENGTH: usize = 8192;

/// The maximum number of characters per line when splitting command responses.
pub const MAX_RESPONSE_LENGTH: usize = 400;

/// Conservative payload limit in bytes for wrapped chat replies.
pub const SAFE_PAYLOAD_BYTES: usize = 425;

/// The maximum number of lines a chat reply is wrapped into.
pub const MAX_CHAT_LINES: usize = 5;

/// Words tracked as drink announcements, e.g. `krak (olut)`.
pub const DRINK_WORDS: &[&str] = &[
    "krak", "kr1k", "kr0k", "narsk", "parsk", "tlup", "marsk", "tsup", "plop",
];
