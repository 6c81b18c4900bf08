//! The connection state machine: connect, authenticate, join, read, disconnect.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ::time::OffsetDateTime;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::event::{Event, EventKind};
use super::parser::parse;
use super::reader::LineReader;
use super::sender::{MessageSink, Sender};
use crate::Error;
use crate::config::{ServerConfig, TimingConfig};
use crate::shutdown::Shutdown;

/// Numeric replies that mean registration is complete.
const WELCOME_NUMERICS: [&str; 3] = ["001", "376", "422"];
/// The numeric reply for a nickname that is already taken.
const ERR_NICKNAMEINUSE: &str = "433";

/// The lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Waiting for the server to welcome us.
    Authenticating,
    /// Registered and joined.
    Connected,
    /// Tearing down.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        })
    }
}

/// Mutable state of a single server connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Where in the lifecycle the connection is.
    pub state: ConnectionState,
    /// The nickname in use, which may differ from the configured one after a collision.
    pub nickname: String,
    /// When the connection was established.
    pub connected_at: Option<Instant>,
    /// When we last answered or sent a `PING`.
    pub last_ping: Option<Instant>,
    /// Channels currently joined, in join order.
    pub channels: Vec<String>,
}

impl ConnectionInfo {
    /// Creates the info of a disconnected connection.
    #[must_use]
    pub fn new(nickname: &str) -> Self {
        ConnectionInfo {
            state: ConnectionState::Disconnected,
            nickname: nickname.to_string(),
            connected_at: None,
            last_ping: None,
            channels: vec![],
        }
    }

    /// Returns how long the connection has been established.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|at| at.elapsed())
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.connected_at = None;
        self.channels.clear();
    }
}

/// Timeouts and delays of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Deadline for opening the socket, and separately for registration.
    pub connect_timeout: Duration,
    /// Timeout of a single read.
    pub read_timeout: Duration,
    /// Minimum delay between two outbound lines.
    pub send_delay: Duration,
    /// Idle period before a keepalive ping.
    pub keepalive_idle: Duration,
    /// Wake-up interval of the keepalive task.
    pub keepalive_tick: Duration,
    /// How long to wait for the keepalive task to stop.
    pub keepalive_join_timeout: Duration,
}

impl From<&TimingConfig> for ConnectionOptions {
    fn from(timing: &TimingConfig) -> Self {
        ConnectionOptions {
            connect_timeout: timing.connect_timeout,
            read_timeout: timing.read_timeout,
            send_delay: timing.send_delay,
            keepalive_idle: timing.keepalive_idle,
            keepalive_tick: timing.keepalive_tick,
            keepalive_join_timeout: timing.keepalive_join_timeout,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions::from(&TimingConfig::default())
    }
}

/// Handles parsed events of a given kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles a single event. Errors are logged by the connection and otherwise ignored.
    async fn handle(&self, event: &Event, sender: &Sender) -> Result<(), Error>;
}

/// Sees every raw line before it is parsed.
pub trait RawObserver: Send + Sync {
    /// Observes a single line. Errors are logged by the connection and otherwise ignored.
    fn observe(&self, line: &str) -> Result<(), Error>;
}

impl<F> RawObserver for F
where
    F: Fn(&str) -> Result<(), Error> + Send + Sync,
{
    fn observe(&self, line: &str) -> Result<(), Error> {
        self(line)
    }
}

struct Keepalive {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// A connection to a single IRC server.
pub struct Connection {
    server: ServerConfig,
    options: ConnectionOptions,
    sender: Sender,
    reader: Option<LineReader<OwnedReadHalf>>,
    keepalive: Option<Keepalive>,
    observers: Vec<Arc<dyn RawObserver>>,
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Connection {
    /// Creates a new, disconnected connection to `server`, registering as `nickname` unless the
    /// server config overrides it.
    #[must_use]
    pub fn new(server: ServerConfig, nickname: &str, options: ConnectionOptions) -> Self {
        let address = format!("{}:{}", server.hostname, server.port);
        let sender = Sender::new(
            &server.name,
            &address,
            server.nickname_or(nickname),
            options.send_delay,
        );

        Connection {
            server,
            options,
            sender,
            reader: None,
            keepalive: None,
            observers: vec![],
            handlers: HashMap::new(),
        }
    }

    /// Returns the server config.
    #[must_use]
    pub const fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// Returns a handle for sending lines over this connection.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Returns a snapshot of the connection info.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        self.sender.info()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.sender.state()
    }

    /// Registers an observer for every raw inbound line.
    pub fn add_raw_observer(&mut self, observer: Arc<dyn RawObserver>) {
        self.observers.push(observer);
    }

    /// Registers a handler for events of `kind`.
    pub fn add_handler(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Connects, registers and joins the configured channels.
    ///
    /// On failure the connection is cleaned up and left disconnected.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket can't be opened, the server doesn't welcome us before the
    /// deadline, or the transport fails along the way.
    pub async fn connect(&mut self) -> Result<(), Error> {
        let span = info_span!("connect", server = %self.server.name);

        match self.try_connect().instrument(span).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(server = %self.server.name, %err, "connection attempt failed");
                self.disconnect("Connection failed").await;

                Err(err)
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), Error> {
        let host = self.server.hostname.clone();
        let port = self.server.port;
        let timeout = self.options.connect_timeout;

        self.sender
            .update_info(|info| info.state = ConnectionState::Connecting);
        info!(%host, %port, "connecting");

        let stream = time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| Error::ConnectTimeout(timeout))?
            .map_err(|source| Error::Connect {
                host: host.clone(),
                port,
                source,
            })?;
        let (read, write) = stream.into_split();

        self.sender.attach(Box::new(write)).await;
        self.reader = Some(LineReader::new(read));
        self.sender
            .update_info(|info| info.state = ConnectionState::Authenticating);

        let nickname = self.sender.info().nickname;

        self.sender.send_raw(&format!("NICK {nickname}")).await?;
        self.sender
            .send_raw(&format!("USER {nickname} 0 * :{nickname}"))
            .await?;

        self.authenticate().await?;

        let mut joined = Vec::with_capacity(self.server.channels.len());

        for channel in &self.server.channels {
            match &channel.key {
                Some(key) => {
                    self.sender
                        .send_raw(&format!("JOIN {} {key}", channel.name))
                        .await?;
                }
                None => self.sender.send_raw(&format!("JOIN {}", channel.name)).await?,
            }

            joined.push(channel.name.clone());
        }

        self.sender.update_info(|info| {
            let now = Instant::now();

            info.state = ConnectionState::Connected;
            info.channels = joined;
            info.connected_at = Some(now);
            info.last_ping = Some(now);
        });
        self.keepalive = Some(spawn_keepalive(
            self.sender.clone(),
            self.options.keepalive_idle,
            self.options.keepalive_tick,
        ));

        info!(nickname = %self.sender.info().nickname, "connected");

        Ok(())
    }

    /// Reads lines until the server welcomes us, answering pings and nickname collisions.
    async fn authenticate(&mut self) -> Result<(), Error> {
        let deadline = Instant::now() + self.options.connect_timeout;
        let reader = self.reader.as_mut().ok_or(Error::NotConnected)?;

        loop {
            let lines = time::timeout_at(deadline, reader.read_lines())
                .await
                .map_err(|_| Error::AuthenticationTimeout)??;
            let mut welcomed = false;

            for line in lines {
                trace!(%line, "received line");

                if line.starts_with("PING") {
                    let payload = line.split_once(':').map_or("", |(_, payload)| payload);

                    self.sender.send_raw(&format!("PONG :{payload}")).await?;
                    continue;
                }

                let code = parse(&line).map(|event| event.command_token);

                if line.contains("Nickname is already in use")
                    || code.as_deref() == Some(ERR_NICKNAMEINUSE)
                {
                    let suffix = OffsetDateTime::now_utc().unix_timestamp().rem_euclid(1000);
                    let nickname = self.sender.update_info(|info| {
                        info.nickname = format!("{}{suffix}", info.nickname);
                        info.nickname.clone()
                    });

                    warn!(%nickname, "nickname in use, retrying");
                    self.sender.send_raw(&format!("NICK {nickname}")).await?;
                } else if code.is_some_and(|code| WELCOME_NUMERICS.contains(&code.as_str())) {
                    welcomed = true;
                }
            }

            if welcomed {
                debug!("registration complete");

                return Ok(());
            }
        }
    }

    /// Disconnects from the server, sending `QUIT` with `quit_message` if possible.
    ///
    /// Does nothing if already disconnected.
    pub async fn disconnect(&mut self, quit_message: &str) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }

        self.sender
            .update_info(|info| info.state = ConnectionState::Disconnecting);
        self.stop_keepalive().await;

        if self.sender.is_attached().await {
            let quit = format!("QUIT :{quit_message}");

            if let Err(err) = self.sender.send_raw(&quit).await {
                warn!(server = %self.server.name, %err, "could not send quit");
            }
        }

        if let Some(mut stream) = self.sender.detach().await {
            if let Err(err) = stream.shutdown().await {
                debug!(server = %self.server.name, %err, "socket shutdown failed");
            }
        }

        self.reader = None;
        self.sender.update_info(ConnectionInfo::reset);

        info!(server = %self.server.name, "disconnected");
    }

    async fn stop_keepalive(&mut self) {
        let Some(Keepalive { handle, stop }) = self.keepalive.take() else {
            return;
        };

        stop.send_replace(true);

        let abort = handle.abort_handle();

        if time::timeout(self.options.keepalive_join_timeout, handle)
            .await
            .is_err()
        {
            warn!(server = %self.server.name, "keepalive task did not stop, aborting");
            abort.abort();
        }
    }

    /// Reads the next batch of lines and processes them.
    ///
    /// Every line is shown to the raw observers, parsed, answered if it is a `PING` and passed
    /// to the handlers registered for its kind. A read timeout yields an empty batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the server closed the connection or the transport failed.
    pub async fn read_messages(&mut self) -> Result<Vec<Event>, Error> {
        if self.state() != ConnectionState::Connected {
            return Ok(vec![]);
        }

        let reader = self.reader.as_mut().ok_or(Error::NotConnected)?;
        let Ok(lines) = time::timeout(self.options.read_timeout, reader.read_lines()).await else {
            return Ok(vec![]);
        };
        let lines = lines?;
        let mut events = Vec::with_capacity(lines.len());

        for line in lines {
            trace!(%line, "received line");

            for observer in &self.observers {
                if let Err(err) = observer.observe(&line) {
                    warn!(%err, "raw observer failed");
                }
            }

            let Some(event) = parse(&line) else {
                debug!(%line, "dropping unparseable line");
                continue;
            };

            if event.kind == EventKind::Ping {
                let payload = event
                    .text
                    .as_deref()
                    .or_else(|| event.params.first().map(String::as_str))
                    .unwrap_or("pong");

                self.sender.send_raw(&format!("PONG :{payload}")).await?;
                self.sender.touch_ping();
            }

            if let Some(handlers) = self.handlers.get(&event.kind) {
                for handler in handlers {
                    if let Err(err) = handler.handle(&event, &self.sender).await {
                        warn!(kind = %event.kind, %err, "event handler failed");
                    }
                }
            }

            events.push(event);
        }

        Ok(events)
    }

    /// Processes incoming lines until disconnected or `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop, e.g. [`Error::ConnectionLost`].
    pub async fn run_forever(&mut self, shutdown: &Shutdown) -> Result<(), Error> {
        while !shutdown.is_stopped() && self.state() == ConnectionState::Connected {
            self.read_messages().await?;
        }

        Ok(())
    }
}

/// Spawns the task that pings the server after a period of silence.
fn spawn_keepalive(sender: Sender, idle: Duration, tick: Duration) -> Keepalive {
    let (stop, mut stopped) = watch::channel(false);
    let span = info_span!("keepalive", server = %sender.server_id());

    let handle = tokio::spawn(
        async move {
            loop {
                let idle_for = sender.info().last_ping.map(|at| at.elapsed());

                if idle_for.is_some_and(|elapsed| elapsed > idle) {
                    debug!("sending keepalive ping");

                    if let Err(err) = sender.send_raw("PING :keepalive").await {
                        warn!(%err, "keepalive ping failed");
                        break;
                    }

                    sender.touch_ping();
                }

                tokio::select! {
                    () = time::sleep(tick) => {}
                    _ = stopped.changed() => break,
                }
            }

            trace!("keepalive stopped");
        }
        .instrument(span),
    );

    Keepalive { handle, stop }
}
