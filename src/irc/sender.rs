//! The rate-limited write side of a connection.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};
use tracing::trace;

use super::connection::{ConnectionInfo, ConnectionState};
use crate::Error;

/// A boxed write half of a transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Enforces a minimum delay between two outbound lines.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    delay: Duration,
    last_send: Option<Instant>,
}

impl RateLimiter {
    /// Creates a limiter that spaces sends at least `delay` apart.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        RateLimiter {
            delay,
            last_send: None,
        }
    }

    /// Returns how long a send issued at `now` has to wait.
    #[must_use]
    pub fn delay_needed(&self, now: Instant) -> Duration {
        self.last_send.map_or(Duration::ZERO, |last| {
            self.delay.saturating_sub(now.saturating_duration_since(last))
        })
    }

    /// Records a successful send at `at`.
    pub const fn record(&mut self, at: Instant) {
        self.last_send = Some(at);
    }
}

struct Writer {
    stream: Option<BoxedWriter>,
    limiter: RateLimiter,
}

struct Shared {
    server_id: String,
    address: String,
    info: Mutex<ConnectionInfo>,
    writer: tokio::sync::Mutex<Writer>,
}

/// A cheaply cloneable handle for sending lines to a server.
///
/// All clones share the same socket, rate limiter and [`ConnectionInfo`], so the read loop,
/// the keepalive task and the notification sink are serialized against each other.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<Shared>,
}

impl Sender {
    /// Creates a detached sender for the server identified by `server_id`.
    #[must_use]
    pub fn new(server_id: &str, address: &str, nickname: &str, send_delay: Duration) -> Self {
        Sender {
            inner: Arc::new(Shared {
                server_id: server_id.to_string(),
                address: address.to_string(),
                info: Mutex::new(ConnectionInfo::new(nickname)),
                writer: tokio::sync::Mutex::new(Writer {
                    stream: None,
                    limiter: RateLimiter::new(send_delay),
                }),
            }),
        }
    }

    fn lock_info(&self) -> MutexGuard<'_, ConnectionInfo> {
        // A poisoned lock only means a panic happened mid-update; the fields are still valid.
        self.inner
            .info
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns a snapshot of the connection info.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        self.lock_info().clone()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock_info().state
    }

    /// Applies `f` to the connection info while holding its lock.
    pub fn update_info<T>(&self, f: impl FnOnce(&mut ConnectionInfo) -> T) -> T {
        f(&mut self.lock_info())
    }

    /// Refreshes the `last_ping` timestamp.
    pub fn touch_ping(&self) {
        self.update_info(|info| info.last_ping = Some(Instant::now()));
    }

    /// Attaches the write half of a freshly opened transport.
    pub async fn attach(&self, stream: BoxedWriter) {
        self.inner.writer.lock().await.stream = Some(stream);
    }

    /// Detaches and returns the write half, if any.
    pub async fn detach(&self) -> Option<BoxedWriter> {
        self.inner.writer.lock().await.stream.take()
    }

    /// Returns true if a transport is attached.
    pub async fn is_attached(&self) -> bool {
        self.inner.writer.lock().await.stream.is_some()
    }

    /// Sends a single protocol line, waiting for the rate limiter first.
    ///
    /// Embedded CR and LF characters are replaced with spaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if there is no live transport, or [`Error::Send`] if the
    /// write fails.
    pub async fn send_raw(&self, line: &str) -> Result<(), Error> {
        let mut guard = self.inner.writer.lock().await;
        let writer = &mut *guard;

        if self.state() == ConnectionState::Disconnected || writer.stream.is_none() {
            return Err(Error::NotConnected);
        }

        let wait = writer.limiter.delay_needed(Instant::now());

        if !wait.is_zero() {
            trace!(?wait, "rate limiting");
            time::sleep(wait).await;
        }

        let stream = writer.stream.as_mut().ok_or(Error::NotConnected)?;
        let line = sanitize(line);

        stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(Error::Send)?;
        stream.flush().await.map_err(Error::Send)?;

        writer.limiter.record(Instant::now());
        trace!(server = %self.inner.server_id, %line, "sent line");

        Ok(())
    }

    /// Joins `channel`, with an optional key, and tracks it as joined.
    ///
    /// # Errors
    ///
    /// Returns an error if the `JOIN` could not be sent.
    pub async fn join_channel(&self, channel: &str, key: Option<&str>) -> Result<(), Error> {
        match key {
            Some(key) => self.send_raw(&format!("JOIN {channel} {key}")).await?,
            None => self.send_raw(&format!("JOIN {channel}")).await?,
        }

        self.update_info(|info| {
            if !info.channels.iter().any(|c| c.eq_ignore_ascii_case(channel)) {
                info.channels.push(channel.to_string());
            }
        });

        Ok(())
    }

    /// Leaves `channel` and stops tracking it.
    ///
    /// # Errors
    ///
    /// Returns an error if the `PART` could not be sent.
    pub async fn part_channel(&self, channel: &str, reason: Option<&str>) -> Result<(), Error> {
        match reason {
            Some(reason) => self.send_raw(&format!("PART {channel} :{reason}")).await?,
            None => self.send_raw(&format!("PART {channel}")).await?,
        }

        self.update_info(|info| info.channels.retain(|c| !c.eq_ignore_ascii_case(channel)));

        Ok(())
    }

    /// Requests a nickname change.
    ///
    /// # Errors
    ///
    /// Returns an error if the `NICK` could not be sent.
    pub async fn change_nickname(&self, nickname: &str) -> Result<(), Error> {
        self.send_raw(&format!("NICK {nickname}")).await?;
        self.update_info(|info| info.nickname = nickname.to_string());

        Ok(())
    }

    /// Returns a one-line human readable status.
    #[must_use]
    pub fn status(&self) -> String {
        let info = self.info();
        let uptime = info
            .uptime()
            .map_or_else(|| "-".to_string(), |d| format!("{:.1}s", d.as_secs_f64()));
        let channels = if info.channels.is_empty() {
            "-".to_string()
        } else {
            info.channels.join(", ")
        };

        format!(
            "State: {} | Nick: {} | Server: {} | Uptime: {uptime} | Channels: {channels}",
            info.state, info.nickname, self.inner.address
        )
    }
}

/// Replaces line terminators so a payload can never split a protocol line.
fn sanitize(line: &str) -> String {
    line.replace(['\r', '\n'], " ")
}

/// Anything that can deliver lines to an IRC server.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Sends a single raw protocol line.
    async fn send_raw(&self, line: &str) -> Result<(), Error>;

    /// Returns the identifier of the server this sink delivers to.
    fn server_id(&self) -> &str;

    /// Returns the nickname currently in use on the server.
    fn nickname(&self) -> String;

    /// Sends a `PRIVMSG`.
    async fn send_message(&self, target: &str, text: &str) -> Result<(), Error> {
        self.send_raw(&format!("PRIVMSG {target} :{text}")).await
    }

    /// Sends a `NOTICE`.
    async fn send_notice(&self, target: &str, text: &str) -> Result<(), Error> {
        self.send_raw(&format!("NOTICE {target} :{text}")).await
    }

    /// Sends a CTCP `ACTION`, i.e. `/me`.
    async fn send_action(&self, target: &str, text: &str) -> Result<(), Error> {
        self.send_raw(&format!("PRIVMSG {target} :\x01ACTION {text}\x01"))
            .await
    }
}

#[async_trait]
impl MessageSink for Sender {
    async fn send_raw(&self, line: &str) -> Result<(), Error> {
        Sender::send_raw(self, line).await
    }

    fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    fn nickname(&self) -> String {
        self.lock_info().nickname.clone()
    }
}
