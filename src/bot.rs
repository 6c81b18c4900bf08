//! The main process: one reconnecting connection per server plus the console.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::Error;
use crate::config::{BotConfig, Config};
use crate::console::Console;
use crate::dispatcher::Dispatcher;
use crate::irc::{Connection, ConnectionOptions, EventKind};
use crate::notify::Notifier;
use crate::plugin::Registry;
use crate::services::BotServices;
use crate::shutdown::Shutdown;
use crate::title::HttpTitleFetcher;
use crate::trackers::{DrinkCounts, LeetStats, WordCounts};

/// The event kinds the dispatcher is registered for.
const DISPATCHED_KINDS: [EventKind; 6] = [
    EventKind::Privmsg,
    EventKind::Notice,
    EventKind::Join,
    EventKind::Part,
    EventKind::Quit,
    EventKind::Nick,
];

/// A connection that can be established, run and torn down repeatedly.
#[async_trait]
pub trait Session: Send {
    /// Returns a name for logging.
    fn name(&self) -> &str;

    /// Establishes the session.
    async fn connect(&mut self) -> Result<(), Error>;

    /// Runs until the session ends or `shutdown` is triggered.
    async fn run(&mut self, shutdown: &Shutdown) -> Result<(), Error>;

    /// Tears the session down.
    async fn disconnect(&mut self, quit_message: &str);
}

#[async_trait]
impl Session for Connection {
    fn name(&self) -> &str {
        &self.server().name
    }

    async fn connect(&mut self) -> Result<(), Error> {
        Connection::connect(self).await
    }

    async fn run(&mut self, shutdown: &Shutdown) -> Result<(), Error> {
        self.run_forever(shutdown).await
    }

    async fn disconnect(&mut self, quit_message: &str) {
        Connection::disconnect(self, quit_message).await;
    }
}

/// Keeps `session` connected until `shutdown` is triggered, waiting `backoff` after every
/// failed or lost connection.
pub async fn maintain<S: Session>(
    session: &mut S,
    shutdown: &Shutdown,
    backoff: Duration,
    quit_message: &str,
) {
    while !shutdown.is_stopped() {
        let attempt = tokio::select! {
            result = session.connect() => Some(result),
            () = shutdown.stopped() => None,
        };

        match attempt {
            None => {
                session.disconnect(quit_message).await;
                break;
            }
            Some(Ok(())) => {
                let result = session.run(shutdown).await;

                if shutdown.is_stopped() {
                    session.disconnect(quit_message).await;
                    break;
                }

                match result {
                    Ok(()) => warn!(server = session.name(), "connection closed"),
                    Err(err) => warn!(server = session.name(), %err, "connection lost"),
                }

                session.disconnect(quit_message).await;
            }
            Some(Err(err)) => warn!(server = session.name(), %err, "could not connect"),
        }

        info!(server = session.name(), ?backoff, "reconnecting after backoff");

        if !shutdown.sleep(backoff).await {
            break;
        }
    }
}

/// Persists tracker state every `every` until `shutdown` is triggered.
///
/// A zero interval disables periodic saves.
pub async fn flush_periodically(services: BotServices, every: Duration, shutdown: Shutdown) {
    if every.is_zero() {
        return;
    }

    let mut interval = time::interval_at(Instant::now() + every, every);

    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                debug!("persisting tracker state");
                services.flush();
            }
            () = shutdown.stopped() => break,
        }
    }
}

/// Resolves when the process is asked to terminate.
#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            error!(%err, "could not listen for termination");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}

/// Builds the services backed by files in the data directory.
///
/// # Errors
///
/// Returns an error if persisted state can't be loaded or the HTTP client fails to build.
pub fn default_services(config: &BotConfig) -> Result<BotServices, Error> {
    let data_dir = &config.data_dir;
    let mut services = BotServices::new()
        .with_words(Arc::new(WordCounts::load(data_dir)?))
        .with_drinks(Arc::new(DrinkCounts::load(data_dir)?))
        .with_leet(Arc::new(LeetStats::load(data_dir)?))
        .with_commands(Arc::new(Registry::preloaded()));

    if config.fetch_titles {
        services = services.with_titles(Arc::new(HttpTitleFetcher::new()?));
    }

    Ok(services)
}

/// The bot runtime.
pub struct Bot {
    config: Config,
    services: BotServices,
    notifier: Notifier,
}

impl Bot {
    /// Creates a bot from `config` with the given services.
    #[must_use]
    pub fn new(config: Config, services: BotServices) -> Self {
        Bot {
            config,
            services,
            notifier: Notifier::new(),
        }
    }

    /// Returns the notification sink, for background services that post to IRC.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Runs every server connection, and the console if `console_input` is given, until
    /// interrupted or asked to quit.
    pub async fn run(self, console_input: Option<mpsc::Receiver<String>>) {
        let (trigger, shutdown) = Shutdown::new();
        let bot = &self.config.bot;
        let dispatcher = Arc::new(Dispatcher::new(bot, self.services.clone()));
        let mut tasks = Vec::with_capacity(self.config.servers.len());

        for server in &self.config.servers {
            let mut connection = Connection::new(
                server.clone(),
                &bot.nickname,
                ConnectionOptions::from(&bot.timing),
            );

            for kind in DISPATCHED_KINDS {
                connection.add_handler(kind, dispatcher.clone());
            }

            self.notifier.register(connection.sender()).await;

            let shutdown = shutdown.clone();
            let quit_message = bot.quit_message.clone();
            let backoff = bot.timing.reconnect_delay;
            let span = info_span!("server", name = %server.name);

            tasks.push(tokio::spawn(
                async move {
                    maintain(&mut connection, &shutdown, backoff, &quit_message).await;
                }
                .instrument(span),
            ));
        }

        let flusher = tokio::spawn(flush_periodically(
            self.services.clone(),
            bot.timing.flush_interval,
            shutdown.clone(),
        ));

        info!(servers = tasks.len(), "bot started");

        let console = console_input.map(|input| {
            let console = Console::new(
                dispatcher.clone(),
                self.notifier.clone(),
                trigger.clone(),
                shutdown.clone(),
            );

            tokio::spawn(async move {
                if let Err(err) = console.run(input, tokio::io::stdout()).await {
                    warn!(%err, "console stopped");
                }
            })
        });

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("interrupt received"),
                Err(err) => {
                    error!(%err, "could not listen for interrupts");
                    shutdown.stopped().await;
                }
            },
            () = terminated() => info!("termination requested"),
            () = shutdown.stopped() => {}
        }

        info!("shutting down");
        trigger.trigger();

        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                error!(%err, "server task failed");
            }
        }

        if let Some(handle) = console {
            let abort = handle.abort_handle();

            if time::timeout(bot.timing.console_join_timeout, handle)
                .await
                .is_err()
            {
                warn!("console did not stop in time");
                abort.abort();
            }
        }

        if let Err(err) = flusher.await {
            error!(%err, "flush task failed");
        }

        self.services.flush();
        info!("bye");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::services::WordTracker;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(Duration),
        Disconnect(String),
    }

    /// A session whose connects fail until `succeed_after` attempts, and whose runs either end
    /// immediately with a lost connection or last until shutdown.
    struct FakeSession {
        start: Instant,
        attempts: usize,
        succeed_after: usize,
        run_until_stopped: bool,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeSession {
        fn new(succeed_after: usize, run_until_stopped: bool) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(vec![]));
            let session = FakeSession {
                start: Instant::now(),
                attempts: 0,
                succeed_after,
                run_until_stopped,
                calls: calls.clone(),
            };

            (session, calls)
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        fn name(&self) -> &str {
            "fake"
        }

        async fn connect(&mut self) -> Result<(), Error> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Connect(self.start.elapsed()));
            self.attempts += 1;

            if self.attempts > self.succeed_after {
                Ok(())
            } else {
                Err(Error::ConnectTimeout(Duration::from_secs(30)))
            }
        }

        async fn run(&mut self, shutdown: &Shutdown) -> Result<(), Error> {
            if self.run_until_stopped {
                shutdown.stopped().await;
                Ok(())
            } else {
                Err(Error::ConnectionLost)
            }
        }

        async fn disconnect(&mut self, quit_message: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Disconnect(quit_message.to_string()));
        }
    }

    fn connect_times(calls: &Mutex<Vec<Call>>) -> Vec<Duration> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Connect(at) => Some(*at),
                Call::Disconnect(_) => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_wait_backoff_between_failed_connects() {
        let (mut session, calls) = FakeSession::new(usize::MAX, false);
        let (trigger, shutdown) = Shutdown::new();
        let backoff = Duration::from_secs(30);

        let handle = tokio::spawn(async move {
            maintain(&mut session, &shutdown, backoff, "bye").await;
        });

        time::sleep(Duration::from_secs(65)).await;
        trigger.trigger();
        handle.await.unwrap();

        let times = connect_times(&calls);

        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|pair| pair[1] - pair[0] >= backoff));
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_interrupt_backoff_on_shutdown() {
        let (mut session, calls) = FakeSession::new(usize::MAX, false);
        let (trigger, shutdown) = Shutdown::new();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            maintain(&mut session, &shutdown, Duration::from_secs(30), "bye").await;
        });

        time::sleep(Duration::from_secs(5)).await;
        trigger.trigger();
        handle.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(connect_times(&calls).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_reconnect_after_lost_connection() {
        let (mut session, calls) = FakeSession::new(0, false);
        let (trigger, shutdown) = Shutdown::new();

        let handle = tokio::spawn(async move {
            maintain(&mut session, &shutdown, Duration::from_secs(30), "bye").await;
        });

        time::sleep(Duration::from_secs(31)).await;
        trigger.trigger();
        handle.await.unwrap();

        let calls = calls.lock().unwrap().clone();

        assert_eq!(
            calls,
            vec![
                Call::Connect(Duration::ZERO),
                Call::Disconnect("bye".to_string()),
                Call::Connect(Duration::from_secs(30)),
                Call::Disconnect("bye".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_quit_when_stopped_while_running() {
        let (mut session, calls) = FakeSession::new(0, true);
        let (trigger, shutdown) = Shutdown::new();

        let handle = tokio::spawn(async move {
            maintain(&mut session, &shutdown, Duration::from_secs(30), "Goodbye!").await;
        });

        time::sleep(Duration::from_secs(120)).await;
        trigger.trigger();
        handle.await.unwrap();

        assert_eq!(
            calls.lock().unwrap().clone(),
            vec![
                Call::Connect(Duration::ZERO),
                Call::Disconnect("Goodbye!".to_string()),
            ]
        );
    }

    #[derive(Default)]
    struct CountingFlushes(AtomicUsize);

    impl WordTracker for CountingFlushes {
        fn track_words(&self, _server_id: &str, _nick: &str, _words: &[String]) -> Result<(), Error> {
            Ok(())
        }

        fn flush(&self) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);

            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn it_should_flush_trackers_periodically_until_stopped() {
        let words = Arc::new(CountingFlushes::default());
        let services = BotServices::new().with_words(words.clone());
        let (trigger, shutdown) = Shutdown::new();

        let handle = tokio::spawn(flush_periodically(
            services,
            Duration::from_secs(600),
            shutdown,
        ));

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(words.0.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(25 * 60)).await;
        assert_eq!(words.0.load(Ordering::SeqCst), 2);

        trigger.trigger();
        handle.await.unwrap();

        time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(words.0.load(Ordering::SeqCst), 2);
    }
}
