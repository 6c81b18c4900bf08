//! Commands typed on standard input.

use std::io::BufRead;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::Error;
use crate::dispatcher::Dispatcher;
use crate::notify::Notifier;
use crate::shutdown::{Shutdown, ShutdownTrigger};

const HINT: &str = "Commands: !<command> [args], -<message to chat>, status, quit";

/// Spawns a thread that forwards lines from standard input.
///
/// Reading stdin blocks, so it happens outside the runtime; the thread ends with the process.
#[must_use]
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "could not read from stdin");
                    break;
                }
            }
        }
    });

    rx
}

/// Executes console input against the dispatcher.
pub struct Console {
    dispatcher: Arc<Dispatcher>,
    notifier: Notifier,
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
}

impl Console {
    /// Creates a console. `quit` fires `trigger`; the loop ends when `shutdown` is stopped.
    #[must_use]
    pub const fn new(
        dispatcher: Arc<Dispatcher>,
        notifier: Notifier,
        trigger: ShutdownTrigger,
        shutdown: Shutdown,
    ) -> Self {
        Console {
            dispatcher,
            notifier,
            trigger,
            shutdown,
        }
    }

    /// Reads lines from `input` and writes responses to `output` until stopped or the input
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `output` fails.
    pub async fn run<W>(&self, mut input: mpsc::Receiver<String>, mut output: W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        info!("console ready");

        loop {
            let line = tokio::select! {
                () = self.shutdown.stopped() => break,
                line = input.recv() => line,
            };

            let Some(line) = line else {
                debug!("console input closed");
                break;
            };

            for reply in self.handle_line(&line).await {
                output
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .map_err(Error::Send)?;
            }

            output.flush().await.map_err(Error::Send)?;
        }

        Ok(())
    }

    /// Executes a single line and returns the lines to print.
    pub async fn handle_line(&self, line: &str) -> Vec<String> {
        let line = line.trim();

        if line.is_empty() {
            return vec![];
        }

        match line {
            "quit" | "exit" => {
                info!("shutdown requested from console");
                self.trigger.trigger();

                vec!["Shutting down...".to_string()]
            }
            "status" => {
                let statuses = self.notifier.statuses().await;

                if statuses.is_empty() {
                    vec!["No servers".to_string()]
                } else {
                    statuses
                }
            }
            _ if line.starts_with('!') => match self.dispatcher.handle_console(line).await {
                Ok(Some(lines)) => lines,
                Ok(None) => vec![format!("Unknown command: {line}")],
                Err(err) => {
                    warn!(%err, %line, "console command failed");
                    vec![format!("Error: {err}")]
                }
            },
            _ if line.starts_with('-') => {
                match self.dispatcher.handle_console_chat(line[1..].trim()).await {
                    Ok(Some(lines)) => lines,
                    Ok(None) => vec!["Chat is not available".to_string()],
                    Err(err) => {
                        warn!(%err, "console chat failed");
                        vec![format!("Error: {err}")]
                    }
                }
            }
            _ => vec![HINT.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::plugin::Registry;
    use crate::services::BotServices;

    fn console() -> (Console, Shutdown) {
        let config = BotConfig::new("leetbot");
        let services = BotServices::new().with_commands(Arc::new(Registry::preloaded()));
        let dispatcher = Arc::new(Dispatcher::new(&config, services));
        let (trigger, shutdown) = Shutdown::new();

        (
            Console::new(dispatcher, Notifier::new(), trigger, shutdown.clone()),
            shutdown,
        )
    }

    #[tokio::test]
    async fn it_should_run_commands() {
        let (console, _) = console();

        assert_eq!(console.handle_line("!kaiku moi").await, vec!["console: moi"]);
        assert_eq!(
            console.handle_line("!nope").await,
            vec!["Unknown command: !nope"]
        );
    }

    #[tokio::test]
    async fn it_should_show_hint_and_missing_chat() {
        let (console, _) = console();

        assert_eq!(console.handle_line("hello").await, vec![HINT]);
        assert_eq!(
            console.handle_line("-hello").await,
            vec!["Chat is not available"]
        );
        assert!(console.handle_line("   ").await.is_empty());
    }

    #[tokio::test]
    async fn it_should_stop_on_quit() {
        let (console, shutdown) = console();
        let (tx, rx) = mpsc::channel(4);
        let mut output = Vec::new();

        tx.send("status".to_string()).await.unwrap();
        tx.send("quit".to_string()).await.unwrap();

        console.run(rx, &mut output).await.unwrap();

        assert!(shutdown.is_stopped());
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "No servers\nShutting down...\n"
        );
    }
}
