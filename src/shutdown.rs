//! A shared stop signal.

use std::time::Duration;

use tokio::sync::watch;

/// Triggers a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signals every [`Shutdown`] handle to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// A cloneable handle for observing the stop signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Creates a new trigger and the handle it controls.
    #[must_use]
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);

        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// Returns true once the stop signal has been triggered.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the stop signal is triggered.
    ///
    /// Never resolves if the trigger is dropped without being triggered.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();

        if rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless stopped first.
    ///
    /// Returns `true` if the full duration elapsed and `false` if the sleep was interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }

        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.stopped() => false,
        }
    }
}
