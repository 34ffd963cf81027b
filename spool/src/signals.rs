//! Module to signal shutdown in spool.
//!
//! The mechanism has two halves, a [`Broadcaster`] and any number of
//! [`Watcher`] instances. The `Broadcaster` fires exactly once; every
//! `Watcher`, including ones cloned after the fact, observes it. Dropping the
//! `Broadcaster` without firing counts as firing, so a watcher can never hang
//! on a broadcaster that has gone away.

use tokio::sync::watch;

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let (sender, receiver) = watch::channel(false);
    (Watcher { receiver }, Broadcaster { sender })
}

#[derive(Debug)]
/// Mechanism to notify one or more `Watcher` instances that it is time to
/// stop.
pub struct Broadcaster {
    sender: watch::Sender<bool>,
}

impl Broadcaster {
    /// Send the signal through to every `Watcher`.
    pub fn signal(self) {
        self.sender.send_replace(true);
    }
}

#[derive(Debug, Clone)]
/// Mechanism to watch for the shutdown signal.
pub struct Watcher {
    receiver: watch::Receiver<bool>,
}

impl Watcher {
    /// Wait for the signal. Returns immediately if it has already fired.
    pub async fn recv(&mut self) {
        // An error means the broadcaster is gone, which is as good as a
        // signal.
        let _ = self.receiver.wait_for(|fired| *fired).await;
    }
}
