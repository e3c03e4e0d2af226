mod worker;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::matcher::DeliveryPolicy;
use crate::notifier::Notifier;
use crate::scrapers::DealSource;
use crate::subscribers::SubscriberStore;

#[derive(Debug, Error)]
pub enum Error {
    #[error("scrape failed: {0}")]
    Scrape(#[from] crate::scrapers::Error),
    #[error("subscriber store unavailable: {0}")]
    Subscribers(#[from] crate::database::Error),
}

enum Message {
    Poll,
    Close,
}

/// Handle to a polling task. Dropping it stops the task once the current
/// tick is done.
pub struct Watcher {
    message_tx: mpsc::UnboundedSender<Message>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.message_tx.send(Message::Close);
    }
}

impl Watcher {
    /// Start polling `source`. The first tick fires immediately.
    pub fn spawn<S: DealSource>(
        source: S,
        store: SubscriberStore,
        notifier: Arc<dyn Notifier>,
        policy: DeliveryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let period = source.interval();
        let mut auto_poll = interval_at(Instant::now(), period);
        auto_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let worker = worker::WatchWorker {
            source,
            message_rx,
            auto_poll,
            store,
            notifier,
            policy,
        };

        let handle = tokio::spawn(worker.run());

        (Self { message_tx }, handle)
    }

    /// Run a tick now, in addition to the regular ones.
    pub fn poll_now(&self) {
        if self.message_tx.send(Message::Poll).is_err() {
            log::warn!("Cannot send poll request, watcher task is gone");
        }
    }

    pub fn shutdown(self) {
        drop(self)
    }
}
