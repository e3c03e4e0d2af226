use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Error, Message};
use crate::matcher::{self, DeliveryPolicy};
use crate::notifier::Notifier;
use crate::scrapers::{Deal, DealSource};
use crate::subscribers::SubscriberStore;

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Deals added to the buffer by this scrape.
    pub scraped: usize,
    /// Distinct deal ids in the buffer.
    pub unique: usize,
    pub subscribers: usize,
    pub candidates: usize,
    pub notified: usize,
    pub failed_notifications: usize,
    /// Notifications whose sent log entry could not be persisted. These may
    /// be repeated on a later tick.
    pub failed_records: usize,
}

pub struct WatchWorker<S> {
    pub source: S,
    pub message_rx: mpsc::UnboundedReceiver<Message>,
    pub auto_poll: tokio::time::Interval,
    pub store: SubscriberStore,
    pub notifier: Arc<dyn Notifier>,
    pub policy: DeliveryPolicy,
}

impl<S: DealSource> WatchWorker<S> {
    fn name(&self) -> &'static str {
        S::SOURCE.name()
    }

    async fn process_deals(&self) -> Result<TickReport, Error> {
        let unique = matcher::dedup(self.source.data());

        // never match against a stale map
        self.store.reload().await?;
        let subscribers = self.store.snapshot().await;

        let deals = matcher::classify(unique, |deal| self.source.classify(deal));
        let candidates = matcher::find_candidates(&deals, &subscribers, S::SOURCE, self.policy);

        let mut report = TickReport {
            unique: deals.len(),
            subscribers: subscribers.len(),
            candidates: candidates.len(),
            ..Default::default()
        };

        // a deal can reach one chat under two categories
        let mut recorded = HashSet::new();

        for candidate in candidates {
            let deal = &candidate.deal.deal;
            let message = self
                .source
                .render(deal, &candidate.deal.class, &candidate.category);

            log::debug!(
                "{}: sending deal {} to {} ({:?})",
                self.name(),
                deal.id(),
                candidate.chat_id,
                candidate.category
            );

            match self.notifier.notify(candidate.chat_id, message).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    log::warn!("Couldn't send deal {} to {}: {e}", deal.id(), candidate.chat_id);
                    report.failed_notifications += 1;
                }
            }

            // recorded even if the notification failed
            if !recorded.insert((candidate.chat_id, deal.id())) {
                continue;
            }
            if let Err(e) = self
                .store
                .record_sent(candidate.chat_id, S::SOURCE, deal.id())
                .await
            {
                log::error!(
                    "Couldn't record deal {} as sent to {}: {e}",
                    deal.id(),
                    candidate.chat_id
                );
                report.failed_records += 1;
            }
        }

        Ok(report)
    }

    async fn tick(&mut self) -> Result<TickReport, Error> {
        log::debug!("{}: polling", self.name());
        let scraped = self.source.scrape().await?;
        let report = self.process_deals().await?;
        Ok(TickReport { scraped, ..report })
    }

    async fn handle_tick(&mut self) {
        match self.tick().await {
            Ok(report) => log::info!("{}: {report:?}", self.name()),
            Err(e) => log::error!("{}: tick aborted: {e}", self.name()),
        }
    }

    pub async fn run(mut self) {
        log::info!("Starting {} watcher", self.name());
        loop {
            tokio::select! {
                _ = self.auto_poll.tick() => self.handle_tick().await,
                msg = self.message_rx.recv() => {
                    let Some(msg) = msg else {
                        // channel closed, no more messages
                        break
                    };
                    match msg {
                        Message::Poll => self.handle_tick().await,
                        Message::Close => self.message_rx.close(),
                    }
                }
            }
        }
        log::info!("{} watcher shut down", self.name());
    }
}
