use std::collections::HashMap;
use std::sync::Arc;

use teloxide::types::ChatId;
use tokio::sync::{Mutex, RwLock};

use crate::database::retry::{with_retry, RetryPolicy};
use crate::database::{Error, Persistence};
use crate::model::{Source, Subscriber};

type Map = HashMap<ChatId, Subscriber>;

/// In-memory view of all subscribers, backed by a [`Persistence`].
///
/// Readers only ever take the read lock long enough to copy. Every mutation
/// is written to the database before the map changes.
#[derive(Clone)]
pub struct SubscriberStore {
    database: Arc<dyn Persistence>,
    subscribers: Arc<RwLock<Map>>,
    // held across reloads and write-throughs so a reload cannot drop an
    // append that is still being persisted
    write_gate: Arc<Mutex<()>>,
    retry: RetryPolicy,
}

impl SubscriberStore {
    pub fn new(database: Arc<dyn Persistence>, retry: RetryPolicy) -> Self {
        Self {
            database,
            subscribers: Default::default(),
            write_gate: Default::default(),
            retry,
        }
    }

    /// Replace the map with the database contents. On error the previous
    /// contents are kept.
    pub async fn reload(&self) -> Result<usize, Error> {
        let _gate = self.write_gate.lock().await;
        let fresh = self.database.read_all().await?;
        let count = fresh.len();
        *self.subscribers.write().await = fresh;
        Ok(count)
    }

    /// Copy of all subscribers, ordered by chat id.
    pub async fn snapshot(&self) -> Vec<Subscriber> {
        let mut snapshot: Vec<_> = self.subscribers.read().await.values().cloned().collect();
        snapshot.sort_by_key(|s| s.chat_id.0);
        snapshot
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<Subscriber> {
        self.subscribers.read().await.get(&chat_id).cloned()
    }

    pub async fn register(&self, subscriber: Subscriber) -> Result<(), Error> {
        let _gate = self.write_gate.lock().await;
        let database = &self.database;
        let record = &subscriber;
        with_retry(self.retry, "add subscriber", move || database.add(record)).await?;

        log::info!("Registered subscriber {}", subscriber.chat_id);
        self.subscribers
            .write()
            .await
            .insert(subscriber.chat_id, subscriber);
        Ok(())
    }

    /// Replace a subscriber's record, e.g. after a preference change.
    pub async fn update(&self, subscriber: Subscriber) -> Result<(), Error> {
        let _gate = self.write_gate.lock().await;
        if !self.subscribers.read().await.contains_key(&subscriber.chat_id) {
            return Err(Error::NotFound(subscriber.chat_id));
        }

        let database = &self.database;
        let record = &subscriber;
        with_retry(self.retry, "update subscriber", move || database.update(record)).await?;

        self.subscribers
            .write()
            .await
            .insert(subscriber.chat_id, subscriber);
        Ok(())
    }

    pub async fn remove(&self, chat_id: ChatId) -> Result<(), Error> {
        let _gate = self.write_gate.lock().await;
        let Some(subscriber) = self.get(chat_id).await else {
            return Err(Error::NotFound(chat_id));
        };

        let database = &self.database;
        let record = &subscriber;
        with_retry(self.retry, "delete subscriber", move || database.delete(record)).await?;

        self.subscribers.write().await.remove(&chat_id);
        Ok(())
    }

    /// Apply `change` to the current record and write it through. `change`
    /// returns whether it modified anything; unchanged records are not
    /// written.
    pub async fn modify(
        &self,
        chat_id: ChatId,
        change: impl FnOnce(&mut Subscriber) -> bool,
    ) -> Result<bool, Error> {
        let _gate = self.write_gate.lock().await;
        let Some(mut subscriber) = self.get(chat_id).await else {
            return Err(Error::NotFound(chat_id));
        };

        if !change(&mut subscriber) {
            return Ok(false);
        }

        let database = &self.database;
        let record = &subscriber;
        with_retry(self.retry, "update subscriber", move || database.update(record)).await?;

        self.subscribers.write().await.insert(chat_id, subscriber);
        Ok(true)
    }

    /// Append `deal_id` to the subscriber's sent log for `source`. Callers
    /// only record deals that passed the sent-log check, so no lookup is done.
    pub async fn record_sent(&self, chat_id: ChatId, source: Source, deal_id: &str) -> Result<(), Error> {
        self.modify(chat_id, |subscriber| {
            subscriber.sent_log_mut(source).push(deal_id.to_string());
            true
        })
        .await
        .map(drop)
    }

    /// Forget which deals of `source` were sent, so they may be sent again.
    pub async fn clear_sent(&self, chat_id: ChatId, source: Source) -> Result<bool, Error> {
        self.modify(chat_id, |subscriber| {
            let log = subscriber.sent_log_mut(source);
            let changed = !log.is_empty();
            log.clear();
            changed
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::database::memory::MemoryDatabase;

    const FAST: RetryPolicy = RetryPolicy {
        attempts: 3,
        step: Duration::from_millis(1),
    };

    fn subscriber(id: i64) -> Subscriber {
        let mut sub = Subscriber::new(ChatId(id), format!("user{id}"));
        sub.good_enabled = true;
        sub
    }

    fn store_with(subs: impl IntoIterator<Item = Subscriber>) -> (Arc<MemoryDatabase>, SubscriberStore) {
        let db = Arc::new(MemoryDatabase::with(subs));
        let store = SubscriberStore::new(db.clone(), FAST);
        (db, store)
    }

    #[tokio::test]
    async fn reload_replaces_contents() {
        let (db, store) = store_with([subscriber(2), subscriber(1)]);
        assert!(store.snapshot().await.is_empty());

        assert_eq!(store.reload().await.unwrap(), 2);
        let ids: Vec<_> = store.snapshot().await.iter().map(|s| s.chat_id).collect();
        assert_eq!(ids, vec![ChatId(1), ChatId(2)]);

        db.delete(&subscriber(1)).await.unwrap();
        store.reload().await.unwrap();
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_map() {
        let (db, store) = store_with([subscriber(1)]);
        store.reload().await.unwrap();

        db.fail_reads(true);
        assert!(store.reload().await.is_err());
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let (_db, store) = store_with([subscriber(1)]);
        store.reload().await.unwrap();

        let snapshot = store.snapshot().await;
        store.register(subscriber(5)).await.unwrap();
        store
            .record_sent(ChatId(1), Source::Community, "42")
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].community_sent.is_empty());
        assert_eq!(store.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn record_sent_appends_and_writes_through() {
        let mut sub = subscriber(1);
        sub.price_drop_sent = (0..1000).map(|i| format!("A{i}")).collect();
        let (db, store) = store_with([sub]);
        store.reload().await.unwrap();

        store.record_sent(ChatId(1), Source::PriceDrop, "B01").await.unwrap();
        store.record_sent(ChatId(1), Source::PriceDrop, "B02").await.unwrap();

        assert_eq!(db.writes(), 2);
        let stored = db.stored(ChatId(1)).unwrap();
        assert_eq!(stored.price_drop_sent.len(), 1002);
        assert_eq!(stored.price_drop_sent[1000..], ["B01".to_string(), "B02".to_string()]);
        assert!(stored.community_sent.is_empty());
        assert_eq!(store.get(ChatId(1)).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn record_sent_for_unknown_subscriber() {
        let (_db, store) = store_with([]);
        assert!(matches!(
            store.record_sent(ChatId(7), Source::Community, "1").await,
            Err(Error::NotFound(ChatId(7)))
        ));
    }

    #[tokio::test]
    async fn transient_write_failures_are_retried() {
        let (db, store) = store_with([subscriber(1)]);
        store.reload().await.unwrap();

        db.fail_next_writes(2);
        store.record_sent(ChatId(1), Source::Community, "9").await.unwrap();
        assert_eq!(db.stored(ChatId(1)).unwrap().community_sent, vec!["9".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_map_unchanged() {
        let (db, store) = store_with([subscriber(1)]);
        store.reload().await.unwrap();

        db.fail_next_writes(3);
        assert!(store.record_sent(ChatId(1), Source::Community, "9").await.is_err());
        assert!(store.get(ChatId(1)).await.unwrap().community_sent.is_empty());
    }

    #[tokio::test]
    async fn clear_sent_empties_one_log() {
        let mut sub = subscriber(1);
        sub.community_sent = vec!["1".into(), "2".into()];
        sub.price_drop_sent = vec!["B01".into()];
        let (db, store) = store_with([sub]);
        store.reload().await.unwrap();

        assert!(store.clear_sent(ChatId(1), Source::Community).await.unwrap());
        assert!(!store.clear_sent(ChatId(1), Source::Community).await.unwrap());

        let stored = db.stored(ChatId(1)).unwrap();
        assert!(stored.community_sent.is_empty());
        assert_eq!(stored.price_drop_sent, vec!["B01".to_string()]);
    }

    #[tokio::test]
    async fn update_replaces_preferences() {
        let (db, store) = store_with([subscriber(1)]);
        store.reload().await.unwrap();

        let mut changed = store.get(ChatId(1)).await.unwrap();
        changed.super_enabled = true;
        changed.keywords = vec!["lego".into()];
        store.update(changed.clone()).await.unwrap();

        assert_eq!(db.stored(ChatId(1)).unwrap(), changed);
        assert_eq!(store.get(ChatId(1)).await.unwrap(), changed);
        assert!(matches!(
            store.update(subscriber(2)).await,
            Err(Error::NotFound(ChatId(2)))
        ));
    }

    #[tokio::test]
    async fn register_and_remove() {
        let (db, store) = store_with([]);
        store.register(subscriber(3)).await.unwrap();
        assert!(matches!(
            store.register(subscriber(3)).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(db.stored(ChatId(3)).is_some());

        store.remove(ChatId(3)).await.unwrap();
        assert!(db.stored(ChatId(3)).is_none());
        assert!(store.get(ChatId(3)).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_registration_and_snapshots() {
        let (_db, store) = store_with([]);

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for id in 0..50 {
                    store.register(subscriber(id)).await.unwrap();
                }
            })
        };

        for _ in 0..50 {
            let snapshot = store.snapshot().await;
            assert!(snapshot.windows(2).all(|w| w[0].chat_id.0 < w[1].chat_id.0));
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(store.snapshot().await.len(), 50);
    }
}
