//! In-memory [`Persistence`] with fault injection, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use futures_core::future::BoxFuture;
use teloxide::types::ChatId;

use super::{Error, Persistence};
use crate::model::Subscriber;

#[derive(Default)]
pub struct MemoryDatabase {
    users: Mutex<HashMap<ChatId, Subscriber>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicBool,
    writes: AtomicU32,
}

impl MemoryDatabase {
    pub fn with(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let db = Self::default();
        db.users
            .lock()
            .unwrap()
            .extend(subscribers.into_iter().map(|s| (s.chat_id, s)));
        db
    }

    /// The next `n` writes fail with a transient error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.failing_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, chat_id: ChatId) -> Option<Subscriber> {
        self.users.lock().unwrap().get(&chat_id).cloned()
    }

    fn check_read(&self) -> Result<(), Error> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Error::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), Error> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn write(&self, f: impl FnOnce(&mut HashMap<ChatId, Subscriber>) -> Result<(), Error>) -> Result<(), Error> {
        self.check_write()?;
        f(&mut self.users.lock().unwrap())?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Persistence for MemoryDatabase {
    fn read_all(&self) -> BoxFuture<'_, Result<HashMap<ChatId, Subscriber>, Error>> {
        Box::pin(async move {
            self.check_read()?;
            Ok(self.users.lock().unwrap().clone())
        })
    }

    fn get(&self, chat_id: ChatId) -> BoxFuture<'_, Result<Subscriber, Error>> {
        Box::pin(async move {
            self.check_read()?;
            self.stored(chat_id).ok_or(Error::NotFound(chat_id))
        })
    }

    fn add<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.write(|users| {
                if users.contains_key(&subscriber.chat_id) {
                    return Err(Error::AlreadyExists(subscriber.chat_id));
                }
                users.insert(subscriber.chat_id, subscriber.clone());
                Ok(())
            })
        })
    }

    fn update<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.write(|users| match users.get_mut(&subscriber.chat_id) {
                Some(stored) => {
                    *stored = subscriber.clone();
                    Ok(())
                }
                None => Err(Error::NotFound(subscriber.chat_id)),
            })
        })
    }

    fn delete<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.write(|users| match users.remove(&subscriber.chat_id) {
                Some(_) => Ok(()),
                None => Err(Error::NotFound(subscriber.chat_id)),
            })
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move { self.check_read() })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
}
