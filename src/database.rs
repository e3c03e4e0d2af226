#[cfg(test)]
pub mod memory;
pub mod retry;

use std::collections::HashMap;
use std::str::FromStr;

use futures_core::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{query, query_as};
use teloxide::types::ChatId;
use thiserror::Error;

use crate::model::Subscriber;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no subscriber with chat id {0}")]
    NotFound(ChatId),
    #[error("subscriber with chat id {0} already exists")]
    AlreadyExists(ChatId),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid list column: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable subscriber storage.
///
/// `get`, `update` and `delete` on an unknown chat id fail with
/// [`Error::NotFound`]; `add` on a known one fails with
/// [`Error::AlreadyExists`].
pub trait Persistence: Send + Sync {
    fn read_all(&self) -> BoxFuture<'_, Result<HashMap<ChatId, Subscriber>, Error>>;

    fn get(&self, chat_id: ChatId) -> BoxFuture<'_, Result<Subscriber, Error>>;

    fn add<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>>;

    fn update<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>>;

    fn delete<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>>;

    fn ping(&self) -> BoxFuture<'_, Result<(), Error>>;

    fn close(&self) -> BoxFuture<'_, Result<(), Error>>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    chat_id: i64,
    username: String,
    good_enabled: bool,
    super_enabled: bool,
    daily_enabled: bool,
    weekly_enabled: bool,
    keywords: String,
    community_sent: String,
    price_drop_sent: String,
}

impl TryFrom<UserRow> for Subscriber {
    type Error = serde_json::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Subscriber {
            chat_id: ChatId(row.chat_id),
            username: row.username,
            good_enabled: row.good_enabled,
            super_enabled: row.super_enabled,
            daily_enabled: row.daily_enabled,
            weekly_enabled: row.weekly_enabled,
            keywords: serde_json::from_str(&row.keywords)?,
            community_sent: serde_json::from_str(&row.community_sent)?,
            price_drop_sent: serde_json::from_str(&row.price_drop_sent)?,
        })
    }
}

/// The list columns of a subscriber, serialised.
struct Lists {
    keywords: String,
    community_sent: String,
    price_drop_sent: String,
}

impl Lists {
    fn of(subscriber: &Subscriber) -> Result<Self, Error> {
        Ok(Self {
            keywords: serde_json::to_string(&subscriber.keywords)?,
            community_sent: serde_json::to_string(&subscriber.community_sent)?,
            price_drop_sent: serde_json::to_string(&subscriber.price_drop_sent)?,
        })
    }
}

const SELECT_USERS: &str = "SELECT chat_id, username, good_enabled, super_enabled, daily_enabled,
    weekly_enabled, keywords, community_sent, price_drop_sent FROM users";

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, bringing the schema up to date.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, Error> {
        sqlx::migrate!().run(&pool).await?;
        Ok(Self { pool })
    }

    async fn read_all(&self) -> Result<HashMap<ChatId, Subscriber>, Error> {
        let rows: Vec<UserRow> = query_as(SELECT_USERS).fetch_all(&self.pool).await?;

        let mut users = HashMap::with_capacity(rows.len());
        for row in rows {
            let subscriber = Subscriber::try_from(row)?;
            users.insert(subscriber.chat_id, subscriber);
        }
        Ok(users)
    }

    async fn get(&self, chat_id: ChatId) -> Result<Subscriber, Error> {
        let row: Option<UserRow> = query_as(&format!("{SELECT_USERS} WHERE chat_id = ?"))
            .bind(chat_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_into()?),
            None => Err(Error::NotFound(chat_id)),
        }
    }

    async fn add(&self, subscriber: &Subscriber) -> Result<(), Error> {
        let lists = Lists::of(subscriber)?;

        let result = query(
            "INSERT INTO users (chat_id, username, good_enabled, super_enabled, daily_enabled,
                weekly_enabled, keywords, community_sent, price_drop_sent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(subscriber.chat_id.0)
        .bind(&subscriber.username)
        .bind(subscriber.good_enabled)
        .bind(subscriber.super_enabled)
        .bind(subscriber.daily_enabled)
        .bind(subscriber.weekly_enabled)
        .bind(&lists.keywords)
        .bind(&lists.community_sent)
        .bind(&lists.price_drop_sent)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let duplicate =
                    matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
                if duplicate {
                    Err(Error::AlreadyExists(subscriber.chat_id))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<(), Error> {
        let lists = Lists::of(subscriber)?;

        let updated = query(
            "UPDATE users SET username = ?, good_enabled = ?, super_enabled = ?,
                daily_enabled = ?, weekly_enabled = ?, keywords = ?, community_sent = ?,
                price_drop_sent = ?
            WHERE chat_id = ?",
        )
        .bind(&subscriber.username)
        .bind(subscriber.good_enabled)
        .bind(subscriber.super_enabled)
        .bind(subscriber.daily_enabled)
        .bind(subscriber.weekly_enabled)
        .bind(&lists.keywords)
        .bind(&lists.community_sent)
        .bind(&lists.price_drop_sent)
        .bind(subscriber.chat_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(subscriber.chat_id));
        }
        Ok(())
    }

    async fn delete(&self, subscriber: &Subscriber) -> Result<(), Error> {
        let deleted = query("DELETE FROM users WHERE chat_id = ?")
            .bind(subscriber.chat_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(subscriber.chat_id));
        }
        Ok(())
    }
}

impl Persistence for Database {
    fn read_all(&self) -> BoxFuture<'_, Result<HashMap<ChatId, Subscriber>, Error>> {
        Box::pin(Database::read_all(self))
    }

    fn get(&self, chat_id: ChatId) -> BoxFuture<'_, Result<Subscriber, Error>> {
        Box::pin(Database::get(self, chat_id))
    }

    fn add<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(Database::add(self, subscriber))
    }

    fn update<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(Database::update(self, subscriber))
    }

    fn delete<'a>(&'a self, subscriber: &'a Subscriber) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(Database::delete(self, subscriber))
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async move {
            self.pool.close().await;
            Ok(())
        })
    }
}
