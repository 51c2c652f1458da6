//! SQLite persistence for the WhatsApp client's keys and device identity.
//!
//! Everything lives in one `wa_records` table keyed by `(bucket, key)`.
//! Each `wacore` store trait maps its records onto a handful of buckets, so
//! adding a record kind never needs a migration. Deleting the database file
//! forgets the pairing.

mod app_sync;
mod device;
mod protocol;
mod signal;


use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Store backing one WhatsApp session.
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wa_records (
                bucket TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub(crate) async fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO wa_records (bucket, key, value) VALUES (?, ?, ?)")
            .bind(bucket)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert several records atomically.
    pub(crate) async fn put_many<'a, I>(&self, bucket: &str, records: I) -> Result<(), sqlx::Error>
    where
        I: IntoIterator<Item = (&'a [u8], Vec<u8>)>,
    {
        let mut tx = self.pool.begin().await?;
        for (key, value) in records {
            sqlx::query("INSERT OR REPLACE INTO wa_records (bucket, key, value) VALUES (?, ?, ?)")
                .bind(bucket)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    pub(crate) async fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM wa_records WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    pub(crate) async fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM wa_records WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete several keys atomically.
    pub(crate) async fn delete_many<'a, I>(&self, bucket: &str, keys: I) -> Result<(), sqlx::Error>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM wa_records WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    /// All `(key, value)` pairs in a bucket, ordered by key.
    pub(crate) async fn scan(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        sqlx::query_as("SELECT key, value FROM wa_records WHERE bucket = ? ORDER BY key")
            .bind(bucket)
            .fetch_all(&self.pool)
            .await
    }

    pub(crate) async fn clear(&self, bucket: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM wa_records WHERE bucket = ?")
            .bind(bucket)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read and delete a whole bucket in one transaction.
    pub(crate) async fn take(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<(Vec<u8>, Vec<u8>)> =
            sqlx::query_as("SELECT key, value FROM wa_records WHERE bucket = ? ORDER BY key")
                .bind(bucket)
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM wa_records WHERE bucket = ?")
            .bind(bucket)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Number of records across all buckets.
    #[cfg(test)]
    pub(crate) async fn record_count(&self) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wa_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// Lossy UTF-8 decode for keys that were written from `&str`.
pub(crate) fn key_string(key: Vec<u8>) -> String {
    String::from_utf8(key).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
