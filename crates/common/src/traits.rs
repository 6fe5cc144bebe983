//! Shared traits for services in the arbitrage bot.

use crate::errors::StoreError;
use crate::models::{Record, Singleton};
use async_trait::async_trait;
use std::time::Duration;

/// Typed access to one entity namespace of the keyed store.
///
/// Writers are last-writer-wins; there is no locking or transaction support.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Fetches a record by primary key.
    async fn get(&self, pk: &str) -> Result<T, StoreError>;

    /// Upserts a single record.
    async fn save(&self, record: &T) -> Result<(), StoreError>;

    /// Primary keys of every stored record in this namespace.
    async fn all_pks(&self) -> Result<Vec<String>, StoreError>;

    /// Like [`Repository::get`], with a missing record as `None`.
    async fn find(&self, pk: &str) -> Result<Option<T>, StoreError> {
        match self.get(pk).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upserts a batch of records.
    async fn add(&self, records: &[T]) -> Result<(), StoreError> {
        for record in records {
            self.save(record).await?;
        }
        Ok(())
    }

    /// Every record in this namespace. Records deleted between listing and reading are skipped.
    async fn scan_all(&self) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for pk in self.all_pks().await? {
            match self.get(&pk).await {
                Ok(record) => out.push(record),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Polls until the record exists, sleeping `backoff` between attempts.
    async fn wait_for(&self, pk: &str, backoff: Duration) -> Result<T, StoreError> {
        loop {
            match self.get(pk).await {
                Ok(record) => return Ok(record),
                Err(StoreError::NotFound { .. }) => tokio::time::sleep(backoff).await,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Convenience accessors for singleton records.
#[async_trait]
pub trait SingletonRepository<T: Singleton>: Repository<T> {
    async fn current(&self) -> Result<T, StoreError> {
        self.get(T::PK).await
    }

    async fn wait_current(&self, backoff: Duration) -> Result<T, StoreError> {
        self.wait_for(T::PK, backoff).await
    }
}

impl<T: Singleton, R: Repository<T> + ?Sized> SingletonRepository<T> for R {}
