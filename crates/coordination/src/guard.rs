use crate::signal::{ServiceExit, StopSignal};
use common::errors::StoreError;
use common::models::AssetUniverse;
use common::traits::{Repository, SingletonRepository};
use std::sync::Arc;
use std::time::Duration;

/// Remembers the universe version a service run started with.
///
/// Checking it at the top of every cycle catches a universe change even when the
/// pub/sub notification was missed.
#[derive(Clone)]
pub struct UniverseGuard {
    repo: Arc<dyn Repository<AssetUniverse>>,
    version: u64,
}

impl UniverseGuard {
    /// Waits for the universe to exist and pins its current version.
    pub async fn acquire(
        repo: Arc<dyn Repository<AssetUniverse>>,
        backoff: Duration,
    ) -> Result<(Self, AssetUniverse), StoreError> {
        let universe = repo.wait_current(backoff).await?;
        let guard = Self {
            repo,
            version: universe.version,
        };
        Ok((guard, universe))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub async fn is_current(&self) -> Result<bool, StoreError> {
        Ok(self.repo.current().await?.version == self.version)
    }

    /// `Some` when the run must end: the stop signal fired or the stored version moved.
    pub async fn should_stop(&self, stop: &StopSignal) -> Result<Option<ServiceExit>, StoreError> {
        if let Some(reason) = stop.exit() {
            return Ok(Some(reason));
        }
        if !self.is_current().await? {
            return Ok(Some(ServiceExit::UniverseChanged));
        }
        Ok(None)
    }
}
