//! Blocking-call offloader
//!
//! Transfer calls are synchronous. They run on tokio's blocking threads
//! behind a semaphore, so at most `pool_size` calls are in flight across all
//! actix workers and further calls queue for a permit. The permit travels
//! with the call: if the requesting future is dropped the call still runs to
//! completion and its result is dropped with it.

use crate::transfer::TransferError;
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct Offloader {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl Offloader {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Calls currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.permits.available_permits()
    }

    /// Run `call` on the pool and wait for it to settle.
    pub async fn run<F, T>(&self, call: F) -> Result<T, TransferError>
    where
        F: FnOnce() -> Result<T, TransferError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::Worker("transfer pool closed".to_string()))?;
        debug!("Transfer starting, {} of {} slots in use", self.in_flight(), self.pool_size);

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call()
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Transfer worker failed: {}", e);
                Err(TransferError::Worker(e.to_string()))
            }
        }
    }
}
