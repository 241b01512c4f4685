use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Bounds how many runs talk to the generation backend at once.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

/// Held for the whole run; dropping it frees the slot.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot. Fails with `Cancelled` once the pool is closed.
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        Ok(WorkerPermit { _permit: permit })
    }

    /// Rejects new acquisitions; permits already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}
