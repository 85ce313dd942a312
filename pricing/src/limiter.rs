//! Bound on concurrent upstream resolutions.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{PricingError, PricingResult};

/// Caps how many resolutions may talk to providers at once.
///
/// The permit is released when dropped, on success, failure or panic alike.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> PricingResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PricingError::Internal("Concurrency limiter closed".to_string()))
    }

    /// Configured maximum.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.limit.saturating_sub(self.available())
    }
}
