// src/limiter.rs

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Counts in-flight uploads against a fixed ceiling, shared across tasks.
#[derive(Clone, Debug)]
pub struct InFlightLimiter {
    semaphore: Arc<Semaphore>,
    /// The maximum number of simultaneously in-flight uploads.
    ceiling: usize,
}

/// One reserved slot. Dropping it releases the slot, on every exit path.
#[derive(Debug)]
pub struct InFlightPermit {
    semaphore: Arc<Semaphore>,
}

impl InFlightLimiter {
    pub fn new(ceiling: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling.min(Semaphore::MAX_PERMITS))),
            ceiling,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.ceiling.saturating_sub(self.semaphore.available_permits())
    }

    /// Whether at least one more upload could start right now.
    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    /// Reserves `count` slots at once, or none at all if that would exceed
    /// the ceiling.
    pub fn try_acquire_many(&self, count: usize) -> Option<Vec<InFlightPermit>> {
        let wanted = u32::try_from(count).ok()?;
        let batch = self.semaphore.clone().try_acquire_many_owned(wanted).ok()?;
        // Handed back one at a time by each InFlightPermit.
        batch.forget();
        let permits = (0..count)
            .map(|_| InFlightPermit {
                semaphore: self.semaphore.clone(),
            })
            .collect();
        Some(permits)
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.semaphore.add_permits(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_all_or_nothing() {
        let limiter = InFlightLimiter::new(3);
        let first = limiter.try_acquire_many(2).unwrap();
        assert_eq!(limiter.in_flight(), 2);

        assert!(limiter.try_acquire_many(2).is_none());
        assert_eq!(limiter.in_flight(), 2);

        let second = limiter.try_acquire_many(1).unwrap();
        assert_eq!(limiter.in_flight(), 3);
        assert!(!limiter.has_capacity());

        drop(first);
        drop(second);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[test]
    fn each_permit_releases_exactly_one_slot() {
        let limiter = InFlightLimiter::new(2);
        let mut permits = limiter.try_acquire_many(2).unwrap();
        permits.pop();
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.has_capacity());
    }

    #[tokio::test]
    async fn permit_released_when_task_fails() {
        let limiter = InFlightLimiter::new(1);
        let permit = limiter.try_acquire_many(1).unwrap().pop().unwrap();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("simulated failure");
        });
        assert!(handle.await.is_err());
        assert_eq!(limiter.in_flight(), 0);
    }
}
