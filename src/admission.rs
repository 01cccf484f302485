//! Process-wide cap on concurrently running thumbnail pipelines.
//!
//! HTTP concurrency is not limited; only the expensive fetch/probe/extract run is. Slots are
//! RAII guards, so a slot is returned exactly once however the run ends (including unwinding).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ThumbError;

#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    running: Arc<AtomicUsize>,
}

/// One admitted pipeline run. Dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    running: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AdmissionController {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Wait until a slot is free. Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<Slot, ThumbError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ThumbError::Unavailable)?;
        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!(
            target: "thumby::admission",
            "slot acquired ({}/{})",
            running,
            self.capacity
        );
        Ok(Slot {
            _permit: permit,
            running: Arc::clone(&self.running),
        })
    }

    /// Run `fut` while holding a slot.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ThumbError>
    where
        F: Future<Output = T>,
    {
        let _slot = self.acquire().await?;
        Ok(fut.await)
    }

    /// Stop admitting. Waiters and later callers get [`ThumbError::Unavailable`];
    /// slots already handed out stay valid until dropped.
    pub fn close(&self) {
        self.semaphore.close();
        log::info!(
            target: "thumby::admission",
            "admission closed with {} runs in flight",
            self.running()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn capacity_is_at_least_one() {
        let ctl = AdmissionController::new(0);
        assert_eq!(ctl.capacity(), 1);
        let _slot = ctl.acquire().await.unwrap();
        assert_eq!(ctl.running(), 1);
    }

    #[tokio::test]
    async fn slot_release_is_paired_with_acquire() {
        let ctl = AdmissionController::new(2);
        let a = ctl.acquire().await.unwrap();
        let b = ctl.acquire().await.unwrap();
        assert_eq!(ctl.running(), 2);
        drop(a);
        assert_eq!(ctl.running(), 1);
        drop(b);
        assert_eq!(ctl.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_caller_waits_for_a_free_slot() {
        let ctl = AdmissionController::new(1);
        let held = ctl.acquire().await.unwrap();

        let waiter = {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slot_is_released_when_run_panics() {
        let ctl = AdmissionController::new(1);
        let task = {
            let ctl = ctl.clone();
            tokio::spawn(async move {
                ctl.run(async {
                    let fault: Option<()> = None;
                    fault.expect("pipeline fault")
                })
                .await
            })
        };
        assert!(task.await.is_err());
        assert_eq!(ctl.running(), 0);
        let _slot = ctl.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn closed_controller_rejects_new_runs() {
        let ctl = AdmissionController::new(1);
        let held = ctl.acquire().await.unwrap();
        ctl.close();
        assert!(matches!(ctl.acquire().await, Err(ThumbError::Unavailable)));
        drop(held);
        assert_eq!(ctl.running(), 0);
    }
}
