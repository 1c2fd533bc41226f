//! Proactive token refresh timer.
//!
//! At most one timer task is live at a time. Arming aborts the previous
//! timer; dropping the scheduler aborts the current one.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// What to do about a token set's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    /// No expiry known; nothing to schedule.
    Unscheduled,
    /// Already inside the buffer window; refresh now, inline.
    Immediate,
    /// Refresh after the given delay.
    After(Duration),
}

#[derive(Default)]
struct TimerSlot {
    next_id: u64,
    armed: Option<(u64, JoinHandle<()>)>,
}

pub struct RefreshScheduler {
    buffer: Duration,
    slot: Arc<Mutex<TimerSlot>>,
}

impl RefreshScheduler {
    pub fn new(buffer: Duration) -> Self {
        Self {
            buffer,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Plan a refresh for tokens expiring at `expires_at` (unix seconds),
    /// given the current time in unix milliseconds.
    pub fn plan(&self, expires_at: Option<i64>, now_ms: i64) -> RefreshPlan {
        let Some(expires_at) = expires_at else {
            return RefreshPlan::Unscheduled;
        };

        let buffer_ms = i64::try_from(self.buffer.as_millis()).unwrap_or(i64::MAX);
        let delay_ms = expires_at
            .saturating_mul(1_000)
            .saturating_sub(now_ms)
            .saturating_sub(buffer_ms);

        if delay_ms <= 0 {
            RefreshPlan::Immediate
        } else {
            RefreshPlan::After(Duration::from_millis(delay_ms as u64))
        }
    }

    /// Run `task` after `delay`, replacing any armed timer.
    ///
    /// Once the delay elapses the timer detaches itself, so `task` may re-arm
    /// the scheduler without aborting itself.
    pub fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, previous)) = slot.armed.take() {
            previous.abort();
        }

        slot.next_id += 1;
        let id = slot.next_id;
        let shared = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if matches!(slot.armed, Some((armed_id, _)) if armed_id == id) {
                    slot.armed = None;
                }
            }
            task.await;
        });
        slot.armed = Some((id, handle));
        debug!(delay_secs = delay.as_secs(), "Refresh timer armed");
    }

    /// Abort the armed timer. Returns whether one was armed.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.armed.take() {
            Some((_, handle)) => {
                handle.abort();
                debug!("Refresh timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.armed.is_some()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const NOW_MS: i64 = 1_700_000_000_000;

    fn scheduler() -> RefreshScheduler {
        RefreshScheduler::new(Duration::from_secs(300))
    }

    #[test]
    fn test_ten_minutes_out_waits_five_minutes() {
        let expires_at = NOW_MS / 1_000 + 600;
        assert_eq!(
            scheduler().plan(Some(expires_at), NOW_MS),
            RefreshPlan::After(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_inside_buffer_is_immediate() {
        let s = scheduler();
        assert_eq!(s.plan(Some(NOW_MS / 1_000 + 60), NOW_MS), RefreshPlan::Immediate);
        assert_eq!(s.plan(Some(NOW_MS / 1_000 + 300), NOW_MS), RefreshPlan::Immediate);
        assert_eq!(s.plan(Some(NOW_MS / 1_000 - 10), NOW_MS), RefreshPlan::Immediate);
    }

    #[test]
    fn test_no_expiry_is_unscheduled() {
        assert_eq!(scheduler().plan(None, NOW_MS), RefreshPlan::Unscheduled);
    }

    #[tokio::test]
    async fn test_armed_timer_fires_once_and_detaches() {
        let s = scheduler();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        s.arm(Duration::from_millis(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(s.is_armed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!s.is_armed());
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_timer() {
        let s = scheduler();
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = fired.clone();
            s.arm(Duration::from_millis(20), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let s = scheduler();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        s.arm(Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(s.cancel());
        assert!(!s.cancel());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_aborts_timer() {
        let fired = Arc::new(AtomicU32::new(0));
        {
            let s = scheduler();
            let counter = fired.clone();
            s.arm(Duration::from_millis(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
