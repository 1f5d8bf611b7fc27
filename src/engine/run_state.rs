use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Liveness flag shared by the flow and the control loop.
///
/// Starts running and can be stopped exactly once; it is never reset.
#[derive(Clone, Default)]
pub struct RunState {
    inner: Arc<RunStateInner>,
}

#[derive(Default)]
struct RunStateInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Returns true for the caller that performed the transition
    pub fn stop(&self) -> bool {
        let first = !self.inner.stopped.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Resolves once the state is stopped
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stop_transitions_once() {
        let state = RunState::new();
        assert!(state.is_running());
        assert!(state.stop());
        assert!(!state.stop());
        assert!(state.is_stopped());
    }

    #[tokio::test]
    async fn test_waiter_is_woken_from_other_thread() {
        let state = RunState::new();
        let remote = state.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.stop();
        });

        tokio::time::timeout(Duration::from_secs(1), state.stopped())
            .await
            .expect("waiter was not woken");
    }

    #[tokio::test]
    async fn test_already_stopped_resolves_immediately() {
        let state = RunState::new();
        state.stop();
        state.stopped().await;
    }
}
