//! Start/stop state machine for the proxy service.
//!
//! Transitions are guarded so each fires at most once per run: a second stop
//! request is a no-op instead of a double signal.

use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
    StopRequested,
}

pub struct Lifecycle {
    state: Mutex<ServiceState>,
    stop_tx: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(ServiceState::Stopped),
            stop_tx,
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Stopped -> Running`.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ServiceState::Stopped => {
                self.stop_tx.send_replace(false);
                *state = ServiceState::Running;
                Ok(())
            }
            ServiceState::Running => Err(LifecycleError::AlreadyRunning),
            ServiceState::StopRequested => Err(LifecycleError::StillStopping),
        }
    }

    /// `Running -> StopRequested`, waking every [`StopSignal`].
    ///
    /// Returns false if the service was not running.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ServiceState::Running {
            return false;
        }
        *state = ServiceState::StopRequested;
        self.stop_tx.send_replace(true);
        true
    }

    /// `StopRequested -> Stopped`. Returns false if no stop was pending.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ServiceState::StopRequested {
            return false;
        }
        *state = ServiceState::Stopped;
        true
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal(self.stop_tx.subscribe())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once a stop has been requested.
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub async fn stopped(&mut self) {
        // A closed channel means the lifecycle is gone; treat that as a stop.
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transitions_fire_once() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ServiceState::Stopped);
        assert!(!lifecycle.request_stop());
        assert!(!lifecycle.finish());

        lifecycle.start().unwrap();
        assert_eq!(lifecycle.start(), Err(LifecycleError::AlreadyRunning));

        assert!(lifecycle.request_stop());
        assert!(!lifecycle.request_stop());
        assert_eq!(lifecycle.start(), Err(LifecycleError::StillStopping));

        assert!(lifecycle.finish());
        assert!(!lifecycle.finish());
        assert_eq!(lifecycle.state(), ServiceState::Stopped);
    }

    #[test]
    fn restart_after_stop() {
        let lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        lifecycle.request_stop();
        lifecycle.finish();

        lifecycle.start().unwrap();
        assert_eq!(lifecycle.state(), ServiceState::Running);
    }

    #[tokio::test]
    async fn stop_signal_wakes_waiters() {
        let lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        let mut signal = lifecycle.stop_signal();

        let waiter = tokio::spawn(async move { signal.stopped().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        lifecycle.request_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn signal_after_stop_resolves_immediately() {
        let lifecycle = Lifecycle::new();
        lifecycle.start().unwrap();
        lifecycle.request_stop();

        let mut signal = lifecycle.stop_signal();
        tokio::time::timeout(Duration::from_secs(1), signal.stopped()).await.unwrap();
    }
}
