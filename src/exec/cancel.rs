// src/exec/cancel.rs

//! Per-datapoint cancellation.

use std::collections::HashMap;
use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::task::TaskId;

/// Receiving side of one datapoint's cancel request.
///
/// A dropped sender means "never cancelled": [`CancelSignal::cancelled`]
/// then stays pending forever instead of resolving.
#[derive(Debug)]
pub struct CancelSignal {
    rx: Option<oneshot::Receiver<()>>,
    fired: bool,
}

impl CancelSignal {
    pub fn new(rx: oneshot::Receiver<()>) -> Self {
        Self {
            rx: Some(rx),
            fired: false,
        }
    }

    /// A signal that can never fire.
    pub fn never() -> Self {
        Self {
            rx: None,
            fired: false,
        }
    }

    /// Non-blocking check.
    pub fn is_cancelled(&mut self) -> bool {
        if self.fired {
            return true;
        }
        if let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(()) => {
                    self.fired = true;
                    self.rx = None;
                }
                Err(oneshot::error::TryRecvError::Closed) => self.rx = None,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.fired
    }

    /// Resolves once cancellation is requested. Cancel-safe.
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }
        if let Some(rx) = self.rx.as_mut() {
            let res = rx.await;
            self.rx = None;
            if res.is_ok() {
                self.fired = true;
                return;
            }
        }
        pending::<()>().await
    }
}

/// Cloneable handle for cancelling datapoints of a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    senders: Arc<Mutex<HashMap<TaskId, oneshot::Sender<()>>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the signal for `task`, replacing any earlier registration.
    pub fn register(&self, task: TaskId) -> CancelSignal {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(task, tx);
        CancelSignal::new(rx)
    }

    /// Request cancellation of one datapoint.
    ///
    /// Returns `false` if the datapoint is unknown, was already cancelled or
    /// has already finished.
    pub fn cancel(&self, task: TaskId) -> bool {
        let Some(tx) = self.lock().remove(&task) else {
            debug!(task, "no cancel sender present; datapoint unknown or already cancelled");
            return false;
        };
        let delivered = tx.send(()).is_ok();
        if delivered {
            info!(task, "cancellation requested");
        } else {
            debug!(task, "datapoint already finished while cancelling");
        }
        delivered
    }

    /// Cancel every registered datapoint; returns how many were reached.
    pub fn cancel_all(&self) -> usize {
        let senders: Vec<_> = self.lock().drain().collect();
        let reached = senders
            .into_iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(_, tx)| tx.send(()))
            .filter(Result::is_ok)
            .count();
        info!(reached, "cancellation requested for all datapoints");
        reached
    }

    /// Forget `task` once it reached a terminal state.
    pub(crate) fn release(&self, task: TaskId) {
        self.lock().remove(&task);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, oneshot::Sender<()>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn cancel_resolves_the_signal() {
        let handle = CancelHandle::new();
        let mut signal = handle.register(3);
        assert!(!signal.is_cancelled());

        assert!(handle.cancel(3));
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("signal should resolve");
        assert!(signal.is_cancelled());
        // Resolving again must not poll the spent receiver.
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn dropped_sender_never_fires() {
        let handle = CancelHandle::new();
        let mut signal = handle.register(0);
        handle.release(0);

        assert!(!signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn cancel_all_reaches_live_signals_only() {
        let handle = CancelHandle::new();
        let mut a = handle.register(0);
        let b = handle.register(1);
        drop(b);

        assert_eq!(handle.cancel_all(), 1);
        assert!(a.is_cancelled());
        assert!(!handle.cancel(0));
    }

    #[test]
    fn never_signal_is_not_cancelled() {
        assert!(!CancelSignal::never().is_cancelled());
    }
}
