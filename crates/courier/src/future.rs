use crate::bridge::Bridge;
use crate::handle::Resource;
use crate::outcome::Outcome;
use crate::signal::{Adapter, CompletionSignal};
use crate::status::Status;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::ffi::c_void;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Pair a fresh future with the signal that resolves it.
pub(crate) fn promise<T: Resource>(bridge: Bridge) -> (BlockingFuture<T>, CompletionSignal) {
    let (future, adapter) = pending(bridge);
    (future, CompletionSignal::from_adapter(adapter))
}

fn pending<T>(bridge: Bridge) -> (BlockingFuture<T>, PromiseAdapter<T>) {
    let (tx, rx) = crossbeam::channel::bounded(1);
    let alive = Arc::new(());
    let future = BlockingFuture {
        rx,
        sender: Arc::downgrade(&alive),
    };
    let adapter = PromiseAdapter {
        bridge,
        tx,
        _alive: alive,
    };
    (future, adapter)
}

struct PromiseAdapter<T> {
    bridge: Bridge,
    tx: Sender<Outcome<T>>,
    // Dropped with the sender; lets the future see a disconnect without receiving.
    _alive: Arc<()>,
}

impl<T: Resource> Adapter for PromiseAdapter<T> {
    fn complete(self, result: *mut c_void, status: Status) {
        let outcome = Outcome::from_raw(&self.bridge, result, status);
        if self.tx.send(outcome).is_err() {
            log::debug!("Future dropped before completion, releasing its result");
        }
    }
}

/// One-shot result of an asynchronous operation.
///
/// Can be waited on from any thread. Dropping it before completion is fine: the
/// late result is released when it arrives.
#[must_use]
pub struct BlockingFuture<T> {
    rx: Receiver<Outcome<T>>,
    sender: Weak<()>,
}

impl<T> BlockingFuture<T> {
    /// Block until the operation completes.
    pub fn wait(self) -> Outcome<T> {
        self.rx.recv().unwrap_or(Outcome::Status(Status::Failure))
    }

    /// Block for at most `timeout`. On timeout the future is handed back.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Outcome<T>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Outcome::Status(Status::Failure)),
        }
    }

    /// Whether [`wait`](Self::wait) would return immediately, either with the
    /// result or with [`Status::Failure`] because the operation was abandoned.
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty() || self.sender.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;
    use crate::loopback::LoopbackEngine;

    fn bridge() -> Bridge {
        Bridge::new(LoopbackEngine::new(Default::default()).unwrap())
    }

    #[test]
    fn test_ready_after_completion() {
        let (future, signal) = promise::<Model>(bridge());
        assert!(!future.is_ready());

        signal.fail();
        assert!(future.is_ready());
        assert_eq!(future.wait().status(), Status::Failure);
    }

    #[test]
    fn test_ready_when_abandoned() {
        let (future, adapter) = pending::<Model>(bridge());
        assert!(!future.is_ready());

        drop(adapter);
        assert!(future.is_ready());
        assert_eq!(future.wait().status(), Status::Failure);
    }

    #[test]
    fn test_wait_timeout_when_abandoned() {
        let (future, adapter) = pending::<Model>(bridge());
        drop(adapter);
        let outcome = future.wait_timeout(Duration::from_secs(5)).ok().unwrap();
        assert_eq!(outcome.status(), Status::Failure);
    }
}
