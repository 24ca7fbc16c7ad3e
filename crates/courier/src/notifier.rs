use crate::bridge::Bridge;
use crate::handle::Resource;
use crate::outcome::Outcome;
use crate::signal::{Adapter, CompletionSignal};
use crate::status::Status;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::ffi::c_void;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_NOTIFIER_ID: AtomicU64 = AtomicU64::new(0);

/// A completed operation as handed out by an [`AsyncNotifier`]: the outcome plus
/// the context given at registration.
#[derive(Debug)]
pub struct Delivery<T, C> {
    pub outcome: Outcome<T>,
    pub context: C,
}

impl<T, C> Delivery<T, C> {
    pub fn status(&self) -> Status {
        self.outcome.status()
    }

    pub fn into_parts(self) -> (Outcome<T>, C) {
        (self.outcome, self.context)
    }
}

/// Completion queue for results of asynchronous operations.
///
/// Engine threads push completions as they finish; any number of threads can
/// drain them with [`wait`](Self::wait) or [`get`](Self::get). Deliveries come out
/// in completion order and each one is handed to exactly one caller.
///
/// ```no_run
/// # use courier::{AsyncNotifier, Bridge, Model};
/// # fn demo(bridge: &Bridge) {
/// let notifier = AsyncNotifier::<Model, &'static str>::new();
/// bridge.load_with_notifier("models/bert", notifier.register("bert"));
///
/// let delivery = notifier.wait();
/// assert_eq!(delivery.context, "bert");
/// # }
/// ```
pub struct AsyncNotifier<T, C = ()> {
    id: u64,
    tx: Sender<Delivery<T, C>>,
    rx: Receiver<Delivery<T, C>>,
    in_flight: Arc<AtomicUsize>,
}

impl<T: Resource, C: Send + 'static> AsyncNotifier<T, C> {
    pub fn new() -> Self {
        let id = NEXT_NOTIFIER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam::channel::unbounded();
        log::debug!("Created notifier {id}");
        Self {
            id,
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Issue a single-use token carrying `context`. Passing it to one submission
    /// routes that operation's completion to this notifier.
    pub fn register(&self, context: C) -> NotifierToken<T, C> {
        NotifierToken {
            notifier_id: self.id,
            tx: self.tx.clone(),
            in_flight: self.in_flight.clone(),
            context,
        }
    }

    /// Block until a completion is available and take the oldest one.
    ///
    /// Blocks forever if nothing was submitted; see [`wait_timeout`](Self::wait_timeout).
    pub fn wait(&self) -> Delivery<T, C> {
        match self.rx.recv() {
            Ok(delivery) => delivery,
            Err(_) => unreachable!("notifier {} holds its own sender", self.id),
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout` with [`Status::NoTaskReady`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Delivery<T, C>, Status> {
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => Ok(delivery),
            Err(RecvTimeoutError::Timeout) => Err(Status::NoTaskReady),
            Err(RecvTimeoutError::Disconnected) => {
                unreachable!("notifier {} holds its own sender", self.id)
            }
        }
    }

    /// Take the oldest completion without blocking, or [`Status::NoTaskReady`].
    pub fn get(&self) -> Result<Delivery<T, C>, Status> {
        match self.rx.try_recv() {
            Ok(delivery) => Ok(delivery),
            Err(TryRecvError::Empty) => Err(Status::NoTaskReady),
            Err(TryRecvError::Disconnected) => {
                unreachable!("notifier {} holds its own sender", self.id)
            }
        }
    }

    /// Completions waiting to be taken.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Submitted operations whose completion has not been queued yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl<T: Resource, C: Send + 'static> Default for AsyncNotifier<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> Drop for AsyncNotifier<T, C> {
    fn drop(&mut self) {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        if in_flight > 0 {
            log::warn!(
                "Notifier {} dropped with {in_flight} operation(s) in flight; their results will be released",
                self.id
            );
        }
        let queued = self.rx.len();
        if queued > 0 {
            log::debug!("Notifier {} dropped with {queued} undrained completion(s)", self.id);
        }
    }
}

impl<T, C> Debug for AsyncNotifier<T, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncNotifier")
            .field("id", &self.id)
            .field("queued", &self.rx.len())
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

/// Registration on an [`AsyncNotifier`], consumed by exactly one submission.
///
/// A token that is never submitted can simply be dropped.
#[must_use]
pub struct NotifierToken<T, C> {
    notifier_id: u64,
    tx: Sender<Delivery<T, C>>,
    in_flight: Arc<AtomicUsize>,
    context: C,
}

impl<T: Resource, C: Send + 'static> NotifierToken<T, C> {
    pub fn context(&self) -> &C {
        &self.context
    }

    pub(crate) fn into_signal(self, bridge: Bridge) -> CompletionSignal {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        CompletionSignal::from_adapter(NotifierAdapter {
            notifier_id: self.notifier_id,
            bridge,
            tx: self.tx,
            in_flight: self.in_flight,
            context: self.context,
        })
    }
}

struct NotifierAdapter<T, C> {
    notifier_id: u64,
    bridge: Bridge,
    tx: Sender<Delivery<T, C>>,
    in_flight: Arc<AtomicUsize>,
    context: C,
}

impl<T: Resource, C: Send + 'static> Adapter for NotifierAdapter<T, C> {
    fn complete(self, result: *mut c_void, status: Status) {
        let delivery = Delivery {
            outcome: Outcome::from_raw(&self.bridge, result, status),
            context: self.context,
        };
        // Settled before the delivery becomes visible to consumers.
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.tx.send(delivery).is_err() {
            log::warn!(
                "Notifier {} is gone, releasing a late {status} completion",
                self.notifier_id
            );
        }
    }
}
