use crate::bridge::Bridge;
use crate::outcome::Outcome;
use crate::status::Status;
use crate::sys::{CompletionFn, RawStatus};
use crate::Resource;
use std::any::Any;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;

/// Receives the completion routed through a [`CompletionSignal`].
pub(crate) trait Adapter: Send + Sized + 'static {
    /// Ownership of `result` (possibly null) passes to the adapter.
    fn complete(self, result: *mut c_void, status: Status);
}

/// Single-shot completion handed to the engine with every asynchronous operation.
///
/// The signal owns a heap-allocated adapter context. Firing it with
/// [`complete`](Self::complete) moves the result into that adapter and frees the
/// context, so it can only run once. A signal that is dropped without firing
/// completes with [`Status::Failure`].
pub struct CompletionSignal {
    callback: CompletionFn,
    context: NonNull<c_void>,
}

// SAFETY: the context is an owned `Box<A>` with `A: Send`, and the signal is the only pointer to it.
unsafe impl Send for CompletionSignal {}

impl CompletionSignal {
    pub(crate) fn from_adapter<A: Adapter>(adapter: A) -> Self {
        let context = NonNull::from(Box::leak(Box::new(adapter))).cast::<c_void>();
        Self {
            callback: trampoline::<A>,
            context,
        }
    }

    /// Fire the completion. Ownership of `result` passes to the receiving side.
    ///
    /// # Safety
    /// `result` must be null, or a live handle owned by the caller of the kind the
    /// operation produces, created by the engine the signal was handed to.
    ///
    /// Handing over a handle always takes an `unsafe` block:
    /// ```compile_fail,E0133
    /// fn fire(signal: courier::CompletionSignal, handle: *mut std::ffi::c_void) {
    ///     signal.complete(handle, courier::Status::Success);
    /// }
    /// ```
    pub unsafe fn complete(self, result: *mut c_void, status: Status) {
        let (callback, context) = self.into_raw();
        // SAFETY: the pair came out of `from_adapter` and `into_raw` guarantees it is fired once.
        unsafe { callback(result, status.into(), context) }
    }

    /// # Safety
    /// As for [`complete`](Self::complete).
    pub unsafe fn succeed<T>(self, handle: NonNull<T>) {
        unsafe { self.complete(handle.as_ptr().cast(), Status::Success) }
    }

    /// Complete with [`Status::Failure`] and no result.
    pub fn fail(self) {
        // SAFETY: a null result carries no handle.
        unsafe { self.complete(std::ptr::null_mut(), Status::Failure) }
    }

    /// Split into the raw function pointer and context for engines that keep them
    /// in C structures. The caller becomes responsible for invoking the function
    /// exactly once with the context.
    pub fn into_raw(self) -> (CompletionFn, *mut c_void) {
        let this = ManuallyDrop::new(self);
        (this.callback, this.context.as_ptr())
    }

    /// Rebuild a signal from [`into_raw`](Self::into_raw) parts.
    ///
    /// # Safety
    /// The parts must come from `into_raw` and must not have been invoked or rebuilt before.
    pub unsafe fn from_raw(callback: CompletionFn, context: *mut c_void) -> Option<Self> {
        NonNull::new(context).map(|context| Self { callback, context })
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        log::warn!("Completion signal dropped without firing, completing with failure");
        // SAFETY: a signal that still owns its context has never fired.
        unsafe {
            (self.callback)(
                std::ptr::null_mut(),
                Status::Failure.into(),
                self.context.as_ptr(),
            )
        }
    }
}

unsafe extern "C" fn trampoline<A: Adapter>(
    result: *mut c_void,
    status: RawStatus,
    context: *mut c_void,
) {
    // SAFETY: `context` is the `Box<A>` leaked by `from_adapter::<A>`; the signal carrying it was consumed.
    let adapter = unsafe { Box::from_raw(context.cast::<A>()) };
    let status = Status::from(status);
    let completed = std::panic::catch_unwind(AssertUnwindSafe(move || {
        adapter.complete(result, status);
    }));
    if let Err(panic) = completed {
        log::error!("Completion handler panicked: {}", panic_message(&panic));
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Runs a user closure on the engine thread.
pub(crate) struct CallbackAdapter<T, F> {
    bridge: Bridge,
    callback: F,
    _result: PhantomData<fn() -> T>,
}

impl<T, F> CallbackAdapter<T, F> {
    pub(crate) fn new(bridge: Bridge, callback: F) -> Self {
        Self {
            bridge,
            callback,
            _result: PhantomData,
        }
    }
}

impl<T, F> Adapter for CallbackAdapter<T, F>
where
    T: Resource,
    F: FnOnce(Outcome<T>) + Send + 'static,
{
    fn complete(self, result: *mut c_void, status: Status) {
        let outcome = Outcome::from_raw(&self.bridge, result, status);
        (self.callback)(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        calls: Arc<AtomicUsize>,
        statuses: crossbeam::channel::Sender<Status>,
    }

    impl Adapter for Recorder {
        fn complete(self, result: *mut c_void, status: Status) {
            assert!(result.is_null());
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statuses.send(status).unwrap();
        }
    }

    fn recorder() -> (Recorder, Arc<AtomicUsize>, crossbeam::channel::Receiver<Status>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam::channel::unbounded();
        (
            Recorder {
                calls: calls.clone(),
                statuses: tx,
            },
            calls,
            rx,
        )
    }

    #[test]
    fn test_fires_once() {
        let (adapter, calls, statuses) = recorder();
        let signal = CompletionSignal::from_adapter(adapter);
        std::thread::spawn(move || signal.fail()).join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(statuses.try_recv().unwrap(), Status::Failure);
        assert!(statuses.try_recv().is_err());
    }

    #[test]
    fn test_drop_completes_with_failure() {
        let (adapter, calls, statuses) = recorder();
        drop(CompletionSignal::from_adapter(adapter));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(statuses.try_recv().unwrap(), Status::Failure);
    }

    #[test]
    fn test_raw_parts_round_trip() {
        let (adapter, calls, statuses) = recorder();
        let (callback, context) = CompletionSignal::from_adapter(adapter).into_raw();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let signal = unsafe { CompletionSignal::from_raw(callback, context) }.unwrap();
        unsafe { signal.complete(std::ptr::null_mut(), Status::NoTaskReady) };

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(statuses.try_recv().unwrap(), Status::NoTaskReady);
    }

    #[test]
    fn test_panicking_adapter_is_contained() {
        struct Panics;
        impl Adapter for Panics {
            fn complete(self, _result: *mut c_void, _status: Status) {
                panic!("handler blew up");
            }
        }

        CompletionSignal::from_adapter(Panics).fail();
    }
}
