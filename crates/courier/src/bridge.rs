use crate::collection::TensorCollection;
use crate::error::TensorError;
use crate::future::{self, BlockingFuture};
use crate::model::Model;
use crate::notifier::NotifierToken;
use crate::outcome::Outcome;
use crate::signal::{CallbackAdapter, CompletionSignal};
use crate::sys::Engine;
use crate::tensor::{DataType, Tensor};
use derive_more::{Deref, Display, From};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Where a model lives, as understood by the engine (a path, a URL, a registry name...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deref, Display, From)]
pub struct Locator(String);

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Entry point to an engine. Cheap to clone.
///
/// Every wrapper created through a bridge keeps a clone of it, so handles are
/// always released by the engine that created them.
#[derive(Clone)]
pub struct Bridge {
    engine: Arc<dyn Engine>,
}

impl Bridge {
    pub fn new(engine: impl Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_arc(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub(crate) fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Whether both bridges talk to the same engine instance.
    pub fn same_engine(&self, other: &Bridge) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.engine).cast::<()>(),
            Arc::as_ptr(&other.engine).cast::<()>(),
        )
    }

    /// Load a model, resolving the returned future when the engine is done.
    pub fn load(&self, locator: impl Into<Locator>) -> BlockingFuture<Model> {
        let (future, signal) = future::promise(self.clone());
        self.submit_load(locator.into(), signal);
        future
    }

    /// Load a model and hand the outcome to `callback` on an engine thread.
    ///
    /// The callback must not block or do heavy work: it runs inside the engine's
    /// own worker and can stall unrelated operations. Use [`load`](Self::load) or
    /// [`load_with_notifier`](Self::load_with_notifier) for anything else.
    pub fn load_with_callback<F>(&self, locator: impl Into<Locator>, callback: F)
    where
        F: FnOnce(Outcome<Model>) + Send + 'static,
    {
        let adapter = CallbackAdapter::new(self.clone(), callback);
        self.submit_load(locator.into(), CompletionSignal::from_adapter(adapter));
    }

    /// Load a model and queue the outcome on the notifier `token` was registered with.
    pub fn load_with_notifier<C: Send + 'static>(
        &self,
        locator: impl Into<Locator>,
        token: NotifierToken<Model, C>,
    ) {
        self.submit_load(locator.into(), token.into_signal(self.clone()));
    }

    fn submit_load(&self, locator: Locator, signal: CompletionSignal) {
        log::debug!("Submitting load of '{locator}'");
        self.engine.load(&locator, signal);
    }

    /// Create a zero-initialised, row-major tensor.
    pub fn tensor(&self, dtype: DataType, shape: &[u64]) -> Result<Tensor, TensorError> {
        Tensor::new(self, dtype, shape)
    }

    pub fn tensor_collection(&self) -> TensorCollection {
        TensorCollection::new(self)
    }
}

impl Debug for Bridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bridge({:p})", Arc::as_ptr(&self.engine).cast::<()>())
    }
}
