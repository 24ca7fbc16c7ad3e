use crate::bridge::Bridge;
use crate::collection::TensorCollection;
use crate::future::{self, BlockingFuture};
use crate::handle::{ModelKind, Owned};
use crate::notifier::NotifierToken;
use crate::outcome::Outcome;
use crate::signal::{CallbackAdapter, CompletionSignal};

/// A loaded model. Obtained from [`Bridge::load`] and friends.
#[derive(Debug)]
pub struct Model {
    inner: Owned<ModelKind>,
}

// SAFETY: engines accept concurrent `infer` calls on one model; every other access goes through `&mut` or drop.
unsafe impl Sync for Model {}

impl Model {
    pub(crate) fn from_owned(inner: Owned<ModelKind>) -> Self {
        Self { inner }
    }

    pub fn bridge(&self) -> &Bridge {
        self.inner.bridge()
    }

    /// Release the model now. Same as dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Run inference. `inputs` is handed over to the engine.
    pub fn infer(&self, inputs: TensorCollection) -> BlockingFuture<TensorCollection> {
        let (future, signal) = future::promise(self.bridge().clone());
        self.submit_infer(inputs, signal);
        future
    }

    /// Run inference and hand the outcome to `callback` on an engine thread.
    ///
    /// Same restrictions as [`Bridge::load_with_callback`]: the callback must not block.
    pub fn infer_with_callback<F>(&self, inputs: TensorCollection, callback: F)
    where
        F: FnOnce(Outcome<TensorCollection>) + Send + 'static,
    {
        let adapter = CallbackAdapter::new(self.bridge().clone(), callback);
        self.submit_infer(inputs, CompletionSignal::from_adapter(adapter));
    }

    /// Run inference and queue the outcome on the notifier `token` was registered with.
    pub fn infer_with_notifier<C: Send + 'static>(
        &self,
        inputs: TensorCollection,
        token: NotifierToken<TensorCollection, C>,
    ) {
        let signal = token.into_signal(self.bridge().clone());
        self.submit_infer(inputs, signal);
    }

    fn submit_infer(&self, inputs: TensorCollection, signal: CompletionSignal) {
        if !inputs.bridge().same_engine(self.bridge()) {
            log::error!("Inference inputs were created by a different engine than {self:?}");
            signal.fail();
            return;
        }
        log::debug!("Submitting inference on {self:?} with {} input(s)", inputs.len());
        let inputs = inputs.into_owned().into_raw();
        // SAFETY: the model is live while `self` is borrowed, and ownership of `inputs` was just given up.
        unsafe {
            self.inner
                .engine()
                .infer(self.inner.as_raw(), inputs, signal)
        }
    }
}
