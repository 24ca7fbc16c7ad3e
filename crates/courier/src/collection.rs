use crate::bridge::Bridge;
use crate::error::TensorError;
use crate::handle::{CollectionKind, Owned};
use crate::tensor::Tensor;

/// Named tensors, used as inference inputs and outputs.
#[derive(Debug)]
pub struct TensorCollection {
    inner: Owned<CollectionKind>,
}

impl TensorCollection {
    pub(crate) fn new(bridge: &Bridge) -> Self {
        let raw = bridge.engine().collection_create();
        // SAFETY: the engine just created the collection and nobody else owns it.
        Self::from_owned(unsafe { Owned::from_raw(bridge.clone(), raw) })
    }

    pub(crate) fn from_owned(inner: Owned<CollectionKind>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_owned(self) -> Owned<CollectionKind> {
        self.inner
    }

    /// Build a collection by inserting every `(name, tensor)` pair.
    pub fn from_tensors<K, I>(bridge: &Bridge, tensors: I) -> Result<Self, TensorError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Tensor)>,
    {
        let mut collection = bridge.tensor_collection();
        for (key, tensor) in tensors {
            collection.insert(key.as_ref(), tensor)?;
        }
        Ok(collection)
    }

    pub fn bridge(&self) -> &Bridge {
        self.inner.bridge()
    }

    /// Release the collection and every tensor still in it.
    pub fn release(self) {
        drop(self);
    }

    /// Move `tensor` into the collection under `key`, replacing any previous entry.
    ///
    /// Fails with [`TensorError::ForeignEngine`] (dropping the tensor) if it was
    /// created by another engine.
    pub fn insert(&mut self, key: &str, tensor: Tensor) -> Result<(), TensorError> {
        if !tensor.bridge().same_engine(self.bridge()) {
            return Err(TensorError::ForeignEngine);
        }
        let raw = tensor.into_owned().into_raw();
        // SAFETY: the collection is live and exclusively borrowed; ownership of `raw` was just given up.
        unsafe {
            self.inner
                .engine()
                .collection_insert(self.inner.as_raw(), key, raw)
        };
        Ok(())
    }

    /// Take the tensor stored under `key` out of the collection.
    pub fn get_and_remove(&mut self, key: &str) -> Option<Tensor> {
        // SAFETY: the collection is live and exclusively borrowed.
        let raw = unsafe {
            self.inner
                .engine()
                .collection_get_and_remove(self.inner.as_raw(), key)
        }?;
        // SAFETY: the engine handed ownership of `raw` to us.
        let owned = unsafe { Owned::from_raw(self.bridge().clone(), raw) };
        Some(Tensor::from_owned(owned))
    }

    pub fn len(&self) -> usize {
        // SAFETY: the collection is live.
        unsafe { self.inner.engine().collection_len(self.inner.as_raw()) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
