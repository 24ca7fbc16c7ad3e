use crate::bridge::Bridge;
use crate::sys::{Engine, ModelObject, TensorCollectionObject, TensorObject};
use std::ffi::c_void;
use std::fmt::{Debug, Formatter};
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// How a kind of engine handle is released.
pub(crate) trait HandleKind {
    type Object;
    const NAME: &'static str;

    /// # Safety
    /// `raw` must be a live handle of this kind created by `engine`.
    unsafe fn release(engine: &dyn Engine, raw: NonNull<Self::Object>);
}

pub(crate) enum ModelKind {}
pub(crate) enum TensorKind {}
pub(crate) enum CollectionKind {}

impl HandleKind for ModelKind {
    type Object = ModelObject;
    const NAME: &'static str = "model";

    unsafe fn release(engine: &dyn Engine, raw: NonNull<ModelObject>) {
        unsafe { engine.release_model(raw) }
    }
}

impl HandleKind for TensorKind {
    type Object = TensorObject;
    const NAME: &'static str = "tensor";

    unsafe fn release(engine: &dyn Engine, raw: NonNull<TensorObject>) {
        unsafe { engine.release_tensor(raw) }
    }
}

impl HandleKind for CollectionKind {
    type Object = TensorCollectionObject;
    const NAME: &'static str = "tensor collection";

    unsafe fn release(engine: &dyn Engine, raw: NonNull<TensorCollectionObject>) {
        unsafe { engine.release_collection(raw) }
    }
}

/// Exclusive owner of one engine handle.
///
/// The handle is released exactly once, when the owner is dropped, unless
/// ownership is handed back to the engine with [`into_raw`](Self::into_raw).
/// Not `Clone`: two owners can never alias one handle.
pub(crate) struct Owned<K: HandleKind> {
    raw: NonNull<K::Object>,
    bridge: Bridge,
}

// SAFETY: the owner is the only reference to the handle and `Engine: Send + Sync`.
unsafe impl<K: HandleKind> Send for Owned<K> {}

impl<K: HandleKind> Owned<K> {
    /// # Safety
    /// `raw` must be a live handle of kind `K` created by the bridge's engine and
    /// owned by nobody else.
    pub(crate) unsafe fn from_raw(bridge: Bridge, raw: NonNull<K::Object>) -> Self {
        Self { raw, bridge }
    }

    pub(crate) fn as_raw(&self) -> NonNull<K::Object> {
        self.raw
    }

    pub(crate) fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub(crate) fn engine(&self) -> &dyn Engine {
        self.bridge.engine()
    }

    /// Give up ownership without releasing the handle.
    pub(crate) fn into_raw(self) -> NonNull<K::Object> {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the bridge is moved out exactly once.
        drop(unsafe { std::ptr::read(&this.bridge) });
        this.raw
    }
}

impl<K: HandleKind> Drop for Owned<K> {
    fn drop(&mut self) {
        log::trace!("Releasing {} handle {:p}", K::NAME, self.raw);
        // SAFETY: the handle is live and owned by `self`, which is going away.
        unsafe { K::release(self.bridge.engine(), self.raw) }
    }
}

impl<K: HandleKind> Debug for Owned<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:p})", K::NAME, self.raw)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// An engine resource that can be the result of an asynchronous operation.
pub trait Resource: Sized + Send + 'static + sealed::Sealed {
    /// Take ownership of a handle the engine just produced.
    ///
    /// # Safety
    /// `raw` must be a live handle of the right kind created by the bridge's engine.
    #[doc(hidden)]
    unsafe fn from_raw(bridge: &Bridge, raw: NonNull<c_void>) -> Self;
}

macro_rules! resource {
    ($ty:ident, $kind:ty) => {
        impl sealed::Sealed for crate::$ty {}

        impl Resource for crate::$ty {
            unsafe fn from_raw(bridge: &Bridge, raw: NonNull<c_void>) -> Self {
                // SAFETY: forwarded from the caller.
                let inner = unsafe { Owned::<$kind>::from_raw(bridge.clone(), raw.cast()) };
                crate::$ty::from_owned(inner)
            }
        }
    };
}

resource!(Model, ModelKind);
resource!(Tensor, TensorKind);
resource!(TensorCollection, CollectionKind);
