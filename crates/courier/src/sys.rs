//! Foreign-function surface of the engine.
//!
//! Everything the bridge knows about the engine goes through this module: opaque
//! object types, the raw status code, the completion function pointer and the
//! [`Engine`] trait. Completions arrive as a [`CompletionSignal`] that the engine
//! must fire exactly once, from any thread it likes.
use crate::blob::Blob;
use crate::signal::CompletionSignal;
use crate::tensor::DataType;
use std::ffi::c_void;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr::NonNull;

macro_rules! opaque_object {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[repr(C)]
            pub struct $name {
                _data: [u8; 0],
                _marker: PhantomData<(*mut u8, PhantomPinned)>,
            }
        )*
    };
}

opaque_object!(
    /// Engine-side model object.
    ModelObject,
    /// Engine-side tensor object.
    TensorObject,
    /// Engine-side map from names to tensors.
    TensorCollectionObject,
);

pub type RawModel = NonNull<ModelObject>;
pub type RawTensor = NonNull<TensorObject>;
pub type RawTensorCollection = NonNull<TensorCollectionObject>;

/// Status code as it crosses the boundary. `0` is success, `1` means no task was
/// ready, anything else is an engine failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawStatus(pub u32);

/// Shape of every completion: the result handle (null on failure), the status and
/// the context pointer that was registered with the operation.
pub type CompletionFn =
    unsafe extern "C" fn(result: *mut c_void, status: RawStatus, context: *mut c_void);

/// The external engine.
///
/// Handles passed to the `unsafe` methods must be live handles created by the same
/// engine and not yet released or handed back to it.
///
/// # Safety
/// The safe wrappers in this crate build slices and owned handles from what an
/// engine reports, so an implementation must uphold:
/// * Every handle it returns (from `tensor_create`, `tensor_from_blob`,
///   `collection_get_and_remove`, or through a successful [`CompletionSignal`])
///   is live, of the kind the operation produces, and owned by the receiver
///   until it is released or handed back.
/// * Each `release_*` method accepts any live handle of its kind that it created.
/// * A tensor's dtype, shape and strides never change while it is live, and the
///   element count of its shape fits in `usize`.
/// * For a numeric tensor whose strides are the row-major strides of its shape,
///   `tensor_data` is non-null, aligned for the element type, and valid for reads
///   and writes of `shape.product()` elements until the tensor is released or
///   moved into a collection. The engine does not touch that memory meanwhile.
///   For any other tensor it is null or the same guarantees hold.
/// * `infer` may be called concurrently on one model.
pub unsafe trait Engine: Send + Sync + 'static {
    /// Start loading the model at `locator`. The signal fires with a model handle.
    fn load(&self, locator: &str, signal: CompletionSignal);

    /// Start running `model` on `inputs`. The signal fires with a tensor collection handle.
    ///
    /// # Safety
    /// `model` must be live. Ownership of `inputs` passes to the engine.
    unsafe fn infer(&self, model: RawModel, inputs: RawTensorCollection, signal: CompletionSignal);

    /// # Safety
    /// `model` must be live; it is dead afterwards.
    unsafe fn release_model(&self, model: RawModel);

    /// Create a zero-initialised, row-major tensor (empty strings for string
    /// tensors). `None` if the engine cannot allocate it.
    fn tensor_create(&self, dtype: DataType, shape: &[u64]) -> Option<RawTensor>;

    /// Wrap caller-owned numeric data. The engine drops `blob` once it no longer
    /// references the data, including when it rejects the blob with `None`.
    ///
    /// `strides` are in elements. Layouts that address elements outside the blob
    /// must be rejected.
    fn tensor_from_blob(&self, blob: Blob, shape: &[u64], strides: &[u64]) -> Option<RawTensor>;

    /// # Safety
    /// `tensor` must be live.
    unsafe fn tensor_dtype(&self, tensor: RawTensor) -> DataType;

    /// # Safety
    /// `tensor` must be live.
    unsafe fn tensor_shape(&self, tensor: RawTensor) -> Vec<u64>;

    /// Element strides, one per dimension.
    ///
    /// # Safety
    /// `tensor` must be live.
    unsafe fn tensor_strides(&self, tensor: RawTensor) -> Vec<u64>;

    /// First element of a numeric tensor's storage, or null for string tensors.
    /// See the trait's safety contract for what the pointer must cover.
    ///
    /// # Safety
    /// `tensor` must be live.
    unsafe fn tensor_data(&self, tensor: RawTensor) -> *mut c_void;

    /// # Safety
    /// `tensor` must be live.
    unsafe fn tensor_get_string(&self, tensor: RawTensor, index: u64) -> Option<String>;

    /// # Safety
    /// `tensor` must be live and not aliased.
    unsafe fn tensor_set_string(&self, tensor: RawTensor, index: u64, value: &str) -> RawStatus;

    /// # Safety
    /// `tensor` must be live; it is dead afterwards.
    unsafe fn release_tensor(&self, tensor: RawTensor);

    fn collection_create(&self) -> RawTensorCollection;

    /// # Safety
    /// `collection` must be live. Ownership of `tensor` passes to the collection.
    unsafe fn collection_insert(&self, collection: RawTensorCollection, key: &str, tensor: RawTensor);

    /// Remove the tensor stored under `key` and hand its ownership to the caller.
    ///
    /// # Safety
    /// `collection` must be live.
    unsafe fn collection_get_and_remove(
        &self,
        collection: RawTensorCollection,
        key: &str,
    ) -> Option<RawTensor>;

    /// # Safety
    /// `collection` must be live.
    unsafe fn collection_len(&self, collection: RawTensorCollection) -> usize;

    /// # Safety
    /// `collection` must be live; it and every tensor it holds are dead afterwards.
    unsafe fn release_collection(&self, collection: RawTensorCollection);
}
