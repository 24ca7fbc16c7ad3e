use crate::tensor::{DataType, Numeric};
use std::ffi::c_void;
use std::fmt::{Debug, Formatter};
use std::ptr::NonNull;

type Deleter = Box<dyn FnOnce() + Send>;

/// Caller-owned numeric storage lent to the engine for a tensor's lifetime.
///
/// The deleter runs exactly once, when the blob is dropped. Engines drop the blob
/// when their last reference to the data goes away.
pub struct Blob {
    data: NonNull<c_void>,
    len: usize,
    dtype: DataType,
    deleter: Option<Deleter>,
}

// SAFETY: the blob is the only handle to its data and the deleter is `Send`.
unsafe impl Send for Blob {}

impl Blob {
    /// Lend an owned buffer. Dropping the buffer is the deleter.
    pub fn new<T, B>(buffer: B) -> Self
    where
        T: Numeric,
        B: AsMut<[T]> + Send + 'static,
    {
        let owner = Owner(NonNull::from(Box::leak(Box::new(buffer))));
        // SAFETY: `owner` was just leaked and nothing else refers to it.
        let values = unsafe { &mut *owner.0.as_ptr() }.as_mut();
        let len = values.len();
        let data = NonNull::from(values).cast::<c_void>();
        Self {
            data,
            len,
            dtype: T::DTYPE,
            deleter: Some(Box::new(move || owner.release())),
        }
    }

    /// Lend memory managed elsewhere. `deleter` runs once the engine is done with it.
    ///
    /// # Safety
    /// `data` must be valid for reads and writes of `len` elements of `T` until
    /// `deleter` runs, and nothing else may access it meanwhile.
    pub unsafe fn from_raw_parts<T: Numeric>(
        data: NonNull<T>,
        len: usize,
        deleter: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            data: data.cast(),
            len,
            dtype: T::DTYPE,
            deleter: Some(Box::new(deleter)),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.data.as_ptr()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Some(deleter) = self.deleter.take() {
            deleter();
        }
    }
}

impl Debug for Blob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("dtype", &self.dtype)
            .field("len", &self.len)
            .field("data", &self.data)
            .finish()
    }
}

struct Owner<B>(NonNull<B>);

// SAFETY: `Owner` is the unique owner of a leaked `Box<B>`.
unsafe impl<B: Send> Send for Owner<B> {}

impl<B> Owner<B> {
    fn release(self) {
        // SAFETY: the pointer came from `Box::leak` and is released once.
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        values: Vec<f32>,
        drops: Arc<AtomicUsize>,
    }

    impl AsMut<[f32]> for Counted {
        fn as_mut(&mut self) -> &mut [f32] {
            &mut self.values
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_buffer_dropped_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let blob = Blob::new::<f32, _>(Counted {
            values: vec![1.0, 2.0, 3.0],
            drops: drops.clone(),
        });
        assert_eq!(blob.dtype(), DataType::Float);
        assert_eq!(blob.len(), 3);
        let first = unsafe { *blob.as_ptr().cast::<f32>() };
        assert_eq!(first, 1.0);

        let moved = blob;
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(moved);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_array_buffer_is_stable() {
        let blob = Blob::new::<u16, _>([7u16; 4]);
        let moved = blob;
        let values = unsafe { std::slice::from_raw_parts(moved.as_ptr().cast::<u16>(), moved.len()) };
        assert_eq!(values, &[7, 7, 7, 7]);
    }

    #[test]
    fn test_raw_parts_deleter() {
        let mut values = vec![1i64, 2];
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let blob = unsafe {
            Blob::from_raw_parts(NonNull::from(values.as_mut_slice()).cast::<i64>(), 2, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(blob.dtype(), DataType::I64);
        drop(blob);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
