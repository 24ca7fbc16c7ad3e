use crate::blob::Blob;
use crate::tensor::{self, DataType};
use std::collections::HashMap;
use std::ffi::c_void;

macro_rules! storage {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        enum Storage {
            $($variant(Vec<$ty>),)*
            String(Vec<String>),
            Blob(Blob),
        }

        impl Storage {
            fn zeroed(dtype: DataType, len: usize) -> Self {
                match dtype {
                    $(DataType::$variant => Storage::$variant(vec![<$ty>::default(); len]),)*
                    DataType::String => Storage::String(vec![String::new(); len]),
                }
            }

            fn dtype(&self) -> DataType {
                match self {
                    $(Storage::$variant(_) => DataType::$variant,)*
                    Storage::String(_) => DataType::String,
                    Storage::Blob(blob) => blob.dtype(),
                }
            }

            fn data_ptr(&mut self) -> *mut c_void {
                match self {
                    $(Storage::$variant(values) => values.as_mut_ptr().cast(),)*
                    Storage::String(_) => std::ptr::null_mut(),
                    Storage::Blob(blob) => blob.as_ptr(),
                }
            }
        }
    };
}

storage!(
    Float(f32),
    Double(f64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
);

pub(super) struct LoopbackTensor {
    shape: Vec<u64>,
    strides: Vec<u64>,
    storage: Storage,
    // Cached once: the buffer never reallocates.
    data: *mut c_void,
}

// SAFETY: `data` points into storage owned by the tensor.
unsafe impl Send for LoopbackTensor {}

impl LoopbackTensor {
    /// `None` if the shape does not fit in memory.
    pub(super) fn new(dtype: DataType, shape: &[u64]) -> Option<Self> {
        let len = tensor::element_count(shape).ok()?;
        Some(Self::with_storage(
            Storage::zeroed(dtype, len),
            shape.to_vec(),
            tensor::row_major_strides(shape),
        ))
    }

    pub(super) fn from_blob(blob: Blob, shape: &[u64], strides: &[u64]) -> Self {
        Self::with_storage(Storage::Blob(blob), shape.to_vec(), strides.to_vec())
    }

    fn with_storage(mut storage: Storage, shape: Vec<u64>, strides: Vec<u64>) -> Self {
        let data = storage.data_ptr();
        Self {
            shape,
            strides,
            storage,
            data,
        }
    }

    pub(super) fn string(value: &str) -> Self {
        Self::with_storage(Storage::String(vec![value.to_owned()]), vec![1], vec![1])
    }

    pub(super) fn dtype(&self) -> DataType {
        self.storage.dtype()
    }

    pub(super) fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub(super) fn strides(&self) -> &[u64] {
        &self.strides
    }

    pub(super) fn data(&self) -> *mut c_void {
        self.data
    }

    pub(super) fn get_string(&self, index: u64) -> Option<String> {
        match &self.storage {
            Storage::String(values) => values.get(index as usize).cloned(),
            _ => None,
        }
    }

    pub(super) fn set_string(&mut self, index: u64, value: &str) -> bool {
        match &mut self.storage {
            Storage::String(values) => match values.get_mut(index as usize) {
                Some(slot) => {
                    *slot = value.to_owned();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

#[derive(Default)]
pub(super) struct LoopbackCollection {
    pub(super) tensors: HashMap<String, Box<LoopbackTensor>>,
}
