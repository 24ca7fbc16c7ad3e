use crate::blob::Blob;
use crate::bridge::Bridge;
use crate::error::TensorError;
use crate::handle::{Owned, TensorKind};
use crate::status::Status;
use crate::sys::RawStatus;

/// Element type of a tensor. The order matches the engine's C enum.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[repr(C)]
pub enum DataType {
    Float,
    Double,
    String,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        self != DataType::String
    }
}

/// A Rust type that can be stored in a tensor.
pub trait Element: Sized + Send + 'static {
    const DTYPE: DataType;
}

/// An [`Element`] stored inline in the tensor's data buffer.
pub trait Numeric: Element + Copy {}

macro_rules! numeric_elements {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = DataType::$dtype;
            }

            impl Numeric for $ty {}
        )*
    };
}

numeric_elements!(
    f32 => Float,
    f64 => Double,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

impl Element for String {
    const DTYPE: DataType = DataType::String;
}

/// Number of elements described by `shape`, if it fits in `usize`.
pub(crate) fn element_count(shape: &[u64]) -> Result<usize, TensorError> {
    shape
        .iter()
        .try_fold(1usize, |count, &dim| {
            usize::try_from(dim).ok().and_then(|dim| count.checked_mul(dim))
        })
        .ok_or_else(|| TensorError::ShapeOverflow {
            shape: shape.to_vec(),
        })
}

/// Element strides of a densely packed row-major tensor.
pub(crate) fn row_major_strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![0; shape.len()];
    let mut next = 1u64;
    for (stride, &dim) in strides.iter_mut().zip(shape).rev() {
        *stride = next;
        next = next.saturating_mul(dim);
    }
    strides
}

/// Whether `strides` lay `shape` out densely in row-major order. Strides of
/// dimensions of size one are ignored.
pub(crate) fn is_row_major(shape: &[u64], strides: &[u64]) -> bool {
    if shape.len() != strides.len() {
        return false;
    }
    if shape.contains(&0) {
        return true;
    }
    let mut expected = 1u64;
    for (&dim, &stride) in shape.iter().zip(strides).rev() {
        if dim > 1 && stride != expected {
            return false;
        }
        expected = expected.saturating_mul(dim);
    }
    true
}

/// Check that every element addressed by `shape` and `strides` lies within `len`
/// elements of storage.
pub(crate) fn check_layout(len: usize, shape: &[u64], strides: &[u64]) -> Result<(), TensorError> {
    let invalid = || TensorError::InvalidStrides {
        shape: shape.to_vec(),
        strides: strides.to_vec(),
    };
    if shape.len() != strides.len() {
        return Err(invalid());
    }
    if element_count(shape)? == 0 {
        return Ok(());
    }
    let last = shape
        .iter()
        .zip(strides)
        .try_fold(0u64, |offset, (&dim, &stride)| {
            (dim - 1).checked_mul(stride)?.checked_add(offset)
        })
        .ok_or_else(invalid)?;
    match usize::try_from(last) {
        Ok(last) if last < len => Ok(()),
        _ => Err(invalid()),
    }
}

/// An engine tensor. Elements are addressed by their flattened, row-major index.
#[derive(Debug)]
pub struct Tensor {
    inner: Owned<TensorKind>,
}

impl Tensor {
    pub(crate) fn new(bridge: &Bridge, dtype: DataType, shape: &[u64]) -> Result<Self, TensorError> {
        element_count(shape)?;
        let raw = bridge
            .engine()
            .tensor_create(dtype, shape)
            .ok_or(TensorError::Engine(Status::Failure))?;
        // SAFETY: the engine just created the tensor and nobody else owns it.
        Ok(Self::from_owned(unsafe { Owned::from_raw(bridge.clone(), raw) }))
    }

    /// Wrap caller-owned numeric data without copying it. `strides` are in
    /// elements, one per dimension.
    ///
    /// The blob's deleter runs once the engine no longer references the data, or
    /// right away if the layout is rejected.
    pub fn from_blob(
        bridge: &Bridge,
        blob: Blob,
        shape: &[u64],
        strides: &[u64],
    ) -> Result<Self, TensorError> {
        check_layout(blob.len(), shape, strides)?;
        let raw = bridge
            .engine()
            .tensor_from_blob(blob, shape, strides)
            .ok_or(TensorError::Engine(Status::Failure))?;
        // SAFETY: the engine just created the tensor and nobody else owns it.
        Ok(Self::from_owned(unsafe { Owned::from_raw(bridge.clone(), raw) }))
    }

    pub(crate) fn from_owned(inner: Owned<TensorKind>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_owned(self) -> Owned<TensorKind> {
        self.inner
    }

    /// Create a numeric tensor holding a copy of `values`.
    pub fn from_slice<T: Numeric>(
        bridge: &Bridge,
        shape: &[u64],
        values: &[T],
    ) -> Result<Self, TensorError> {
        let mut tensor = bridge.tensor(T::DTYPE, shape)?;
        let data = tensor.as_mut_slice::<T>()?;
        if data.len() != values.len() {
            return Err(TensorError::LengthMismatch {
                expected: data.len(),
                actual: values.len(),
            });
        }
        data.copy_from_slice(values);
        Ok(tensor)
    }

    /// Create a string tensor holding a copy of `values`.
    pub fn from_strings<S: AsRef<str>>(
        bridge: &Bridge,
        shape: &[u64],
        values: &[S],
    ) -> Result<Self, TensorError> {
        let mut tensor = bridge.tensor(DataType::String, shape)?;
        if tensor.len() != values.len() {
            return Err(TensorError::LengthMismatch {
                expected: tensor.len(),
                actual: values.len(),
            });
        }
        for (index, value) in values.iter().enumerate() {
            tensor.set_string(index as u64, value.as_ref())?;
        }
        Ok(tensor)
    }

    pub fn bridge(&self) -> &Bridge {
        self.inner.bridge()
    }

    pub fn release(self) {
        drop(self);
    }

    pub fn dtype(&self) -> DataType {
        // SAFETY: the tensor is live.
        unsafe { self.inner.engine().tensor_dtype(self.inner.as_raw()) }
    }

    pub fn shape(&self) -> Vec<u64> {
        // SAFETY: the tensor is live.
        unsafe { self.inner.engine().tensor_shape(self.inner.as_raw()) }
    }

    /// Element strides, one per dimension.
    pub fn strides(&self) -> Vec<u64> {
        // SAFETY: the tensor is live.
        unsafe { self.inner.engine().tensor_strides(self.inner.as_raw()) }
    }

    /// Whether the elements are densely packed in row-major order, which
    /// [`as_slice`](Self::as_slice) and friends require.
    pub fn is_contiguous(&self) -> bool {
        is_row_major(&self.shape(), &self.strides())
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        // Engines never report shapes that overflow.
        element_count(&self.shape()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice<T: Numeric>(&self) -> Result<&[T], TensorError> {
        let len = self.contiguous_len(T::DTYPE)?;
        // SAFETY: the tensor is live.
        let data = unsafe { self.inner.engine().tensor_data(self.inner.as_raw()) };
        if data.is_null() || len == 0 {
            return Ok(&[]);
        }
        // SAFETY: per the `Engine` contract a live, row-major numeric tensor exposes
        // `len` aligned, initialised elements of `T::DTYPE`; `&self` rules out writers.
        Ok(unsafe { std::slice::from_raw_parts(data.cast::<T>(), len) })
    }

    pub fn as_mut_slice<T: Numeric>(&mut self) -> Result<&mut [T], TensorError> {
        let len = self.contiguous_len(T::DTYPE)?;
        // SAFETY: the tensor is live.
        let data = unsafe { self.inner.engine().tensor_data(self.inner.as_raw()) };
        if data.is_null() || len == 0 {
            return Ok(&mut []);
        }
        // SAFETY: as in `as_slice`; `&mut self` makes this the only view.
        Ok(unsafe { std::slice::from_raw_parts_mut(data.cast::<T>(), len) })
    }

    pub fn get<T: Numeric>(&self, index: u64) -> Result<T, TensorError> {
        let data = self.as_slice::<T>()?;
        data.get(index as usize)
            .copied()
            .ok_or(TensorError::IndexOutOfBounds {
                index,
                len: data.len(),
            })
    }

    pub fn set<T: Numeric>(&mut self, index: u64, value: T) -> Result<(), TensorError> {
        let data = self.as_mut_slice::<T>()?;
        let len = data.len();
        let slot = data
            .get_mut(index as usize)
            .ok_or(TensorError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn get_string(&self, index: u64) -> Result<String, TensorError> {
        self.expect_dtype(DataType::String)?;
        self.check_index(index)?;
        // SAFETY: the tensor is live.
        unsafe {
            self.inner
                .engine()
                .tensor_get_string(self.inner.as_raw(), index)
        }
        .ok_or(TensorError::Engine(Status::Failure))
    }

    pub fn set_string(&mut self, index: u64, value: &str) -> Result<(), TensorError> {
        self.expect_dtype(DataType::String)?;
        self.check_index(index)?;
        // SAFETY: the tensor is live and exclusively borrowed.
        let status: RawStatus = unsafe {
            self.inner
                .engine()
                .tensor_set_string(self.inner.as_raw(), index, value)
        };
        match Status::from(status) {
            Status::Success => Ok(()),
            status => Err(TensorError::Engine(status)),
        }
    }

    fn expect_dtype(&self, expected: DataType) -> Result<(), TensorError> {
        let actual = self.dtype();
        if actual == expected {
            Ok(())
        } else {
            Err(TensorError::DataTypeMismatch { expected, actual })
        }
    }

    fn contiguous_len(&self, dtype: DataType) -> Result<usize, TensorError> {
        self.expect_dtype(dtype)?;
        let shape = self.shape();
        if !is_row_major(&shape, &self.strides()) {
            return Err(TensorError::NonContiguous);
        }
        element_count(&shape)
    }

    fn check_index(&self, index: u64) -> Result<(), TensorError> {
        let len = element_count(&self.shape())?;
        if (index as usize) < len {
            Ok(())
        } else {
            Err(TensorError::IndexOutOfBounds { index, len })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackEngine;
    use std::str::FromStr;

    fn bridge() -> Bridge {
        Bridge::new(LoopbackEngine::new(Default::default()).unwrap())
    }

    #[test]
    fn test_numeric_get_set() {
        let bridge = bridge();
        let mut tensor = bridge.tensor(DataType::Float, &[2, 3]).unwrap();
        assert_eq!(tensor.shape(), vec![2, 3]);
        assert_eq!(tensor.len(), 6);
        assert_eq!(tensor.get::<f32>(4).unwrap(), 0.0);

        tensor.set(4, 2.5f32).unwrap();
        assert_eq!(tensor.get::<f32>(4).unwrap(), 2.5);
        assert_eq!(tensor.as_slice::<f32>().unwrap(), &[0.0, 0.0, 0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_dtype_mismatch() {
        let bridge = bridge();
        let tensor = bridge.tensor(DataType::I64, &[1]).unwrap();
        assert_eq!(
            tensor.get::<f32>(0),
            Err(TensorError::DataTypeMismatch {
                expected: DataType::Float,
                actual: DataType::I64,
            })
        );
        assert!(matches!(
            tensor.get_string(0),
            Err(TensorError::DataTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let bridge = bridge();
        let mut tensor = bridge.tensor(DataType::U8, &[3]).unwrap();
        assert_eq!(
            tensor.set(3, 1u8),
            Err(TensorError::IndexOutOfBounds { index: 3, len: 3 })
        );

        let mut strings = bridge.tensor(DataType::String, &[1]).unwrap();
        assert!(matches!(
            strings.set_string(1, "nope"),
            Err(TensorError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_strings() {
        let bridge = bridge();
        let mut tensor = Tensor::from_strings(&bridge, &[2], &["Today is a good", "day"]).unwrap();
        assert_eq!(tensor.dtype(), DataType::String);
        assert_eq!(tensor.get_string(1).unwrap(), "day");

        tensor.set_string(0, "[MASK]").unwrap();
        assert_eq!(tensor.get_string(0).unwrap(), "[MASK]");
    }

    #[test]
    fn test_from_slice_length_mismatch() {
        let bridge = bridge();
        let err = Tensor::from_slice(&bridge, &[2, 2], &[1i32, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            TensorError::LengthMismatch {
                expected: 4,
                actual: 3,
            }
        );

        let tensor = Tensor::from_slice(&bridge, &[2, 2], &[1i32, 2, 3, 4]).unwrap();
        assert_eq!(tensor.get::<i32>(3).unwrap(), 4);
    }

    #[test]
    fn test_shape_overflow() {
        let bridge = bridge();
        let err = bridge.tensor(DataType::U8, &[u64::MAX, 2]).unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeOverflow {
                shape: vec![u64::MAX, 2]
            }
        );
        assert_eq!(element_count(&[]).unwrap(), 1);
        assert_eq!(element_count(&[3, 0, u64::MAX]).unwrap(), 0);
    }

    #[test]
    fn test_created_tensors_are_row_major() {
        let bridge = bridge();
        let tensor = bridge.tensor(DataType::I16, &[2, 3, 4]).unwrap();
        assert_eq!(tensor.strides(), vec![12, 4, 1]);
        assert!(tensor.is_contiguous());
    }

    #[test]
    fn test_layout_helpers() {
        assert_eq!(row_major_strides(&[5]), vec![1]);
        assert!(is_row_major(&[2, 1, 3], &[3, 99, 1]));
        assert!(!is_row_major(&[2, 3], &[1, 2]));
        assert!(is_row_major(&[0, 3], &[7, 7]));

        assert!(check_layout(6, &[2, 3], &[1, 2]).is_ok());
        assert!(check_layout(5, &[2, 3], &[3, 1]).is_err());
        assert!(check_layout(0, &[0], &[1]).is_ok());
        assert!(check_layout(8, &[2], &[u64::MAX]).is_err());
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!(DataType::from_str("u16").unwrap(), DataType::U16);
        assert_eq!(DataType::Double.to_string(), "double");
        assert!(!DataType::String.is_numeric());
    }
}
