use crate::status::Status;
use crate::tensor::DataType;

/// Returned when the value of an unsuccessful [`Outcome`](crate::Outcome) is requested.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Tried to get a value from an unsuccessful result (status: {status})")]
pub struct ResultAccessError {
    pub status: Status,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Expected a {expected} tensor but found a {actual} tensor")]
    DataTypeMismatch { expected: DataType, actual: DataType },
    #[error("Index {index} is out of bounds for a tensor of {len} elements")]
    IndexOutOfBounds { index: u64, len: usize },
    #[error("Shape {shape:?} has more elements than fit in memory")]
    ShapeOverflow { shape: Vec<u64> },
    #[error("Strides {strides:?} do not describe a valid layout for shape {shape:?}")]
    InvalidStrides { shape: Vec<u64>, strides: Vec<u64> },
    #[error("The tensor's elements are not densely packed in row-major order")]
    NonContiguous,
    #[error("Expected {expected} elements but got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("The tensor was created by a different engine")]
    ForeignEngine,
    #[error("Engine rejected the operation with status {0}")]
    Engine(Status),
}
