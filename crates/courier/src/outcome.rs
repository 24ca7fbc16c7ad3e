use crate::bridge::Bridge;
use crate::error::ResultAccessError;
use crate::handle::Resource;
use crate::status::Status;
use std::ffi::c_void;
use std::ptr::NonNull;

/// The value of a completed operation, or the status it failed with.
///
/// The crate never builds `Outcome::Status(Status::Success)`.
#[derive(Debug)]
#[must_use]
pub enum Outcome<T> {
    Value(T),
    Status(Status),
}

impl<T> Outcome<T> {
    /// `true` iff a value is held.
    pub fn ok(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// [`Status::Success`] if a value is held, otherwise the held status.
    pub fn status(&self) -> Status {
        match self {
            Outcome::Value(_) => Status::Success,
            Outcome::Status(status) => *status,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Status(_) => None,
        }
    }

    /// Consume the outcome and return its value.
    ///
    /// Check [`ok`](Self::ok) or [`status`](Self::status) first: an error here
    /// means the outcome was misused, not that the engine failed.
    pub fn into_value(self) -> Result<T, ResultAccessError> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Status(status) => Err(ResultAccessError { status }),
        }
    }

    pub fn into_result(self) -> Result<T, Status> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Status(status) => Err(status),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Value(value) => Outcome::Value(f(value)),
            Outcome::Status(status) => Outcome::Status(status),
        }
    }
}

impl<T: Resource> Outcome<T> {
    /// Build an outcome from what the engine handed to a completion.
    pub(crate) fn from_raw(bridge: &Bridge, result: *mut c_void, status: Status) -> Self {
        match (status, NonNull::new(result)) {
            // SAFETY: the engine hands over a live handle of the type the operation produces.
            (Status::Success, Some(raw)) => Outcome::Value(unsafe { T::from_raw(bridge, raw) }),
            (Status::Success, None) => {
                log::error!("Engine reported success without a result handle");
                Outcome::Status(Status::Failure)
            }
            (status, Some(raw)) => {
                log::warn!("Engine returned a handle with status {status}, releasing it");
                // SAFETY: as above; the wrapper releases it right away.
                drop(unsafe { T::from_raw(bridge, raw) });
                Outcome::Status(status)
            }
            (status, None) => Outcome::Status(status),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Status> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value() {
        let outcome = Outcome::Value(7);
        assert!(outcome.ok());
        assert_eq!(outcome.status(), Status::Success);
        assert_eq!(outcome.value(), Some(&7));
        assert_eq!(outcome.into_value().unwrap(), 7);
    }

    #[test]
    fn test_status() {
        let outcome = Outcome::<String>::Status(Status::Failure);
        assert!(!outcome.ok());
        assert_eq!(outcome.status(), Status::Failure);
        assert!(outcome.value().is_none());

        let err = outcome.into_value().unwrap_err();
        assert_eq!(err.status, Status::Failure);
        assert!(err.to_string().contains("failure"));
    }

    #[test]
    fn test_into_result_and_map() {
        let doubled = Outcome::Value(21).map(|v| v * 2);
        let result: Result<i32, Status> = doubled.into();
        assert_eq!(result, Ok(42));

        let failed = Outcome::<i32>::Status(Status::NoTaskReady).map(|v| v * 2);
        assert_eq!(failed.into_result(), Err(Status::NoTaskReady));
    }
}
