use crate::sys::RawStatus;

/// Status reported alongside every completion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum Status {
    /// The operation completed successfully
    Success = 0,
    /// A notifier had no completed tasks to hand out
    NoTaskReady = 1,
    /// The engine reported a failure
    Failure = 2,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl From<RawStatus> for Status {
    fn from(raw: RawStatus) -> Self {
        match raw.0 {
            0 => Status::Success,
            1 => Status::NoTaskReady,
            // Engines may report richer failure codes; they all collapse here.
            _ => Status::Failure,
        }
    }
}

impl From<Status> for RawStatus {
    fn from(status: Status) -> Self {
        RawStatus(status as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_raw_round_trip() {
        for status in Status::iter() {
            assert_eq!(Status::from(RawStatus::from(status)), status);
        }
    }

    #[test]
    fn test_unknown_codes_are_failures() {
        assert_eq!(Status::from(RawStatus(17)), Status::Failure);
        assert_eq!(Status::from(RawStatus(u32::MAX)), Status::Failure);
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::NoTaskReady.to_string(), "no_task_ready");
    }
}
