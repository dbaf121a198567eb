use core::fmt;

/// Failures a runtime or policy can report from the non-hook entry points
/// (`init`, queue management). Scheduling hooks themselves never fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedError {
    /// A dispatch queue with this id is already registered.
    DsqExists(u64),
    /// The runtime refuses to create more dispatch queues.
    DsqLimit,
    DsqNotFound(u64),
}

pub type SchedResult<T> = Result<T, SchedError>;

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::DsqExists(id) => write!(f, "dispatch queue {} already exists", id),
            SchedError::DsqLimit => f.write_str("dispatch queue limit reached"),
            SchedError::DsqNotFound(id) => write!(f, "dispatch queue {} not found", id),
        }
    }
}
