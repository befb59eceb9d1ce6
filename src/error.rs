use derive_more::{Display, Error};

/// Errors surfaced by [`LockRegistry`](crate::LockRegistry) construction and name resolution.
///
/// Blocking in the reader-writer protocol is never an error.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[display("Invalid resource name: length {len} is outside 1..={max}")]
    InvalidName { len: usize, max: usize },

    #[display("Registry capacity must be at least one bucket")]
    InvalidCapacity,

    #[display("Failed to allocate {buckets} buckets")]
    AllocationFailure { buckets: usize },

    #[display("Resource {_0:?} is already registered")]
    DuplicateName(#[error(not(source))] String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
