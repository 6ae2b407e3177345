pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An operation that needs a queue was handed none.
    #[error("queue is absent")]
    InvalidArgument,
    /// The allocator could not provide storage for an element or its payload.
    #[error("failed to allocate queue storage")]
    AllocationFailure,
}
