use thiserror::Error;

/// Error raised when constructing or using a [`RateBucket`].
///
/// [`RateBucket`]: crate::RateBucket
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bucket was configured with values it cannot operate with, such as
    /// a zero capacity, rate or refill interval.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
    /// A request asked for more volume than the bucket can ever hold.
    ///
    /// Only returned by [`RateBucket::checked_get`].
    ///
    /// [`RateBucket::checked_get`]: crate::RateBucket::checked_get
    #[error("requested volume {requested} exceeds bucket capacity {capacity}")]
    InvalidRequest {
        /// The requested volume.
        requested: u64,
        /// The capacity of the bucket.
        capacity: u64,
    },
}
