use thiserror::Error as ThisError;

/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, PartialEq, ThisError)]
pub enum Error<K>
where
    K: Clone + Ord,
{
    /// Returned by min(), max(), floor(), ceiling(), delete_min() and
    /// delete_max() when the table holds no entries.
    #[error("operation on an empty table")]
    EmptyTable,
    /// Returned by floor() and ceiling() when no key qualifies.
    #[error("no key satisfies the query")]
    NoSuchKey,
    /// Returned by select() when the requested rank is not in
    /// `0..len()`.
    #[error("rank {0} out of range")]
    InvalidRank(usize),
    /// Returned by create() when the key is already present.
    #[error("key already present")]
    OverwriteKey,
    /// Fatal case, breaking one of the LLRB rules.
    #[error("consecutive red links on a left path")]
    ConsecutiveReds,
    /// Fatal case, breaking one of the LLRB rules.
    #[error("red link leaning right")]
    RightLeaningRed,
    /// Fatal case, breaking one of the LLRB rules. The String
    /// component of this variant can be used for debugging.
    #[error("unbalanced blacks, {0}")]
    UnbalancedBlacks(String),
    /// Fatal case, table entries are not in sort-order.
    #[error("keys out of sort order")]
    SortError(K, K),
    /// Fatal case, a node's cached subtree size disagrees with its
    /// children.
    #[error("subtree size mismatch, {0}")]
    SizeMismatch(String),
    /// Fatal case, rank() and select() disagree with each other.
    #[error("rank/select mismatch, {0}")]
    InconsistentRank(String),
}
