use thiserror::Error;

/// An error type for the core data structures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    /// The data length does not match the requested matrix shape.
    #[error("invalid shape: expected {expected} elements, got {actual}")]
    InvalidShape {
        /// Expected number of elements for the shape.
        expected: usize,
        /// Actual number of elements in the data.
        actual: usize,
    },

    /// A row index exceeds the matrix bounds.
    #[error("row index {index} out of bounds for {size} rows")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The number of rows available.
        size: usize,
    },

    /// Two matrices disagree on their column count.
    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColsMismatch {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns.
        actual: usize,
    },

    /// Two sequences that must be the same length are not.
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the left-hand sequence.
        left: usize,
        /// Length of the right-hand sequence.
        right: usize,
    },

    /// A pointer array must contain at least one entry and start at zero.
    #[error("pointer array must start with 0 and contain at least one entry")]
    InvalidPointerStart,

    /// A pointer array decreases at the given position.
    #[error("pointer array is not monotonically non-decreasing at position {position}")]
    NonMonotonicPointers {
        /// First position where the array decreases.
        position: usize,
    },

    /// The last pointer does not match the number of indexed elements.
    #[error("pointer total {pointer_total} does not match element count {elements}")]
    PointerElementMismatch {
        /// Value of the last pointer.
        pointer_total: usize,
        /// Number of elements being partitioned.
        elements: usize,
    },

    /// Group ids used to build a CSR index must be sorted.
    #[error("group ids are not sorted at position {position}")]
    UnsortedGroupIds {
        /// First position where the ordering breaks.
        position: usize,
    },

    /// A group id exceeds the declared number of groups.
    #[error("group id {id} out of bounds for {groups} groups")]
    GroupIdOutOfBounds {
        /// The offending group id.
        id: usize,
        /// The declared number of groups.
        groups: usize,
    },
}
