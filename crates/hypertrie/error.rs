use thiserror::Error;

use crate::config::MAX_DEPTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HypertrieError {
    #[error("Wrong key length: expected {expected}, got {actual}")]
    WrongKeyLength { expected: usize, actual: usize },
    #[error("Depth {0} is outside of the supported range 1..={max}", max = MAX_DEPTH)]
    DepthOutOfRange(usize),
    #[error("Depth {depth} exceeds the context maximum depth {max_depth}")]
    DepthExceedsContext { depth: usize, max_depth: usize },
    #[error("Invalid diagonal positions {positions:?} for a hypertrie of depth {depth}")]
    InvalidDiagonalPositions { positions: Vec<usize>, depth: usize },
    #[error("Slice key has {actual} positions, the hypertrie has depth {expected}")]
    WrongSliceKeyLength { expected: usize, actual: usize },
    #[error("Lock Error: Panicked when trying to acquire a lock")]
    LockError,
    #[error("Inconsistent node storage: {0}")]
    InconsistentStorage(String),
    #[error("Bulk worker stopped before the request could be served")]
    BulkWorkerStopped,
    #[error("Bulk worker panicked")]
    BulkWorkerPanicked,
}
