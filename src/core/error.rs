use thiserror::Error;

/// Errors surfaced by the directory store.
///
/// The variants line up with the failure taxonomy in the design: most are
/// local and recoverable (a bad record, a duplicate key), a few are
/// pipeline-fatal and must propagate to the caller.
#[derive(Error, Debug)]
pub enum DirError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("index conflict on {index}: key {key:?} already maps to tag {existing}, new tag {incoming}")]
    IndexConflict {
        index: &'static str,
        key: String,
        existing: u64,
        incoming: u64,
    },

    #[error("deferred reference never resolved: {0}")]
    DeferredUnresolved(String),

    #[error("feed transient error: {0}")]
    FeedTransient(String),

    #[error("feed fatal error: {0}")]
    FeedFatal(String),

    #[error("incompatible snapshot layout: {0}")]
    SnapshotFormat(String),

    #[error("snapshot I/O error: {0}")]
    SnapshotIo(String),

    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DirError>;

impl<T> From<std::sync::PoisonError<T>> for DirError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<std::io::Error> for DirError {
    fn from(err: std::io::Error) -> Self {
        Self::SnapshotIo(err.to_string())
    }
}
