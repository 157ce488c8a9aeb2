//! Error types for subtree construction, encoding and storage

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// A caller broke an invariant of the availability model (bad lengths,
    /// wrong number of merge inputs, mismatched level counts).
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Level {level} is not the root of a subtree")]
    NotRankRoot { level: u32 },

    #[error("Subtree format error: {0}")]
    Format(String),

    /// Existence oracle or blob cache failure.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// True for errors caused by a programming mistake rather than a runtime
    /// failure of the oracle, the cache, or the input bytes.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_) | Error::NotRankRoot { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(Error::precondition("bad").is_precondition());
        assert!(Error::NotRankRoot { level: 3 }.is_precondition());
        assert!(!Error::format("bad magic").is_precondition());
        assert!(!Error::storage("db down").is_precondition());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotRankRoot { level: 5 };
        assert_eq!(err.to_string(), "Level 5 is not the root of a subtree");
    }
}
