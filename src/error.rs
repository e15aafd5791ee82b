//! Fatal error taxonomy for one watch run.
//!
//! Every variant aborts the run; nothing is retried here. Recurrence is the
//! job of whatever scheduler re-invokes the binary.

/// Why a run ended in the failed state.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("snapshot storage: {0}")]
    Storage(String),
}

impl WatchError {
    /// Stable short label, used on the diagnostic line and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::Fetch(_) => "fetch",
            Self::Extraction(_) => "extraction",
            Self::Storage(_) => "storage",
        }
    }

    /// Process exit status for this failure. All failures share one code.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// One-line diagnostic as printed on stderr.
    pub fn diagnostic(&self) -> String {
        format!("error[{}]: {}", self.kind(), self)
    }

    pub(crate) fn storage(ctx: &str, e: std::io::Error) -> Self {
        Self::Storage(format!("{ctx}: {e}"))
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
