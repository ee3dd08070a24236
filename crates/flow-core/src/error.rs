//! Error types shared by every stream component.

/// Error raised by a release callback while a subscription is being closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeardownError {
    #[error("Teardown failed: {0}")]
    Failed(String),
}

impl TeardownError {
    /// Create a teardown failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Error type for stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Invalid input detected before anything was scheduled.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value-producing source failed during its lifetime.
    #[error("Source error: {0}")]
    Source(#[from] anyhow::Error),

    /// Releasing a resource failed.
    #[error("Teardown error: {0}")]
    Teardown(#[from] TeardownError),
}

impl StreamError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap any error raised by a source.
    pub fn from_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(anyhow::Error::new(err))
    }

    /// Create a source error from a plain message.
    pub fn source_msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Source(anyhow::Error::msg(message))
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
