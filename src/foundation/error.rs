pub type CircleFitResult<T> = Result<T, CircleFitError>;

#[derive(thiserror::Error, Debug)]
pub enum CircleFitError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend not implemented: {0}")]
    BackendNotImplemented(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("gpu error: {0}")]
    Gpu(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CircleFitError {
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend(name.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn backend_not_implemented(name: impl Into<String>) -> Self {
        Self::BackendNotImplemented(name.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu(msg.into())
    }
}
