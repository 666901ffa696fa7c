/// Convenience result type used across lottiereel.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy for the render pipeline and the job scheduler.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Malformed payload or missing rate/dimension metadata.
    #[error("invalid animation: {0}")]
    InvalidAnimation(String),

    /// The rasterizer rejected the payload or never became ready.
    #[error("renderer init error: {0}")]
    RendererInit(String),

    /// A prepared rasterizer failed to draw a frame.
    #[error("render error: {0}")]
    Render(String),

    /// One parallel render unit failed; the whole pipeline was aborted.
    #[error("worker {worker} failed: {source}")]
    WorkerFailure {
        /// Zero-based worker identity.
        worker: usize,
        /// Underlying cause reported by the worker.
        #[source]
        source: Box<ReelError>,
    },

    /// The encoder could not be spawned, broke its pipe, or exited non-zero.
    #[error("encoding failure: {detail}")]
    EncodingFailure {
        /// Encoder exit code, when the process ran to completion.
        exit_code: Option<i32>,
        /// Human-readable detail (OS error or exit status).
        detail: String,
    },

    /// The job exists but is not in a state that allows the operation.
    #[error("job not ready: {0}")]
    NotReady(String),

    /// No job with the given identity.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Invalid caller-provided options.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::InvalidAnimation`] value.
    pub fn invalid_animation(msg: impl Into<String>) -> Self {
        Self::InvalidAnimation(msg.into())
    }

    /// Build a [`ReelError::RendererInit`] value.
    pub fn renderer_init(msg: impl Into<String>) -> Self {
        Self::RendererInit(msg.into())
    }

    /// Build a [`ReelError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Wrap `source` as the failure of render unit `worker`.
    pub fn worker_failure(worker: usize, source: ReelError) -> Self {
        Self::WorkerFailure {
            worker,
            source: Box::new(source),
        }
    }

    /// Build a [`ReelError::EncodingFailure`] value.
    pub fn encoding(exit_code: Option<i32>, detail: impl Into<String>) -> Self {
        Self::EncodingFailure {
            exit_code,
            detail: detail.into(),
        }
    }

    /// Build a [`ReelError::NotReady`] value.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Build a [`ReelError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Return `true` for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAnimation(_) | Self::Validation(_) | Self::NotReady(_) | Self::NotFound(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
