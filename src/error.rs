pub type CineforgeResult<T> = Result<T, CineforgeError>;

#[derive(thiserror::Error, Debug)]
pub enum CineforgeError {
    /// The external transcoder binary is missing or failed to launch.
    #[error("spawn error: {0}")]
    Spawn(String),

    /// The byte-level contract with the transcoder was violated: short read,
    /// unexpected byte count, or a frame of the wrong dimensions.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transcoder exited with a non-zero status or was killed.
    #[error("process exit error: {0}")]
    ProcessExit(String),

    /// A timestamp or time window outside the valid range.
    #[error("range error: {0}")]
    Range(String),

    /// Operation on a closed or never-opened resource.
    #[error("state error: {0}")]
    State(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CineforgeError {
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn process_exit(msg: impl Into<String>) -> Self {
        Self::ProcessExit(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
