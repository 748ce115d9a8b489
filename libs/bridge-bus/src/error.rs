#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("subscriber lagged, {0} messages skipped")]
    Lagged(u64),

    #[error("service '{0}' not found")]
    ServiceNotFound(String),

    #[error("service '{service}': {detail}")]
    Service { service: String, detail: String },
}

impl BusError {
    /// Whether the underlying connection is unusable after this error.
    ///
    /// A bad envelope leaves the byte stream aligned on the next frame, so
    /// the connection can be reused. Anything at the framing or socket level
    /// cannot.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            BusError::Connect { .. }
                | BusError::Io(_)
                | BusError::FrameTooLarge { .. }
                | BusError::Closed
        )
    }
}
