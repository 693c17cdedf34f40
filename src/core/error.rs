use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{op}() failed: {source}")]
    Socket {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Parse error: {message}")]
    Parse { message: String },
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wraps the last OS error raised by the named syscall
    pub fn last_os_error(op: &'static str) -> Self {
        Self::Socket {
            op,
            source: std::io::Error::last_os_error(),
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Socket { .. } => "socket",
            Self::Io(_) => "io",
            Self::Thread(_) => "thread",
            Self::Parse { .. } => "parse",
        }
    }
}
