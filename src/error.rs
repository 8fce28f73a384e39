pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("kernel compile error: {0}")]
    Compile(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("execution queue closed: {0}")]
    QueueClosed(String),

    #[error("invalid queue transition: {event} in state {from}")]
    InvalidTransition { from: String, event: String },

    #[error("unknown configuration: {0}")]
    UnknownConfiguration(String),

    #[error("no configuration loaded")]
    NoConfiguration,

    #[error("model underflow for kernel {kernel}: {samples} usable samples")]
    ModelUnderflow { kernel: String, samples: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn compile<S: Into<String>>(msg: S) -> Self {
        Error::Compile(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        Error::Device(msg.into())
    }

    pub fn queue_closed<S: Into<String>>(kernel: S) -> Self {
        Error::QueueClosed(kernel.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn underflow<S: Into<String>>(kernel: S, samples: usize) -> Self {
        Error::ModelUnderflow {
            kernel: kernel.into(),
            samples,
        }
    }

    /// Whether the error came from the device rather than from the caller.
    pub fn is_device(&self) -> bool {
        matches!(self, Error::Device(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
