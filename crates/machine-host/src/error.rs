#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("machine {0} already exists")]
    AlreadyExists(String),

    #[error("machine {0} does not exist")]
    NotFound(String),

    #[error("invalid machine name {0:?}")]
    InvalidName(String),

    #[error("invalid option {0:?}, expected key=value")]
    InvalidOption(String),

    #[error("driver error: {0}")]
    Driver(#[from] machine_driver::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
