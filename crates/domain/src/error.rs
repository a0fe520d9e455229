/// Shared error type used across all Argus crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unknown scan type '{scan_type}' for service '{service}'")]
    UnknownScanType { service: String, scan_type: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
