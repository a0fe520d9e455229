/// Error type flowing from adapters to the scan manager.
///
/// `Cancelled` and `TimedOut` are control flow, not faults: the manager
/// maps them to the `cancelled` / `failed` terminal states respectively.
/// Everything else is a fatal adapter error that terminates the scan as
/// `failed` with the message preserved on the row.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled,

    #[error("scan deadline exceeded after {0}s")]
    TimedOut(u64),

    #[error("config: {0}")]
    Config(String),

    #[error("tool: {0}")]
    Tool(String),

    #[error("parse: {0}")]
    Parse(String),

    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
