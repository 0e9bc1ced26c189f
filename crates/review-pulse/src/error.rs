use pulse_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("bucket catalog misconfigured: {0}")]
    Catalog(String),

    #[error("bucket embedding snapshot error: {0}")]
    Snapshot(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("email error: {0}")]
    Email(String),
}
