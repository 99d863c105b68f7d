use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid format options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
    #[error("printWidth must be greater than zero")]
    InvalidPrintWidth,
    #[error("tabWidth must be greater than zero")]
    InvalidTabWidth,
}
