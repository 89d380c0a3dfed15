use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid source key: {0}")]
    InvalidSourceKey(String),
    #[error("invalid unit stem: {0}")]
    InvalidUnitStem(String),
}
