use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpaperError>;

#[derive(Error, Debug)]
pub enum EpaperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid month label: {0}")]
    MonthLabel(String),
}
