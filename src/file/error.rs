use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid file id '{0}'")]
    InvalidId(String),

    #[error("no files were found for file id '{0}'")]
    NotFound(String),

    #[error("invalid file name '{0}'")]
    InvalidFileName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
