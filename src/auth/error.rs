use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read key file {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Key file {} contains no key material", path.display())]
    EmptyKey { path: PathBuf },

    #[error("Key file {} already exists", path.display())]
    KeyFileExists { path: PathBuf },

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
