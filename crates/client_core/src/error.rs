use shared::error::ResponseValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("solver returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("solver response was not valid JSON: {0}")]
    Decode(String),
    #[error(transparent)]
    InvalidResponse(#[from] ResponseValidationError),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("tech tree request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tech tree document is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildFileError {
    #[error("build file is empty")]
    Empty,
    #[error("build file is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("build file is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("build file structure is invalid: {0}")]
    InvalidStructure(String),
    #[error("build file checksum does not match its contents")]
    ChecksumMismatch,
    #[error("build file targets unsupported platform '{0}'")]
    UnsupportedPlatform(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("shared grid payload is malformed: {0}")]
    Malformed(String),
    #[error("'{0}' cannot be written into a share link")]
    UnencodableName(String),
    #[error("share links hold at most {0} distinct techs or modules")]
    TooManyNames(usize),
    #[error("invalid share base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
