use thiserror::Error;

use crate::store::StoreKind;

#[derive(Error, Debug)]
pub enum GraphiteError {
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("Unsupported entity reference: {0} (unique keyword lookup is not implemented)")]
    UnsupportedReference(String),
    #[error("Attribute declaration is missing required field {field}")]
    MissingRequiredField { field: &'static str },
    #[error("Cannot clone a {from} store into a {to} store")]
    IncompatibleStoreKind { from: StoreKind, to: StoreKind },
    #[error("Bootstrap batch does not declare its own assert operation")]
    MissingBootstrapOperation,
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, GraphiteError>;

impl From<rusqlite::Error> for GraphiteError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<::config::ConfigError> for GraphiteError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
