use thiserror::Error;

use crate::config::ConfigError;
use crate::dns::name::DomainName;
use crate::keys::extract::KeyExtractionError;
use crate::keys::store::KeyStoreError;
use crate::resolver::ResolveError;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Resolver error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("Key extraction error: {0}")]
    KeyExtraction(#[from] KeyExtractionError),

    #[error("Chain construction failed at {zone}: {reason}")]
    ChainConstructionFailed { zone: DomainName, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<crate::dns::NameError> for Error {
    fn from(err: crate::dns::NameError) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

impl From<crate::dns::enums::UnknownMnemonic> for Error {
    fn from(err: crate::dns::enums::UnknownMnemonic) -> Self {
        Error::MalformedInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
