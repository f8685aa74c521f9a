use std::path::PathBuf;

use keel_types::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeelError {
    #[error("persistence manager is not open")]
    NotOpen,

    #[error("persistence manager is already open")]
    AlreadyOpen,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("id error: {0}")]
    Id(#[from] keel_ids::IdError),

    #[error("dictionary error: {0}")]
    Dictionary(#[from] keel_dictionary::DictionaryError),

    #[error("registry error: {0}")]
    Registry(#[from] keel_registry::RegistryError),

    #[error("handler error: {0}")]
    Handler(#[from] keel_handler::HandlerError),

    #[error("storer error: {0}")]
    Storer(#[from] keel_storer::StorerError),
}

impl KeelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotOpen | Self::AlreadyOpen => ErrorKind::InvalidArgument,
            Self::Io { .. } => ErrorKind::TransferFailure,
            Self::Config(_) => ErrorKind::ParseError,
            Self::Id(e) => e.kind(),
            Self::Dictionary(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Handler(e) => e.kind(),
            Self::Storer(e) => e.kind(),
        }
    }
}

pub type KeelResult<T> = Result<T, KeelError>;
