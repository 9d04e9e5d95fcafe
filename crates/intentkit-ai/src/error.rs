use std::path::PathBuf;

use intentkit_core::{ConfigError, ResourceError};
use intentkit_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model type {0:?}")]
    UnknownModelType(String),

    #[error("unknown feature extractor {0:?}")]
    UnknownFeature(String),

    #[error("invalid value for {name:?}: {message}")]
    InvalidParam { name: String, message: String },

    #[error("model has not been fitted")]
    NotFitted,

    #[error("model resources have not been initialized")]
    Uninitialized,

    #[error("got {queries} queries but {labels} labels")]
    LengthMismatch { queries: usize, labels: usize },

    #[error("model produced no output")]
    EmptyOutput,

    #[error("invalid model state: {0}")]
    State(#[from] serde_json::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("unable to load {classifier}: artifact at {path} cannot be read: {source}")]
    Load {
        classifier: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
