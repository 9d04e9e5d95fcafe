//! Core types for intentkit: queries, classifier configuration, query
//! grouping and the training-cache digest.

pub mod config;
pub mod digest;
pub mod markup;
pub mod query;
pub mod query_tree;
pub mod resource;

pub use config::{
    ClassifierConfig, ConfigError, ConfigFields, CustomExtractor, FeatureSpec, FeatureVector,
    ModelConfig, ParamSelection,
};
pub use digest::{content_digest, model_digest, Fingerprint};
pub use query::{Entity, ProcessedQuery, Query, QueryInput};
pub use query_tree::{build_query_tree, build_raw_query_tree, QueryTree};
pub use resource::{MemoryLoader, Resource, ResourceError, ResourceLoader, ResourceSet};
