//! Resource loading: labeled query sets and the auxiliary lexical resources
//! feature extractors depend on.
//!
//! [`ResourceLoader`] is shared between classifiers (one per domain plus the
//! domain classifier itself), so implementations must be `Send + Sync` and
//! safe for concurrent reads.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::{self, Fingerprint};
use crate::markup::MarkupError;
use crate::query::{normalize, ProcessedQuery, Query};

/// Resource name for entity gazetteers.
pub const GAZETTEERS: &str = "gazetteers";
/// Resource name for the word frequency table.
pub const WORD_FREQ: &str = "word_freq";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unknown resource {0:?}")]
    UnknownResource(String),

    #[error("no labeled queries for label set {0:?}")]
    UnknownLabelSet(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {source}")]
    Markup {
        path: PathBuf,
        line: usize,
        #[source]
        source: MarkupError,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// An auxiliary lexical resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// entity type → normalized phrases
    Gazetteer(BTreeMap<String, BTreeSet<String>>),
    /// normalized word → corpus count
    WordFreq(BTreeMap<String, u64>),
}

impl Resource {
    /// Content digest over the resource's canonical JSON form.
    pub fn digest(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        digest::hex_digest(json.as_bytes())
    }
}

/// Initialized resources, keyed by resource name.
pub type ResourceSet = BTreeMap<String, Resource>;

/// Supplies labeled queries and feature resources to classifiers.
pub trait ResourceLoader: Send + Sync {
    /// Build a query from raw text.
    fn create_query(&self, text: &str) -> Query {
        Query::new(text)
    }

    /// All labeled queries of a label set (e.g. `train`, `test`).
    fn get_labeled_queries(&self, label_set: &str) -> Result<Vec<ProcessedQuery>, ResourceError>;

    /// Identity digest of a label set's contents.
    fn hash_labeled_queries(&self, label_set: &str) -> Result<String, ResourceError> {
        let queries = self.get_labeled_queries(label_set)?;
        let mut fp = Fingerprint::new();
        fp.update_str(label_set);
        fp.update_str(&digest::content_digest(queries.iter().map(|q| {
            (q.query.text.as_str(), format!("{}/{}", q.domain, q.intent))
        })));
        Ok(fp.hex())
    }

    fn feature_resource(&self, name: &str) -> Result<Resource, ResourceError>;

    /// Content digest of a feature resource.
    fn hash_feature_resource(&self, name: &str) -> Result<String, ResourceError> {
        Ok(self.feature_resource(name)?.digest())
    }
}

/// Loader backed by in-memory label sets and resources.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    label_sets: BTreeMap<String, Vec<ProcessedQuery>>,
    resources: ResourceSet,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label_set(mut self, name: &str, queries: Vec<ProcessedQuery>) -> Self {
        self.label_sets.insert(name.to_string(), queries);
        self
    }

    /// Add phrases to the gazetteer of one entity type.
    pub fn with_gazetteer<'a>(
        mut self,
        entity_type: &str,
        phrases: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let entry = self
            .resources
            .entry(GAZETTEERS.to_string())
            .or_insert_with(|| Resource::Gazetteer(BTreeMap::new()));
        if let Resource::Gazetteer(gazetteers) = entry {
            gazetteers
                .entry(entity_type.to_string())
                .or_default()
                .extend(phrases.into_iter().map(normalize));
        }
        self
    }

    pub fn with_word_freq<'a>(mut self, counts: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        let table = counts
            .into_iter()
            .map(|(word, count)| (normalize(word), count))
            .collect();
        self.resources
            .insert(WORD_FREQ.to_string(), Resource::WordFreq(table));
        self
    }
}

impl ResourceLoader for MemoryLoader {
    fn get_labeled_queries(&self, label_set: &str) -> Result<Vec<ProcessedQuery>, ResourceError> {
        self.label_sets
            .get(label_set)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownLabelSet(label_set.to_string()))
    }

    fn feature_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownResource(name.to_string()))
    }
}
