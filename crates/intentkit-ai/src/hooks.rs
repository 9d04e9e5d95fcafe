//! Per-classifier-kind training hooks.
//!
//! A [`TrainingHooks`] implementation decides which labeled examples a
//! classifier trains on, what their labels are, and how the identity of that
//! training data is fingerprinted. [`DomainHooks`] classifies into domains;
//! [`IntentHooks`] classifies into the intents of a single domain.

use std::collections::BTreeMap;

use intentkit_core::config::ParamSelection;
use intentkit_core::digest::{self, Fingerprint};
use intentkit_core::query_tree::{build_query_tree, build_raw_query_tree};
use intentkit_core::{
    ClassifierConfig, FeatureSpec, ProcessedQuery, QueryTree, ResourceError, ResourceLoader,
};
use serde_json::{json, Map, Value};

pub trait TrainingHooks: Send + Sync {
    /// Classifier name used in logs, errors and `Display`.
    const NAME: &'static str;

    fn default_config(&self) -> ClassifierConfig;

    /// Whether an example belongs to this classifier's training data.
    fn accepts(&self, query: &ProcessedQuery) -> bool;

    /// The label this classifier learns for an example.
    fn label(&self, query: &ProcessedQuery) -> String;

    /// Distinguishes this classifier's data digest from other classifiers
    /// trained on the same label set.
    fn scope(&self) -> String;

    /// The accepted examples: `queries` when given, otherwise the loader's
    /// `label_set`.
    fn examples(
        &self,
        loader: &dyn ResourceLoader,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<Vec<ProcessedQuery>, ResourceError> {
        let all = match queries {
            Some(queries) => queries.to_vec(),
            None => loader.get_labeled_queries(label_set)?,
        };
        Ok(all.into_iter().filter(|q| self.accepts(q)).collect())
    }

    fn query_tree(
        &self,
        loader: &dyn ResourceLoader,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<QueryTree<ProcessedQuery>, ResourceError> {
        Ok(build_query_tree(&self.examples(loader, queries, label_set)?))
    }

    /// Like [`query_tree`](TrainingHooks::query_tree) with examples rendered
    /// as markup.
    fn raw_query_tree(
        &self,
        loader: &dyn ResourceLoader,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<QueryTree<String>, ResourceError> {
        Ok(build_raw_query_tree(&self.examples(loader, queries, label_set)?))
    }

    fn queries_and_labels(
        &self,
        loader: &dyn ResourceLoader,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<(Vec<ProcessedQuery>, Vec<String>), ResourceError> {
        let examples = self.examples(loader, queries, label_set)?;
        let labels = examples.iter().map(|q| self.label(q)).collect();
        Ok((examples, labels))
    }

    /// Data-identity digest. Explicit queries are hashed by content; a label
    /// set is hashed through the loader without loading its examples, so
    /// edits outside this classifier's scope still change the digest.
    fn queries_and_labels_hash(
        &self,
        loader: &dyn ResourceLoader,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<String, ResourceError> {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.scope());
        fp.update(b"\0");
        match queries {
            Some(queries) => {
                let pairs = queries
                    .iter()
                    .filter(|q| self.accepts(q))
                    .map(|q| (q.query.text.as_str(), self.label(q)));
                fp.update_str(&digest::content_digest(pairs));
            }
            None => fp.update_str(&loader.hash_labeled_queries(label_set)?),
        }
        Ok(fp.hex())
    }
}

/// Top-level classifier: every example, labeled by domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainHooks;

impl TrainingHooks for DomainHooks {
    const NAME: &'static str = "DomainClassifier";

    fn default_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            model_type: "logreg".into(),
            features: BTreeMap::from([("bag-of-words".into(), params(json!({"lengths": [1, 2]})))]),
            model_settings: None,
            params: None,
            param_selection: Some(ParamSelection {
                search_type: Some("k-fold".into()),
                k: Some(10),
                grid: Some(object(json!({"C": [10, 100, 1000]}))),
                ..Default::default()
            }),
        }
    }

    fn accepts(&self, _query: &ProcessedQuery) -> bool {
        true
    }

    fn label(&self, query: &ProcessedQuery) -> String {
        query.domain.clone()
    }

    fn scope(&self) -> String {
        "domain".into()
    }
}

/// Per-domain classifier: examples of one domain, labeled by intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentHooks {
    pub domain: String,
}

impl IntentHooks {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl TrainingHooks for IntentHooks {
    const NAME: &'static str = "IntentClassifier";

    fn default_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            model_type: "logreg".into(),
            features: BTreeMap::from([
                ("bag-of-words".into(), params(json!({"lengths": [1]}))),
                ("length".into(), FeatureSpec::empty()),
            ]),
            model_settings: None,
            params: Some(object(json!({"C": 10}))),
            param_selection: None,
        }
    }

    fn accepts(&self, query: &ProcessedQuery) -> bool {
        query.domain == self.domain
    }

    fn label(&self, query: &ProcessedQuery) -> String {
        query.intent.clone()
    }

    fn scope(&self) -> String {
        format!("intent/{}", self.domain)
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn params(value: Value) -> FeatureSpec {
    FeatureSpec::Params(object(value))
}
