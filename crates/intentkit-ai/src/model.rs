//! The model abstraction classifiers delegate to, plus the pieces the
//! built-in models share: parameter resolution, the feature vocabulary and
//! label indexing.

use std::collections::{BTreeMap, BTreeSet};

use intentkit_core::{FeatureVector, ModelConfig, Query, ResourceLoader, ResourceSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::evaluation::ModelEvaluation;
use crate::features::Featurizer;
use crate::ModelError;

/// A trainable text classifier.
///
/// Lifecycle: built from a [`ModelConfig`] by the registry, then
/// [`initialize_resources`](Model::initialize_resources), then either
/// [`fit`](Model::fit) or [`restore_state`](Model::restore_state).
pub trait Model: Send + Sync {
    fn config(&self) -> &ModelConfig;

    fn required_resources(&self) -> BTreeSet<String> {
        self.config().required_resources()
    }

    /// Load the resources the feature extractors need. `training` is the
    /// example set when called before a fit, `None` when restoring.
    fn initialize_resources(
        &mut self,
        loader: &dyn ResourceLoader,
        training: Option<&[Query]>,
    ) -> Result<(), ModelError>;

    fn fit(&mut self, queries: &[Query], labels: &[String]) -> Result<(), ModelError>;

    fn predict(&self, queries: &[Query]) -> Result<Vec<String>, ModelError>;

    /// One `(label, probability)` row per query, covering every known label.
    fn predict_proba(&self, queries: &[Query]) -> Result<Vec<Vec<(String, f64)>>, ModelError>;

    fn evaluate(&self, queries: &[Query], labels: &[String]) -> Result<ModelEvaluation, ModelError> {
        check_lengths(queries, labels)?;
        let predicted = self.predict(queries)?;
        Ok(ModelEvaluation::new(queries, labels, predicted))
    }

    /// Fitted state, persisted inside the artifact envelope.
    fn dump_state(&self) -> Result<Value, ModelError>;

    fn restore_state(&mut self, state: Value) -> Result<(), ModelError>;
}

pub(crate) fn check_lengths(queries: &[Query], labels: &[String]) -> Result<(), ModelError> {
    if queries.len() != labels.len() {
        return Err(ModelError::LengthMismatch {
            queries: queries.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

/// Fetch every resource the configuration requires and build the featurizer.
pub(crate) fn build_featurizer(
    config: &ModelConfig,
    loader: &dyn ResourceLoader,
    training: Option<&[Query]>,
) -> Result<Featurizer, ModelError> {
    let mut resources = ResourceSet::new();
    for name in config.required_resources() {
        let resource = loader.feature_resource(&name)?;
        resources.insert(name, resource);
    }
    debug!(
        model_type = %config.model_type,
        resources = resources.len(),
        examples = training.map_or(0, |t| t.len()),
        "initialized resources"
    );
    Featurizer::build(&config.features, resources)
}

// ── Hyperparameters ──

/// The hyperparameters a model trains with.
///
/// Explicit `params` win. Otherwise the first candidate of every axis of
/// `param_selection.grid` is used.
pub fn resolve_params(config: &ModelConfig) -> Map<String, Value> {
    if let Some(params) = &config.params {
        return params.clone();
    }
    let Some(grid) = config.param_selection.as_ref().and_then(|s| s.grid.as_ref()) else {
        return Map::new();
    };
    let params: Map<String, Value> = grid
        .iter()
        .filter_map(|(name, candidates)| {
            let first = match candidates {
                Value::Array(values) => values.first()?.clone(),
                other => other.clone(),
            };
            Some((name.clone(), first))
        })
        .collect();
    let shown = Value::Object(params.clone());
    info!(
        model_type = %config.model_type,
        params = %shown,
        "no explicit params, using first grid candidates"
    );
    params
}

pub(crate) fn param_f64(params: &Map<String, Value>, name: &str, default: f64) -> Result<f64, ModelError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => match v.as_f64() {
            Some(x) if x.is_finite() && x > 0.0 => Ok(x),
            _ => Err(ModelError::InvalidParam {
                name: name.to_string(),
                message: format!("expected a positive number, got {v}"),
            }),
        },
    }
}

pub(crate) fn param_usize(params: &Map<String, Value>, name: &str, default: usize) -> Result<usize, ModelError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| ModelError::InvalidParam {
                name: name.to_string(),
                message: format!("expected a non-negative integer, got {v}"),
            }),
    }
}

// ── Vocabulary ──

/// Feature-name → column index, fixed at fit time. Names unseen during
/// training are dropped at prediction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub(crate) struct Vocabulary {
    index: BTreeMap<String, usize>,
}

impl Vocabulary {
    pub fn fit(vectors: &[FeatureVector]) -> Self {
        let names: BTreeSet<&String> = vectors.iter().flat_map(|v| v.keys()).collect();
        let index = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { index }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn sparse(&self, vector: &FeatureVector) -> Vec<(usize, f64)> {
        vector
            .iter()
            .filter_map(|(name, &value)| self.index.get(name).map(|&i| (i, value)))
            .collect()
    }

    pub fn dense(&self, vector: &FeatureVector) -> Vec<f64> {
        let mut out = vec![0.0; self.len()];
        for (i, value) in self.sparse(vector) {
            out[i] = value;
        }
        out
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut index = BTreeMap::new();
        for (i, name) in names.into_iter().enumerate() {
            if index.contains_key(&name) {
                return Err(format!("duplicate vocabulary entry {name:?}"));
            }
            index.insert(name, i);
        }
        Ok(Self { index })
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        let mut names: Vec<(String, usize)> = vocab.index.into_iter().collect();
        names.sort_by_key(|(_, i)| *i);
        names.into_iter().map(|(n, _)| n).collect()
    }
}

/// Sorted distinct labels and each example's index into them.
pub(crate) fn index_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let classes: Vec<String> = labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let targets = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_default())
        .collect();
    (classes, targets)
}

/// Numerically stable softmax, in place.
pub(crate) fn softmax(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    if sum > 0.0 {
        for s in scores.iter_mut() {
            *s /= sum;
        }
    }
}

/// Index of the highest score; ties go to the lowest index.
pub(crate) fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentkit_core::{ClassifierConfig, ConfigFields};

    fn model_config(json: &str) -> ModelConfig {
        let config = ClassifierConfig::new(ConfigFields::from_json(json).unwrap()).unwrap();
        ModelConfig::from_classifier_config(&config, "query", "class")
    }

    #[test]
    fn explicit_params_win_over_grid() {
        let config = model_config(
            r#"{"model_type": "logreg", "features": {}, "params": {"C": 3},
                "param_selection": {"type": "k-fold", "grid": {"C": [10, 100]}}}"#,
        );
        assert_eq!(resolve_params(&config)["C"], 3);
    }

    #[test]
    fn grid_resolves_to_first_candidates() {
        let config = model_config(
            r#"{"model_type": "logreg", "features": {},
                "param_selection": {"type": "k-fold", "k": 5, "grid": {"C": [10, 100], "max_iter": 50}}}"#,
        );
        let params = resolve_params(&config);
        assert_eq!(params["C"], 10);
        assert_eq!(params["max_iter"], 50);
    }

    #[test]
    fn param_parsing() {
        let params: Map<String, Value> = serde_json::from_str(r#"{"C": 0.5, "max_iter": 7, "bad": -1}"#).unwrap();
        assert_eq!(param_f64(&params, "C", 1.0).unwrap(), 0.5);
        assert_eq!(param_f64(&params, "missing", 1.0).unwrap(), 1.0);
        assert!(param_f64(&params, "bad", 1.0).is_err());
        assert_eq!(param_usize(&params, "max_iter", 100).unwrap(), 7);
        assert!(param_usize(&params, "bad", 100).is_err());
    }

    #[test]
    fn vocabulary_roundtrips_through_names() {
        let vectors = vec![
            FeatureVector::from([("b".to_string(), 1.0), ("a".to_string(), 2.0)]),
            FeatureVector::from([("c".to_string(), 1.0)]),
        ];
        let vocab = Vocabulary::fit(&vectors);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.dense(&vectors[0]), vec![2.0, 1.0, 0.0]);

        let unseen = FeatureVector::from([("z".to_string(), 1.0), ("c".to_string(), 4.0)]);
        assert_eq!(vocab.sparse(&unseen), vec![(2, 4.0)]);

        let json = serde_json::to_value(&vocab).unwrap();
        assert_eq!(json, serde_json::json!(["a", "b", "c"]));
        let back: Vocabulary = serde_json::from_value(json).unwrap();
        assert_eq!(back, vocab);
    }

    #[test]
    fn vocabulary_rejects_duplicate_names() {
        let err = serde_json::from_value::<Vocabulary>(serde_json::json!(["a", "b", "a"])).unwrap_err();
        assert!(err.to_string().contains("duplicate vocabulary entry"), "{err}");
    }

    #[test]
    fn labels_are_indexed_in_sorted_order() {
        let labels: Vec<String> = ["travel", "music", "travel"].map(String::from).to_vec();
        let (classes, targets) = index_labels(&labels);
        assert_eq!(classes, vec!["music", "travel"]);
        assert_eq!(targets, vec![1, 0, 1]);
    }

    #[test]
    fn softmax_and_argmax() {
        let mut scores = vec![1.0, 1.0, 1.0];
        softmax(&mut scores);
        assert!(scores.iter().all(|p| (p - 1.0 / 3.0).abs() < 1e-12));
        assert_eq!(argmax(&scores), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
    }
}
