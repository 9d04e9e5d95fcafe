//! Multinomial logistic regression over sparse text features.
//!
//! Trained by full-batch gradient descent from zero weights, so a fit is
//! fully deterministic. Hyperparameters:
//!
//! | param           | default | meaning                              |
//! |-----------------|---------|--------------------------------------|
//! | `C`             | 1.0     | inverse L2 regularization strength   |
//! | `max_iter`      | 200     | gradient steps                       |
//! | `learning_rate` | 1.0     | step size                            |

use intentkit_core::{ModelConfig, Query, ResourceLoader};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::features::Featurizer;
use crate::model::{self, Model, Vocabulary};
use crate::ModelError;

pub const MODEL_TYPE: &str = "logreg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogRegState {
    classes: Vec<String>,
    vocabulary: Vocabulary,
    /// `classes.len()` rows of `vocabulary.len()` weights.
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LogRegState {
    fn probabilities(&self, x: &[(usize, f64)]) -> Vec<f64> {
        let mut scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| b + x.iter().map(|&(j, v)| w[j] * v).sum::<f64>())
            .collect();
        model::softmax(&mut scores);
        scores
    }
}

pub struct LogRegModel {
    config: ModelConfig,
    c: f64,
    max_iter: usize,
    learning_rate: f64,
    featurizer: Option<Featurizer>,
    state: Option<LogRegState>,
}

impl LogRegModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let params = model::resolve_params(&config);
        Ok(Self {
            c: model::param_f64(&params, "C", 1.0)?,
            max_iter: model::param_usize(&params, "max_iter", 200)?,
            learning_rate: model::param_f64(&params, "learning_rate", 1.0)?,
            config,
            featurizer: None,
            state: None,
        })
    }

    fn featurize(&self, queries: &[Query]) -> Result<Vec<intentkit_core::FeatureVector>, ModelError> {
        let featurizer = self.featurizer.as_ref().ok_or(ModelError::Uninitialized)?;
        Ok(queries.iter().map(|q| featurizer.extract(q)).collect())
    }

    fn fitted(&self) -> Result<&LogRegState, ModelError> {
        self.state.as_ref().ok_or(ModelError::NotFitted)
    }
}

impl Model for LogRegModel {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn initialize_resources(
        &mut self,
        loader: &dyn ResourceLoader,
        training: Option<&[Query]>,
    ) -> Result<(), ModelError> {
        self.featurizer = Some(model::build_featurizer(&self.config, loader, training)?);
        Ok(())
    }

    fn fit(&mut self, queries: &[Query], labels: &[String]) -> Result<(), ModelError> {
        model::check_lengths(queries, labels)?;
        let vectors = self.featurize(queries)?;
        let vocabulary = Vocabulary::fit(&vectors);
        let (classes, targets) = model::index_labels(labels);
        let xs: Vec<Vec<(usize, f64)>> = vectors.iter().map(|v| vocabulary.sparse(v)).collect();

        let (k, d, n) = (classes.len(), vocabulary.len(), xs.len().max(1) as f64);
        let mut state = LogRegState {
            classes,
            vocabulary,
            weights: vec![vec![0.0; d]; k],
            bias: vec![0.0; k],
        };

        let step = self.learning_rate;
        let decay = 1.0 / (self.c * n);
        for _ in 0..self.max_iter {
            let mut grad_w = vec![vec![0.0; d]; k];
            let mut grad_b = vec![0.0; k];
            for (x, &target) in xs.iter().zip(&targets) {
                let p = state.probabilities(x);
                for (class, p_class) in p.into_iter().enumerate() {
                    let err = p_class - if class == target { 1.0 } else { 0.0 };
                    grad_b[class] += err;
                    for &(j, v) in x {
                        grad_w[class][j] += err * v;
                    }
                }
            }
            for class in 0..k {
                for j in 0..d {
                    let w = &mut state.weights[class][j];
                    *w -= step * (grad_w[class][j] / n + *w * decay);
                }
                state.bias[class] -= step * grad_b[class] / n;
            }
        }

        debug!(classes = k, features = d, examples = xs.len(), iterations = self.max_iter, "fitted logreg");
        self.state = Some(state);
        Ok(())
    }

    fn predict(&self, queries: &[Query]) -> Result<Vec<String>, ModelError> {
        let state = self.fitted()?;
        Ok(self
            .featurize(queries)?
            .iter()
            .map(|v| {
                let p = state.probabilities(&state.vocabulary.sparse(v));
                state.classes[model::argmax(&p)].clone()
            })
            .collect())
    }

    fn predict_proba(&self, queries: &[Query]) -> Result<Vec<Vec<(String, f64)>>, ModelError> {
        let state = self.fitted()?;
        Ok(self
            .featurize(queries)?
            .iter()
            .map(|v| {
                let p = state.probabilities(&state.vocabulary.sparse(v));
                state.classes.iter().cloned().zip(p).collect()
            })
            .collect())
    }

    fn dump_state(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self.fitted()?)?)
    }

    fn restore_state(&mut self, state: Value) -> Result<(), ModelError> {
        let state: LogRegState = serde_json::from_value(state)?;
        if state.weights.len() != state.classes.len()
            || state.bias.len() != state.classes.len()
            || state.weights.iter().any(|w| w.len() != state.vocabulary.len())
        {
            return Err(ModelError::InvalidParam {
                name: "weights".into(),
                message: "shape does not match classes and vocabulary".into(),
            });
        }
        self.state = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentkit_core::{ClassifierConfig, MemoryLoader};

    fn model(json: &str) -> LogRegModel {
        let config = ClassifierConfig::from_json(json).unwrap();
        let mut model = LogRegModel::new(ModelConfig::from_classifier_config(&config, "query", "class")).unwrap();
        model.initialize_resources(&MemoryLoader::new(), None).unwrap();
        model
    }

    fn bow() -> LogRegModel {
        model(r#"{"model_type": "logreg", "features": {"bag-of-words": {"lengths": [1]}}, "params": {"C": 1.0}}"#)
    }

    fn train(model: &mut LogRegModel) {
        let queries: Vec<Query> = ["book a flight", "play jazz", "cancel my flight"]
            .map(Query::new)
            .to_vec();
        let labels: Vec<String> = ["travel", "music", "travel"].map(String::from).to_vec();
        model.fit(&queries, &labels).unwrap();
    }

    #[test]
    fn learns_separable_examples() {
        let mut m = bow();
        train(&mut m);
        let predicted = m
            .predict(&[Query::new("play rock"), Query::new("book a hotel")])
            .unwrap();
        assert_eq!(predicted, vec!["music", "travel"]);
    }

    #[test]
    fn probabilities_cover_all_classes_and_sum_to_one() {
        let mut m = bow();
        train(&mut m);
        let rows = m.predict_proba(&[Query::new("play rock")]).unwrap();
        let labels: Vec<&str> = rows[0].iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["music", "travel"]);
        let total: f64 = rows[0].iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(rows[0][0].1 > 0.5);
    }

    #[test]
    fn unseen_text_falls_back_to_prior() {
        let mut m = bow();
        train(&mut m);
        // Only the bias applies; travel has two of three examples.
        assert_eq!(m.predict(&[Query::new("zzz")]).unwrap(), vec!["travel"]);
    }

    #[test]
    fn state_roundtrip_preserves_predictions() {
        let mut m = bow();
        train(&mut m);
        let state = m.dump_state().unwrap();

        let mut restored = bow();
        restored.restore_state(state).unwrap();
        let q = [Query::new("play rock")];
        assert_eq!(m.predict_proba(&q).unwrap(), restored.predict_proba(&q).unwrap());
    }

    #[test]
    fn rejects_duplicate_vocabulary() {
        let mut m = bow();
        let state = serde_json::json!({
            "classes": ["music", "travel"],
            "vocabulary": ["bag_of_words|1|play", "bag_of_words|1|play"],
            "weights": [[0.0], [0.0]],
            "bias": [0.0, 0.0],
        });
        assert!(matches!(m.restore_state(state), Err(ModelError::State(_))));
        assert!(matches!(m.predict(&[Query::new("play")]), Err(ModelError::NotFitted)));
    }

    #[test]
    fn rejects_malformed_state() {
        let mut m = bow();
        let bad = serde_json::json!({"classes": ["a", "b"], "vocabulary": ["x"], "weights": [[0.0]], "bias": [0.0, 0.0]});
        assert!(m.restore_state(bad).is_err());
        assert!(m.restore_state(serde_json::json!({"weights": 1})).is_err());
    }

    #[test]
    fn unfitted_and_uninitialized_errors() {
        let m = bow();
        assert!(matches!(m.predict(&[Query::new("x")]), Err(ModelError::NotFitted)));
        assert!(matches!(m.dump_state(), Err(ModelError::NotFitted)));

        let config = ClassifierConfig::from_json(
            r#"{"model_type": "logreg", "features": {"bag-of-words": {}}, "params": {}}"#,
        )
        .unwrap();
        let mut raw = LogRegModel::new(ModelConfig::from_classifier_config(&config, "query", "class")).unwrap();
        let err = raw.fit(&[Query::new("x")], &["a".to_string()]).unwrap_err();
        assert!(matches!(err, ModelError::Uninitialized));
    }

    #[test]
    fn length_mismatch() {
        let mut m = bow();
        let err = m.fit(&[Query::new("x")], &[]).unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { queries: 1, labels: 0 }));
    }

    #[test]
    fn invalid_hyperparameters() {
        let config = ClassifierConfig::from_json(
            r#"{"model_type": "logreg", "features": {}, "params": {"C": 0}}"#,
        )
        .unwrap();
        assert!(LogRegModel::new(ModelConfig::from_classifier_config(&config, "query", "class")).is_err());
    }
}
