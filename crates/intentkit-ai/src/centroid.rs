//! Nearest-centroid classification by cosine similarity.
//!
//! Each label's centroid is the mean of its examples' L2-normalized feature
//! vectors, normalized again. A query is scored against every centroid;
//! probabilities are a softmax over `similarity / temperature`.

use intentkit_core::{FeatureVector, ModelConfig, Query, ResourceLoader};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::features::Featurizer;
use crate::model::{self, Model, Vocabulary};
use crate::ModelError;

pub const MODEL_TYPE: &str = "centroid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CentroidState {
    classes: Vec<String>,
    vocabulary: Vocabulary,
    centroids: Vec<Vec<f64>>,
}

impl CentroidState {
    fn similarities(&self, vector: &FeatureVector) -> Vec<f64> {
        let mut embedding = self.vocabulary.dense(vector);
        normalize(&mut embedding);
        self.centroids
            .iter()
            .map(|c| cosine_sim(&embedding, c))
            .collect()
    }
}

pub struct CentroidModel {
    config: ModelConfig,
    temperature: f64,
    featurizer: Option<Featurizer>,
    state: Option<CentroidState>,
}

impl CentroidModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let params = model::resolve_params(&config);
        Ok(Self {
            temperature: model::param_f64(&params, "temperature", 0.1)?,
            config,
            featurizer: None,
            state: None,
        })
    }

    fn featurize(&self, queries: &[Query]) -> Result<Vec<FeatureVector>, ModelError> {
        let featurizer = self.featurizer.as_ref().ok_or(ModelError::Uninitialized)?;
        Ok(queries.iter().map(|q| featurizer.extract(q)).collect())
    }

    fn fitted(&self) -> Result<&CentroidState, ModelError> {
        self.state.as_ref().ok_or(ModelError::NotFitted)
    }
}

impl Model for CentroidModel {
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

        let mut accum = vec![(vec![0.0; vocabulary.len()], 0usize); classes.len()];
        for (vector, &target) in vectors.iter().zip(&targets) {
            let mut embedding = vocabulary.dense(vector);
            normalize(&mut embedding);
            let (sum, count) = &mut accum[target];
            for (s, x) in sum.iter_mut().zip(&embedding) {
                *s += x;
            }
            *count += 1;
        }

        let centroids = finalize_centroids(accum);
        debug!(classes = classes.len(), features = vocabulary.len(), "fitted centroids");
        self.state = Some(CentroidState {
            classes,
            vocabulary,
            centroids,
        });
        Ok(())
    }

    fn predict(&self, queries: &[Query]) -> Result<Vec<String>, ModelError> {
        let state = self.fitted()?;
        Ok(self
            .featurize(queries)?
            .iter()
            .map(|v| state.classes[model::argmax(&state.similarities(v))].clone())
            .collect())
    }

    fn predict_proba(&self, queries: &[Query]) -> Result<Vec<Vec<(String, f64)>>, ModelError> {
        let state = self.fitted()?;
        Ok(self
            .featurize(queries)?
            .iter()
            .map(|v| {
                let mut scores: Vec<f64> = state
                    .similarities(v)
                    .into_iter()
                    .map(|s| s / self.temperature)
                    .collect();
                model::softmax(&mut scores);
                state.classes.iter().cloned().zip(scores).collect()
            })
            .collect())
    }

    fn dump_state(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self.fitted()?)?)
    }

    fn restore_state(&mut self, state: Value) -> Result<(), ModelError> {
        let state: CentroidState = serde_json::from_value(state)?;
        if state.centroids.len() != state.classes.len()
            || state.centroids.iter().any(|c| c.len() != state.vocabulary.len())
        {
            return Err(ModelError::InvalidParam {
                name: "centroids".into(),
                message: "shape does not match classes and vocabulary".into(),
            });
        }
        self.state = Some(state);
        Ok(())
    }
}

// ── Vector helpers ──

fn finalize_centroids(accum: Vec<(Vec<f64>, usize)>) -> Vec<Vec<f64>> {
    accum
        .into_iter()
        .map(|(mut sum, count)| {
            if count > 0 {
                for v in &mut sum {
                    *v /= count as f64;
                }
                normalize(&mut sum);
            }
            sum
        })
        .collect()
}

/// Dot product; equals cosine similarity for unit vectors.
fn cosine_sim(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f64]) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
