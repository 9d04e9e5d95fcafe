//! The classifier lifecycle controller.
//!
//! A [`Classifier`] owns at most one fitted [`Model`] and moves it through
//! fit → predict/evaluate → dump → load. Fitting consults a cache digest
//! over the training data, configuration and resources: when the digest
//! recorded next to a previous artifact matches, the artifact is loaded
//! instead of refitting.
//!
//! Calls that need a fitted model on an unfitted classifier return
//! [`Outcome::NotReady`] rather than failing.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use intentkit_core::{
    model_digest, ClassifierConfig, ConfigFields, ModelConfig, ProcessedQuery, Query, QueryInput,
    ResourceLoader,
};
use intentkit_store::artifact::{self, ArtifactEnvelope};
use tracing::{error, info, warn};

use crate::evaluation::ModelEvaluation;
use crate::hooks::{DomainHooks, IntentHooks, TrainingHooks};
use crate::model::Model;
use crate::registry::ModelRegistry;
use crate::{ClassifierError, ModelError};

/// Label set used when none is given.
pub const DEFAULT_LABEL_SET: &str = "train";

const EXAMPLE_TYPE: &str = "query";
const LABEL_TYPE: &str = "class";

/// Result of a call that needs a fitted model.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ready(T),
    NotReady,
}

impl<T> Outcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NotReady => None,
        }
    }
}

/// What a call to [`Classifier::fit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// A new model was trained.
    Fitted,
    /// The previous artifact matched the cache digest and was loaded.
    CacheHit,
    /// The training data had fewer than two labels; nothing changed.
    SingleClass,
}

/// Arguments to [`Classifier::fit`].
#[derive(Debug, Clone)]
pub struct FitOptions<'a> {
    /// Explicit examples; the loader's `label_set` is used when `None`.
    pub queries: Option<&'a [ProcessedQuery]>,
    pub label_set: &'a str,
    /// Artifact whose `.hash` sidecar is checked for a cache hit.
    pub previous_model_path: Option<&'a Path>,
    pub overrides: ConfigFields,
}

impl Default for FitOptions<'_> {
    fn default() -> Self {
        Self {
            queries: None,
            label_set: DEFAULT_LABEL_SET,
            previous_model_path: None,
            overrides: ConfigFields::default(),
        }
    }
}

pub struct Classifier<H: TrainingHooks> {
    hooks: H,
    loader: Arc<dyn ResourceLoader>,
    registry: Arc<ModelRegistry>,
    base_config: ClassifierConfig,
    model: Option<Box<dyn Model>>,
    dirty: bool,
    config: Option<ClassifierConfig>,
    hash: String,
}

pub type DomainClassifier = Classifier<DomainHooks>;
pub type IntentClassifier = Classifier<IntentHooks>;

impl Classifier<DomainHooks> {
    pub fn domain(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::new(DomainHooks, loader)
    }
}

impl Classifier<IntentHooks> {
    pub fn intent(loader: Arc<dyn ResourceLoader>, domain: impl Into<String>) -> Self {
        Self::new(IntentHooks::new(domain), loader)
    }
}

impl<H: TrainingHooks> Classifier<H> {
    pub fn new(hooks: H, loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            base_config: hooks.default_config(),
            hooks,
            loader,
            registry: Arc::new(ModelRegistry::default()),
            model: None,
            dirty: false,
            config: None,
            hash: String::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the configuration overrides are merged onto.
    pub fn with_base_config(mut self, config: ClassifierConfig) -> Self {
        self.base_config = config;
        self
    }

    /// True iff a fitted or loaded model is held.
    pub fn ready(&self) -> bool {
        self.model.is_some()
    }

    /// True when the model was fitted since the last dump or load.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Configuration of the held model.
    pub fn config(&self) -> Option<&ClassifierConfig> {
        self.config.as_ref()
    }

    /// Cache digest of the held model; empty when unknown.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Compute the cache digest for a prospective fit without fitting.
    pub fn digest(
        &self,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
        overrides: ConfigFields,
    ) -> Result<String, ClassifierError> {
        let config = overrides.resolve(&self.base_config)?;
        self.digest_for(&config, queries, label_set)
    }

    fn digest_for(
        &self,
        config: &ClassifierConfig,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<String, ClassifierError> {
        let loader = self.loader.as_ref();
        let data = self.hooks.queries_and_labels_hash(loader, queries, label_set)?;
        Ok(model_digest(&data, config, loader)?)
    }

    pub fn fit(&mut self, options: FitOptions<'_>) -> Result<FitOutcome, ClassifierError> {
        let FitOptions {
            queries,
            label_set,
            previous_model_path,
            overrides,
        } = options;
        let config = overrides.resolve(&self.base_config)?;
        let new_hash = self.digest_for(&config, queries, label_set)?;

        if let Some(path) = previous_model_path
            && artifact::read_hash(path)? == new_hash
        {
            info!(classifier = H::NAME, path = %path.display(), "no need to fit, loading previous model");
            self.load(path)?;
            return Ok(FitOutcome::CacheHit);
        }

        let loader = self.loader.as_ref();
        let (examples, labels) = self.hooks.queries_and_labels(loader, queries, label_set)?;
        let distinct: BTreeSet<&str> = labels.iter().map(String::as_str).collect();
        if distinct.len() <= 1 {
            warn!(
                classifier = H::NAME,
                labels = distinct.len(),
                "not fitting, training data has fewer than two labels"
            );
            return Ok(FitOutcome::SingleClass);
        }

        let examples: Vec<Query> = examples.into_iter().map(|q| q.query).collect();
        let mut model = self
            .registry
            .create(ModelConfig::from_classifier_config(&config, EXAMPLE_TYPE, LABEL_TYPE))?;
        model.initialize_resources(loader, Some(examples.as_slice()))?;
        model.fit(&examples, &labels)?;

        info!(
            classifier = H::NAME,
            model_type = %config.model_type,
            examples = examples.len(),
            labels = distinct.len(),
            "fitted model"
        );
        self.config = Some(ClassifierConfig::from_model_config(model.config())?);
        self.model = Some(model);
        self.hash = new_hash;
        self.dirty = true;
        Ok(FitOutcome::Fitted)
    }

    fn fitted(&self, operation: &str) -> Option<&dyn Model> {
        let model = self.model.as_deref();
        if model.is_none() {
            error!(classifier = H::NAME, "you must fit or load the model before running {operation}");
        }
        model
    }

    fn to_query(&self, input: QueryInput) -> Query {
        match input {
            QueryInput::Raw(text) => self.loader.create_query(&text),
            QueryInput::Parsed(query) => query,
        }
    }

    pub fn predict(&self, input: impl Into<QueryInput>) -> Result<Outcome<String>, ClassifierError> {
        let Some(model) = self.fitted("predict") else {
            return Ok(Outcome::NotReady);
        };
        let query = self.to_query(input.into());
        let label = model
            .predict(std::slice::from_ref(&query))?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyOutput)?;
        Ok(Outcome::Ready(label))
    }

    /// `(label, probability)` pairs sorted by probability descending, ties
    /// broken by label ascending.
    pub fn predict_proba(
        &self,
        input: impl Into<QueryInput>,
    ) -> Result<Outcome<Vec<(String, f64)>>, ClassifierError> {
        let Some(model) = self.fitted("predict_proba") else {
            return Ok(Outcome::NotReady);
        };
        let query = self.to_query(input.into());
        let mut row = model
            .predict_proba(std::slice::from_ref(&query))?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyOutput)?;
        row.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(Outcome::Ready(row))
    }

    /// Evaluate on explicit queries or a label set (`test` is the usual
    /// choice). `Ready(None)` when there is nothing to evaluate.
    pub fn evaluate(
        &self,
        queries: Option<&[ProcessedQuery]>,
        label_set: &str,
    ) -> Result<Outcome<Option<ModelEvaluation>>, ClassifierError> {
        let Some(model) = self.fitted("evaluate") else {
            return Ok(Outcome::NotReady);
        };
        let (examples, labels) =
            self.hooks
                .queries_and_labels(self.loader.as_ref(), queries, label_set)?;
        if examples.is_empty() {
            info!(classifier = H::NAME, label_set, "no examples to evaluate");
            return Ok(Outcome::Ready(None));
        }
        let examples: Vec<Query> = examples.into_iter().map(|q| q.query).collect();
        let evaluation = model.evaluate(&examples, &labels)?;
        info!(
            classifier = H::NAME,
            examples = evaluation.len(),
            accuracy = evaluation.accuracy(),
            "evaluated model"
        );
        Ok(Outcome::Ready(Some(evaluation)))
    }

    /// Write the artifact and its `.hash` sidecar, creating directories as
    /// needed.
    pub fn dump(&mut self, path: &Path) -> Result<Outcome<()>, ClassifierError> {
        let Some(model) = self.fitted("dump") else {
            return Ok(Outcome::NotReady);
        };
        let envelope = ArtifactEnvelope::new(model.config().clone(), model.dump_state()?);
        artifact::dump_artifact(path, &envelope)?;
        artifact::write_hash(path, &self.hash)?;
        self.dirty = false;
        Ok(Outcome::Ready(()))
    }

    /// Replace the held model with the artifact at `path`. On failure the
    /// classifier is left unchanged.
    pub fn load(&mut self, path: &Path) -> Result<(), ClassifierError> {
        let fail = |source: Box<dyn std::error::Error + Send + Sync>| ClassifierError::Load {
            classifier: H::NAME,
            path: path.to_path_buf(),
            source,
        };

        let envelope = artifact::load_artifact(path).map_err(|e| fail(e.into()))?;
        let mut model = self.registry.create(envelope.config).map_err(|e| fail(e.into()))?;
        model.restore_state(envelope.state).map_err(|e| fail(e.into()))?;
        let config = ClassifierConfig::from_model_config(model.config()).map_err(|e| fail(e.into()))?;
        let hash = artifact::read_hash(path).map_err(|e| fail(e.into()))?;
        model.initialize_resources(self.loader.as_ref(), None)?;

        info!(classifier = H::NAME, path = %path.display(), model_type = %config.model_type, "loaded model");
        self.model = Some(model);
        self.config = Some(config);
        self.hash = hash;
        self.dirty = false;
        Ok(())
    }
}

impl<H: TrainingHooks> fmt::Display for Classifier<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} ready: {}, dirty: {}>", H::NAME, self.ready(), self.dirty)
    }
}

impl<H: TrainingHooks + fmt::Debug> fmt::Debug for Classifier<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("hooks", &self.hooks)
            .field("ready", &self.ready())
            .field("dirty", &self.dirty)
            .field("config", &self.config)
            .field("hash", &self.hash)
            .finish()
    }
}
