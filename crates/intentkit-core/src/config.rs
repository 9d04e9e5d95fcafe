//! Classifier configuration: model type, feature extractors and hyperparameters.
//!
//! [`ClassifierConfig`] is the caller-facing value object. It is validated on
//! construction and has a canonical JSON form ([`ClassifierConfig::to_json`])
//! that is independent of map ordering; that form feeds the training-cache
//! digest. [`ModelConfig`] is the richer record the models carry, tagging the
//! example and label types they were built for.

use std::collections::{BTreeMap, BTreeSet};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::Query;
use crate::resource::ResourceSet;

/// Sparse feature vector: feature name → value.
pub type FeatureVector = BTreeMap<String, f64>;

/// Feature extractor names that depend on a loader resource.
pub const FEATURE_RESOURCES: &[(&str, &str)] = &[("in-gaz", "gazetteers"), ("freq", "word_freq")];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("one of 'params' and 'param_selection.grid' is required")]
    NoParamSource,

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Feature specs ──

type ExtractFn = dyn Fn(&Query, &ResourceSet) -> FeatureVector + Send + Sync;

/// A caller-supplied feature extractor.
///
/// Serializes as `{"custom": name}` (plus `"resources"` when it declares any),
/// so two configs using the same named extractor hash identically.
#[derive(Clone)]
pub struct CustomExtractor {
    pub name: String,
    pub resources: Vec<String>,
    func: Arc<ExtractFn>,
}

impl CustomExtractor {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&Query, &ResourceSet) -> FeatureVector + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Declare a loader resource this extractor reads.
    pub fn requires(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn extract(&self, query: &Query, resources: &ResourceSet) -> FeatureVector {
        (self.func)(query, resources)
    }
}

impl fmt::Debug for CustomExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomExtractor")
            .field("name", &self.name)
            .field("resources", &self.resources)
            .finish()
    }
}

impl PartialEq for CustomExtractor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.resources == other.resources
    }
}

/// Configuration of one feature extractor: keyword arguments for a built-in
/// extractor, or a custom extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSpec {
    Params(Map<String, Value>),
    Custom(CustomExtractor),
}

impl FeatureSpec {
    pub fn empty() -> Self {
        Self::Params(Map::new())
    }

    /// Name of a custom extractor, whether live or deserialized as `{"custom": name}`.
    pub fn custom_name(&self) -> Option<&str> {
        match self {
            Self::Custom(extractor) => Some(&extractor.name),
            Self::Params(params) => params.get("custom").and_then(Value::as_str),
        }
    }
}

impl Serialize for FeatureSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Params(params) => params.serialize(serializer),
            Self::Custom(extractor) => {
                let len = if extractor.resources.is_empty() { 1 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("custom", &extractor.name)?;
                if !extractor.resources.is_empty() {
                    map.serialize_entry("resources", &extractor.resources)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FeatureSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::Params)
    }
}

/// Hyperparameter search settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSelection {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_jobs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<Map<String, Value>>,
}

// ── Unvalidated fields ──

/// Configuration fields before validation. Also the shape of runtime
/// overrides passed to `fit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFields {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub features: Option<BTreeMap<String, FeatureSpec>>,
    #[serde(default)]
    pub model_settings: Option<Map<String, Value>>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub param_selection: Option<ParamSelection>,
}

impl ConfigFields {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_type.is_none() {
            return Err(ConfigError::MissingField("model_type"));
        }
        if self.features.is_none() {
            return Err(ConfigError::MissingField("features"));
        }
        let has_grid = self
            .param_selection
            .as_ref()
            .is_some_and(|ps| ps.grid.is_some());
        if self.params.is_none() && !has_grid {
            return Err(ConfigError::NoParamSource);
        }
        Ok(())
    }

    /// Turn runtime overrides into a configuration.
    ///
    /// If the overrides alone are a valid configuration they are used as-is.
    /// Otherwise each field present in the overrides replaces the same field
    /// of `base`; an overriding `param_selection` without `params` also drops
    /// the inherited `params`.
    pub fn resolve(self, base: &ClassifierConfig) -> Result<ClassifierConfig, ConfigError> {
        if self.validate().is_ok() {
            return ClassifierConfig::new(self);
        }

        let drop_params = self.param_selection.is_some() && self.params.is_none();
        let mut merged = ConfigFields::from(base.clone());
        if let Some(model_type) = self.model_type {
            merged.model_type = Some(model_type);
        }
        if let Some(features) = self.features {
            merged.features = Some(features);
        }
        if let Some(model_settings) = self.model_settings {
            merged.model_settings = Some(model_settings);
        }
        if let Some(params) = self.params {
            merged.params = Some(params);
        }
        if let Some(param_selection) = self.param_selection {
            merged.param_selection = Some(param_selection);
        }
        if drop_params {
            merged.params = None;
        }
        ClassifierConfig::new(merged)
    }
}

impl From<ClassifierConfig> for ConfigFields {
    fn from(config: ClassifierConfig) -> Self {
        Self {
            model_type: Some(config.model_type),
            features: Some(config.features),
            model_settings: config.model_settings,
            params: config.params,
            param_selection: config.param_selection,
        }
    }
}

// ── Validated configuration ──

/// A validated classifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierConfig {
    pub model_type: String,
    pub features: BTreeMap<String, FeatureSpec>,
    pub model_settings: Option<Map<String, Value>>,
    pub params: Option<Map<String, Value>>,
    pub param_selection: Option<ParamSelection>,
}

impl ClassifierConfig {
    /// Validate and build a configuration.
    ///
    /// Fails with [`ConfigError::MissingField`] when `model_type` or
    /// `features` is absent, and [`ConfigError::NoParamSource`] when neither
    /// `params` nor `param_selection.grid` is present.
    pub fn new(fields: ConfigFields) -> Result<Self, ConfigError> {
        fields.validate()?;
        Ok(Self {
            model_type: fields
                .model_type
                .ok_or(ConfigError::MissingField("model_type"))?,
            features: fields.features.ok_or(ConfigError::MissingField("features"))?,
            model_settings: fields.model_settings,
            params: fields.params,
            param_selection: fields.param_selection,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::new(ConfigFields::from_json(json)?)
    }

    /// Derive the caller-facing configuration from a model's own config.
    pub fn from_model_config(model_config: &ModelConfig) -> Result<Self, ConfigError> {
        Self::new(ConfigFields {
            model_type: Some(model_config.model_type.clone()),
            features: Some(model_config.features.clone()),
            model_settings: model_config.model_settings.clone(),
            params: model_config.params.clone(),
            param_selection: model_config.param_selection.clone(),
        })
    }

    /// Fields in declaration order. Absent optional fields map to `null`.
    pub fn to_map(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("model_type", Value::String(self.model_type.clone())),
            ("features", to_value(&self.features)),
            ("model_settings", to_value(&self.model_settings)),
            ("params", to_value(&self.params)),
            ("param_selection", to_value(&self.param_selection)),
        ]
    }

    /// Canonical JSON: object keys sorted at every level.
    pub fn to_json(&self) -> String {
        let object: Map<String, Value> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        canonical_json(&Value::Object(object))
    }

    /// Loader resources the configured feature extractors depend on.
    pub fn required_resources(&self) -> BTreeSet<String> {
        required_resources(&self.features)
    }
}

impl fmt::Display for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "ClassifierConfig({})", args.join(", "))
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Internal model configuration: the classifier config plus the example and
/// label types the model was built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_type: String,
    pub example_type: String,
    pub label_type: String,
    pub features: BTreeMap<String, FeatureSpec>,
    #[serde(default)]
    pub model_settings: Option<Map<String, Value>>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub param_selection: Option<ParamSelection>,
}

impl ModelConfig {
    pub fn from_classifier_config(
        config: &ClassifierConfig,
        example_type: &str,
        label_type: &str,
    ) -> Self {
        Self {
            model_type: config.model_type.clone(),
            example_type: example_type.to_string(),
            label_type: label_type.to_string(),
            features: config.features.clone(),
            model_settings: config.model_settings.clone(),
            params: config.params.clone(),
            param_selection: config.param_selection.clone(),
        }
    }

    pub fn required_resources(&self) -> BTreeSet<String> {
        required_resources(&self.features)
    }
}

fn required_resources(features: &BTreeMap<String, FeatureSpec>) -> BTreeSet<String> {
    let mut resources = BTreeSet::new();
    for (name, spec) in features {
        if let Some((_, resource)) = FEATURE_RESOURCES.iter().find(|(f, _)| f == name) {
            resources.insert(resource.to_string());
        }
        match spec {
            FeatureSpec::Custom(extractor) => resources.extend(extractor.resources.iter().cloned()),
            FeatureSpec::Params(params) => {
                if let Some(Value::Array(declared)) = params.get("resources") {
                    resources.extend(declared.iter().filter_map(Value::as_str).map(String::from));
                }
            }
        }
    }
    resources
}

// ── Canonical form and structural hash ──

/// Serialize a JSON value with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Deep structural hash of a JSON value.
///
/// Arrays hash as ordered tuples of their elements' hashes; objects hash as
/// the sorted list of `(key, value hash)` pairs, so key order never matters.
/// Arrays that model sets are NOT order-independent: `[1, 2]` and `[2, 1]`
/// differ. The value is only stable within one build of the crate; the cache
/// digest uses [`canonical_json`] instead.
pub fn structural_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    match value {
        Value::Null => 0u8.hash(&mut hasher),
        Value::Bool(b) => (1u8, b).hash(&mut hasher),
        Value::Number(n) => {
            2u8.hash(&mut hasher);
            match n.as_f64() {
                Some(f) if n.is_f64() => f.to_bits().hash(&mut hasher),
                _ => n.to_string().hash(&mut hasher),
            }
        }
        Value::String(s) => (3u8, s).hash(&mut hasher),
        Value::Array(items) => {
            4u8.hash(&mut hasher);
            for item in items {
                structural_hash(item).hash(&mut hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(&mut hasher);
            let mut pairs: Vec<(&str, u64)> = map
                .iter()
                .map(|(k, v)| (k.as_str(), structural_hash(v)))
                .collect();
            pairs.sort();
            pairs.hash(&mut hasher);
        }
    }
    hasher.finish()
}
