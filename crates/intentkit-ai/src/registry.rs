//! Model-type registry.
//!
//! Maps `model_type` names to constructors and custom feature extractor names
//! to their code, so configurations coming back from an artifact can be
//! turned into live models again.

use std::collections::BTreeMap;
use std::sync::Arc;

use intentkit_core::{CustomExtractor, FeatureSpec, ModelConfig};
use tracing::debug;

use crate::centroid::{self, CentroidModel};
use crate::logreg::{self, LogRegModel};
use crate::model::Model;
use crate::ModelError;

pub type ModelBuilder = Arc<dyn Fn(ModelConfig) -> Result<Box<dyn Model>, ModelError> + Send + Sync>;

pub struct ModelRegistry {
    builders: BTreeMap<String, ModelBuilder>,
    extractors: BTreeMap<String, CustomExtractor>,
}

impl Default for ModelRegistry {
    /// Registry with the built-in `logreg` and `centroid` models.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(logreg::MODEL_TYPE, |config| {
            Ok(Box::new(LogRegModel::new(config)?) as Box<dyn Model>)
        });
        registry.register(centroid::MODEL_TYPE, |config| {
            Ok(Box::new(CentroidModel::new(config)?) as Box<dyn Model>)
        });
        registry
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
            extractors: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        model_type: &str,
        builder: impl Fn(ModelConfig) -> Result<Box<dyn Model>, ModelError> + Send + Sync + 'static,
    ) {
        self.builders.insert(model_type.to_string(), Arc::new(builder));
    }

    /// Make a custom extractor resolvable by name when a configuration
    /// refers to it as `{"custom": name}`.
    pub fn register_extractor(&mut self, extractor: CustomExtractor) {
        self.extractors.insert(extractor.name.clone(), extractor);
    }

    pub fn model_types(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Build an unfitted model for `config`.
    pub fn create(&self, mut config: ModelConfig) -> Result<Box<dyn Model>, ModelError> {
        for spec in config.features.values_mut() {
            let resolved = match &*spec {
                FeatureSpec::Params(_) => spec
                    .custom_name()
                    .and_then(|name| self.extractors.get(name))
                    .cloned(),
                FeatureSpec::Custom(_) => None,
            };
            if let Some(extractor) = resolved {
                *spec = FeatureSpec::Custom(extractor);
            }
        }

        let builder = self
            .builders
            .get(&config.model_type)
            .ok_or_else(|| ModelError::UnknownModelType(config.model_type.clone()))?;
        debug!(model_type = %config.model_type, "creating model");
        builder(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentkit_core::{ClassifierConfig, FeatureVector, MemoryLoader, Query, ResourceSet};

    fn model_config(json: &str) -> ModelConfig {
        let config = ClassifierConfig::from_json(json).unwrap();
        ModelConfig::from_classifier_config(&config, "query", "class")
    }

    #[test]
    fn builds_registered_types() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.model_types().collect::<Vec<_>>(), vec!["centroid", "logreg"]);

        let model = registry
            .create(model_config(r#"{"model_type": "centroid", "features": {}, "params": {}}"#))
            .unwrap();
        assert_eq!(model.config().model_type, "centroid");
    }

    #[test]
    fn unknown_model_type() {
        let err = ModelRegistry::default()
            .create(model_config(r#"{"model_type": "svm", "features": {}, "params": {}}"#))
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::UnknownModelType(t) if t == "svm"));
    }

    #[test]
    fn resolves_custom_extractors_by_name() {
        let mut registry = ModelRegistry::default();
        registry.register_extractor(CustomExtractor::new("shout", |q: &Query, _: &ResourceSet| {
            FeatureVector::from([("caps".to_string(), q.text.chars().filter(|c| c.is_uppercase()).count() as f64)])
        }));

        let config = model_config(
            r#"{"model_type": "logreg", "features": {"shout": {"custom": "shout"}}, "params": {}}"#,
        );
        let mut model = registry.create(config).unwrap();
        assert!(matches!(model.config().features["shout"], FeatureSpec::Custom(_)));
        model.initialize_resources(&MemoryLoader::new(), None).unwrap();

        let unresolved = ModelRegistry::default()
            .create(model_config(
                r#"{"model_type": "logreg", "features": {"shout": {"custom": "shout"}}, "params": {}}"#,
            ))
            .unwrap()
            .initialize_resources(&MemoryLoader::new(), None);
        assert!(matches!(unresolved, Err(ModelError::UnknownFeature(_))));
    }
}
