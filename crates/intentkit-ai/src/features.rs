//! Feature extraction: turns a [`Query`] into a sparse [`FeatureVector`].
//!
//! Built-in extractors, keyed by their configuration name:
//!
//! - `bag-of-words`: n-gram counts; `{"lengths": [1, 2]}` (default `[1]`)
//! - `in-gaz`: gazetteer phrase hits per entity type (needs `gazetteers`)
//! - `length`: log-scaled token count
//! - `freq`: log-frequency bins of each token (needs `word_freq`); `{"bins": 5}`
//!
//! Custom extractors come from [`FeatureSpec::Custom`].

use std::collections::{BTreeMap, BTreeSet};

use intentkit_core::resource::{GAZETTEERS, WORD_FREQ};
use intentkit_core::{CustomExtractor, FeatureSpec, FeatureVector, Query, Resource, ResourceSet};
use serde_json::{Map, Value};

use crate::ModelError;

const DEFAULT_FREQ_BINS: usize = 5;

#[derive(Debug, Clone)]
enum Extractor {
    BagOfWords { lengths: Vec<usize> },
    InGaz,
    Length,
    Freq { bins: usize },
    Custom(CustomExtractor),
}

/// The configured extractors plus the resources they read.
#[derive(Debug, Clone)]
pub struct Featurizer {
    extractors: Vec<Extractor>,
    resources: ResourceSet,
}

impl Featurizer {
    /// Build from a feature configuration. `resources` must hold every
    /// resource the configuration requires.
    pub fn build(
        features: &BTreeMap<String, FeatureSpec>,
        resources: ResourceSet,
    ) -> Result<Self, ModelError> {
        let mut extractors = Vec::with_capacity(features.len());
        for (name, spec) in features {
            let extractor = match spec {
                FeatureSpec::Custom(custom) => Extractor::Custom(custom.clone()),
                FeatureSpec::Params(params) => {
                    if let Some(custom) = spec.custom_name() {
                        // A custom extractor that was not resolved back to code.
                        return Err(ModelError::UnknownFeature(custom.to_string()));
                    }
                    builtin(name, params)?
                }
            };
            match &extractor {
                Extractor::InGaz => require(&resources, GAZETTEERS)?,
                Extractor::Freq { .. } => require(&resources, WORD_FREQ)?,
                _ => {}
            }
            extractors.push(extractor);
        }
        Ok(Self {
            extractors,
            resources,
        })
    }

    pub fn extract(&self, query: &Query) -> FeatureVector {
        let tokens: Vec<&str> = query.tokens().collect();
        let mut features = FeatureVector::new();
        for extractor in &self.extractors {
            match extractor {
                Extractor::BagOfWords { lengths } => bag_of_words(&tokens, lengths, &mut features),
                Extractor::InGaz => {
                    if let Some(Resource::Gazetteer(gaz)) = self.resources.get(GAZETTEERS) {
                        in_gaz(&tokens, gaz, &mut features);
                    }
                }
                Extractor::Length => {
                    features.insert("length".into(), (1.0 + tokens.len() as f64).ln());
                }
                Extractor::Freq { bins } => {
                    if let Some(Resource::WordFreq(table)) = self.resources.get(WORD_FREQ) {
                        freq(&tokens, table, *bins, &mut features);
                    }
                }
                Extractor::Custom(custom) => {
                    for (name, value) in custom.extract(query, &self.resources) {
                        *features.entry(format!("custom|{}|{name}", custom.name)).or_default() += value;
                    }
                }
            }
        }
        features
    }
}

fn builtin(name: &str, params: &Map<String, Value>) -> Result<Extractor, ModelError> {
    match name {
        "bag-of-words" => {
            let lengths = match params.get("lengths") {
                None => vec![1],
                Some(Value::Array(values)) => values
                    .iter()
                    .map(|v| match v.as_u64() {
                        Some(n) if n > 0 => Ok(n as usize),
                        _ => Err(invalid("lengths", "expected positive integers")),
                    })
                    .collect::<Result<_, _>>()?,
                Some(_) => return Err(invalid("lengths", "expected an array")),
            };
            Ok(Extractor::BagOfWords { lengths })
        }
        "in-gaz" => Ok(Extractor::InGaz),
        "length" => Ok(Extractor::Length),
        "freq" => {
            let bins = match params.get("bins") {
                None => DEFAULT_FREQ_BINS,
                Some(v) => match v.as_u64() {
                    Some(n) if n > 0 => n as usize,
                    _ => return Err(invalid("bins", "expected a positive integer")),
                },
            };
            Ok(Extractor::Freq { bins })
        }
        other => Err(ModelError::UnknownFeature(other.to_string())),
    }
}

fn require(resources: &ResourceSet, name: &str) -> Result<(), ModelError> {
    if resources.contains_key(name) {
        Ok(())
    } else {
        Err(ModelError::Resource(
            intentkit_core::ResourceError::UnknownResource(name.to_string()),
        ))
    }
}

fn invalid(name: &str, message: &str) -> ModelError {
    ModelError::InvalidParam {
        name: name.to_string(),
        message: message.to_string(),
    }
}

// ── Extractors ──

fn bag_of_words(tokens: &[&str], lengths: &[usize], features: &mut FeatureVector) {
    for &n in lengths {
        if tokens.len() < n {
            continue;
        }
        for gram in tokens.windows(n) {
            *features
                .entry(format!("bag_of_words|{n}|{}", gram.join(" ")))
                .or_default() += 1.0;
        }
    }
}

fn in_gaz(
    tokens: &[&str],
    gazetteers: &BTreeMap<String, BTreeSet<String>>,
    features: &mut FeatureVector,
) {
    for (entity_type, phrases) in gazetteers {
        for phrase in phrases {
            let phrase_tokens: Vec<&str> = phrase.split_whitespace().collect();
            if phrase_tokens.is_empty() || phrase_tokens.len() > tokens.len() {
                continue;
            }
            let hits = tokens
                .windows(phrase_tokens.len())
                .filter(|w| *w == phrase_tokens.as_slice())
                .count();
            if hits > 0 {
                *features.entry(format!("in_gaz|{entity_type}")).or_default() += hits as f64;
            }
        }
    }
}

fn freq(tokens: &[&str], table: &BTreeMap<String, u64>, bins: usize, features: &mut FeatureVector) {
    for token in tokens {
        let key = match table.get(*token) {
            Some(&count) => {
                let bin = ((1.0 + count as f64).ln() as usize).min(bins - 1);
                format!("freq|{bin}")
            }
            None => "freq|oov".to_string(),
        };
        *features.entry(key).or_default() += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentkit_core::ConfigFields;

    fn features(json: &str) -> BTreeMap<String, FeatureSpec> {
        ConfigFields::from_json(&format!(r#"{{"features": {json}}}"#))
            .unwrap()
            .features
            .unwrap()
    }

    fn resources() -> ResourceSet {
        let mut gaz: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        gaz.insert(
            "city".to_string(),
            ["boston".to_string(), "new york".to_string()].into(),
        );
        ResourceSet::from([
            (GAZETTEERS.to_string(), Resource::Gazetteer(gaz)),
            (
                WORD_FREQ.to_string(),
                Resource::WordFreq(BTreeMap::from([("fly".to_string(), 1000), ("to".to_string(), 1)])),
            ),
        ])
    }

    #[test]
    fn bag_of_words_ngrams() {
        let f = Featurizer::build(&features(r#"{"bag-of-words": {"lengths": [1, 2]}}"#), ResourceSet::new())
            .unwrap();
        let v = f.extract(&Query::new("Play the the jazz"));
        assert_eq!(v["bag_of_words|1|the"], 2.0);
        assert_eq!(v["bag_of_words|1|play"], 1.0);
        assert_eq!(v["bag_of_words|2|the jazz"], 1.0);
        assert_eq!(v.len(), 3 + 3);
    }

    #[test]
    fn bag_of_words_defaults_to_unigrams() {
        let f = Featurizer::build(&features(r#"{"bag-of-words": {}}"#), ResourceSet::new()).unwrap();
        let v = f.extract(&Query::new("play jazz"));
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn in_gaz_counts_phrase_hits() {
        let f = Featurizer::build(&features(r#"{"in-gaz": {}}"#), resources()).unwrap();
        let v = f.extract(&Query::new("fly from Boston to New York"));
        assert_eq!(v["in_gaz|city"], 2.0);
        assert!(f.extract(&Query::new("fly to denver")).is_empty());
    }

    #[test]
    fn in_gaz_requires_gazetteers() {
        let err = Featurizer::build(&features(r#"{"in-gaz": {}}"#), ResourceSet::new()).unwrap_err();
        assert!(matches!(err, ModelError::Resource(_)));
    }

    #[test]
    fn freq_bins_and_oov() {
        let f = Featurizer::build(&features(r#"{"freq": {"bins": 3}}"#), resources()).unwrap();
        let v = f.extract(&Query::new("fly to denver"));
        // ln(1001) ≈ 6.9 → capped at bin 2; ln(2) ≈ 0.69 → bin 0.
        assert_eq!(v["freq|2"], 1.0);
        assert_eq!(v["freq|0"], 1.0);
        assert_eq!(v["freq|oov"], 1.0);
    }

    #[test]
    fn length_feature() {
        let f = Featurizer::build(&features(r#"{"length": {}}"#), ResourceSet::new()).unwrap();
        let v = f.extract(&Query::new("a b c"));
        assert!((v["length"] - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn custom_extractor() {
        let mut specs = features(r#"{"bag-of-words": {}}"#);
        specs.insert(
            "contrived".into(),
            FeatureSpec::Custom(CustomExtractor::new("contrived", |q: &Query, _: &ResourceSet| {
                FeatureVector::from([("long".to_string(), (q.text.len() > 10) as u8 as f64)])
            })),
        );
        let f = Featurizer::build(&specs, ResourceSet::new()).unwrap();
        let v = f.extract(&Query::new("a fairly long query"));
        assert_eq!(v["custom|contrived|long"], 1.0);
    }

    #[test]
    fn unresolved_custom_and_unknown_features_fail() {
        let err = Featurizer::build(&features(r#"{"x": {"custom": "contrived"}}"#), ResourceSet::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownFeature(name) if name == "contrived"));

        let err = Featurizer::build(&features(r#"{"sentiment": {}}"#), ResourceSet::new()).unwrap_err();
        assert!(matches!(err, ModelError::UnknownFeature(name) if name == "sentiment"));
    }

    #[test]
    fn invalid_params_fail() {
        let err = Featurizer::build(&features(r#"{"bag-of-words": {"lengths": [0]}}"#), ResourceSet::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParam { .. }));
    }
}
