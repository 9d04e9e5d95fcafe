//! Training-cache digests.
//!
//! [`model_digest`] fingerprints everything that determines a trained
//! artifact: the training data identity, the canonical configuration and the
//! content of every resource the configuration requires. Two runs with equal
//! inputs produce byte-identical digests, so a stored digest that matches a
//! freshly computed one means the stored artifact can be reused.
//!
//! The digest is a cache key, not a security boundary. SHA-256 via `ring`.

use ring::digest::{Context, SHA256};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::resource::{ResourceError, ResourceLoader};

/// A running SHA-256 hash.
#[derive(Clone)]
pub struct Fingerprint(Context);

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    pub fn new() -> Self {
        Self(Context::new(&SHA256))
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn update_str(&mut self, s: &str) {
        self.0.update(s.as_bytes());
    }

    /// Finish and hex-encode (64 lowercase hex chars).
    pub fn hex(self) -> String {
        hex::encode(self.0.finish())
    }
}

/// One-shot hex SHA-256.
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut fp = Fingerprint::new();
    fp.update(bytes);
    fp.hex()
}

/// Order-independent digest of `(text, label)` pairs.
///
/// Pairs are sorted before hashing, so the same multiset of examples always
/// yields the same digest regardless of iteration order.
pub fn content_digest<T, L>(pairs: impl IntoIterator<Item = (T, L)>) -> String
where
    T: AsRef<str>,
    L: AsRef<str>,
{
    let mut pairs: Vec<(T, L)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| {
        (a.0.as_ref(), a.1.as_ref()).cmp(&(b.0.as_ref(), b.1.as_ref()))
    });

    let mut fp = Fingerprint::new();
    for (text, label) in &pairs {
        fp.update_str(text.as_ref());
        fp.update(b"\x1f");
        fp.update_str(label.as_ref());
        fp.update(b"\x1e");
    }
    fp.hex()
}

/// Digest of (training data, configuration, required resources).
///
/// The order is fixed: data digest, canonical config JSON, then the hex digest
/// of the per-resource digests taken in sorted resource-name order.
pub fn model_digest(
    data_digest: &str,
    config: &ClassifierConfig,
    loader: &dyn ResourceLoader,
) -> Result<String, ResourceError> {
    let mut fp = Fingerprint::new();
    fp.update_str(data_digest);
    fp.update_str(&config.to_json());

    // BTreeSet iterates in sorted order.
    let mut resources = Fingerprint::new();
    for name in config.required_resources() {
        resources.update_str(&loader.hash_feature_resource(&name)?);
    }
    fp.update_str(&resources.hex());

    let digest = fp.hex();
    debug!(digest = %digest, model_type = %config.model_type, "computed model digest");
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFields;
    use crate::query::ProcessedQuery;
    use crate::resource::MemoryLoader;

    fn config(json: &str) -> ClassifierConfig {
        ClassifierConfig::new(ConfigFields::from_json(json).unwrap()).unwrap()
    }

    fn gaz_config() -> ClassifierConfig {
        config(r#"{"model_type": "logreg", "features": {"bag-of-words": {}, "in-gaz": {}}, "params": {"C": 1.0}}"#)
    }

    fn loader() -> MemoryLoader {
        MemoryLoader::new()
            .with_label_set("train", vec![ProcessedQuery::new("play jazz", "music", "play")])
            .with_gazetteer("city", ["boston"])
    }

    #[test]
    fn hex_digest_known_value() {
        assert_eq!(
            hex_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_digest_is_order_independent() {
        let a = content_digest([("book a flight", "travel"), ("play jazz", "music")]);
        let b = content_digest([("play jazz", "music"), ("book a flight", "travel")]);
        assert_eq!(a, b);
    }

    #[test]
    fn content_digest_tracks_labels_and_duplicates() {
        let base = content_digest([("play jazz", "music")]);
        assert_ne!(base, content_digest([("play jazz", "travel")]));
        assert_ne!(base, content_digest([("play jazz", "music"), ("play jazz", "music")]));
        // Field separators keep text/label boundaries unambiguous.
        assert_ne!(content_digest([("ab", "c")]), content_digest([("a", "bc")]));
    }

    #[test]
    fn model_digest_is_reproducible() {
        let a = model_digest("data", &gaz_config(), &loader()).unwrap();
        let b = model_digest("data", &gaz_config(), &loader()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn model_digest_tracks_each_input() {
        let base = model_digest("data", &gaz_config(), &loader()).unwrap();

        assert_ne!(base, model_digest("other", &gaz_config(), &loader()).unwrap());

        let tuned = config(r#"{"model_type": "logreg", "features": {"bag-of-words": {}, "in-gaz": {}}, "params": {"C": 10.0}}"#);
        assert_ne!(base, model_digest("data", &tuned, &loader()).unwrap());

        let changed = loader().with_gazetteer("city", ["denver"]);
        assert_ne!(base, model_digest("data", &gaz_config(), &changed).unwrap());
    }

    #[test]
    fn unused_resources_do_not_affect_digest() {
        let plain = config(r#"{"model_type": "logreg", "features": {"bag-of-words": {}}, "params": {}}"#);
        let a = model_digest("data", &plain, &loader()).unwrap();
        let b = model_digest("data", &plain, &loader().with_gazetteer("city", ["denver"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_required_resource_errors() {
        let result = model_digest("data", &gaz_config(), &MemoryLoader::new());
        assert!(matches!(result, Err(ResourceError::UnknownResource(name)) if name == "gazetteers"));
    }
}
