//! Storage layer: trained-artifact envelopes, cache digest sidecars and the
//! file-backed project loader.

mod error;
pub use error::StoreError;

pub mod artifact;
pub use artifact::{ArtifactEnvelope, dump_artifact, hash_path, load_artifact, read_hash, write_hash};

mod project;
pub use project::ProjectLoader;
