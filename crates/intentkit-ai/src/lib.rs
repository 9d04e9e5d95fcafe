//! Model layer: feature extraction, the model capability and its built-in
//! families, and the cached classifier lifecycle.

mod error;
pub use error::{ClassifierError, ModelError};

pub mod centroid;
pub mod classifier;
pub mod evaluation;
pub mod features;
pub mod hooks;
pub mod logreg;
pub mod model;
pub mod registry;

pub use classifier::{
    Classifier, DomainClassifier, FitOptions, FitOutcome, IntentClassifier, Outcome,
};
pub use evaluation::{EvaluatedExample, LabelStats, ModelEvaluation};
pub use hooks::{DomainHooks, IntentHooks, TrainingHooks};
pub use model::Model;
pub use registry::ModelRegistry;
