//! Query types shared by the loaders, the query tree and the classifiers.
//!
//! A [`Query`] is a single utterance plus its normalized form. A
//! [`ProcessedQuery`] is a labeled training or test example: the query, its
//! domain (coarse label), its intent (fine label within the domain) and any
//! annotated entity spans.

use serde::{Deserialize, Serialize};

/// A single user utterance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Lowercased text with punctuation stripped and whitespace collapsed.
    pub normalized_text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let normalized_text = normalize(&text);
        Self {
            text,
            normalized_text,
        }
    }

    /// Normalized tokens, split on whitespace.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.normalized_text.split_whitespace()
    }
}

/// An annotated entity span. Offsets are char indices into [`Query::text`],
/// `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
}

/// A labeled example.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub query: Query,
    pub domain: String,
    pub intent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

impl ProcessedQuery {
    pub fn new(text: impl Into<String>, domain: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            query: Query::new(text),
            domain: domain.into(),
            intent: intent.into(),
            entities: Vec::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn text(&self) -> &str {
        &self.query.text
    }
}

/// Input accepted by `predict`: either raw text still to be parsed by the
/// resource loader, or an already-built [`Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInput {
    Raw(String),
    Parsed(Query),
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        Self::Parsed(query)
    }
}

/// Lowercase, strip punctuation (apostrophes and hyphens inside words are
/// kept) and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '-')
            .flat_map(char::to_lowercase)
            .collect();
        let cleaned = cleaned.trim_matches(|c| c == '\'' || c == '-');
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(cleaned);
    }
    out
}
