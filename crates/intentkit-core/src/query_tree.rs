//! Two-level grouping of labeled examples: domain → intent → examples.
//!
//! Both levels keep first-seen insertion order, so a tree built from a
//! loader's files lists domains and intents in the order the files were read.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::markup;
use crate::query::ProcessedQuery;

/// Examples grouped by domain, then intent.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTree<T> {
    domains: Vec<DomainNode<T>>,
}

#[derive(Debug, Clone, PartialEq)]
struct DomainNode<T> {
    name: String,
    intents: Vec<(String, Vec<T>)>,
}

impl<T> Default for QueryTree<T> {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
        }
    }
}

impl<T> QueryTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an example under `domain` / `intent`, creating either level on
    /// first sight.
    pub fn push(&mut self, domain: &str, intent: &str, item: T) {
        let node = match self.domains.iter().position(|d| d.name == domain) {
            Some(i) => &mut self.domains[i],
            None => {
                self.domains.push(DomainNode {
                    name: domain.to_string(),
                    intents: Vec::new(),
                });
                let last = self.domains.len() - 1;
                &mut self.domains[last]
            }
        };
        match node.intents.iter().position(|(name, _)| name == intent) {
            Some(i) => node.intents[i].1.push(item),
            None => node.intents.push((intent.to_string(), vec![item])),
        }
    }

    /// Domain names in insertion order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }

    /// Intent names of one domain in insertion order (empty if unknown).
    pub fn intents<'a>(&'a self, domain: &str) -> impl Iterator<Item = &'a str> {
        self.domain(domain)
            .into_iter()
            .flat_map(|d| d.intents.iter().map(|(name, _)| name.as_str()))
    }

    pub fn get(&self, domain: &str, intent: &str) -> Option<&[T]> {
        self.domain(domain)?
            .intents
            .iter()
            .find(|(name, _)| name == intent)
            .map(|(_, items)| items.as_slice())
    }

    /// All examples of one domain, intents in insertion order.
    pub fn domain_items<'a>(&'a self, domain: &str) -> impl Iterator<Item = &'a T> {
        self.domain(domain)
            .into_iter()
            .flat_map(|d| d.intents.iter().flat_map(|(_, items)| items.iter()))
    }

    /// Iterate `(domain, intent, examples)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[T])> {
        self.domains.iter().flat_map(|d| {
            d.intents
                .iter()
                .map(move |(intent, items)| (d.name.as_str(), intent.as_str(), items.as_slice()))
        })
    }

    /// Total number of examples.
    pub fn len(&self) -> usize {
        self.iter().map(|(_, _, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn domain(&self, domain: &str) -> Option<&DomainNode<T>> {
        self.domains.iter().find(|d| d.name == domain)
    }
}

/// Group labeled examples by domain then intent.
pub fn build_query_tree(queries: &[ProcessedQuery]) -> QueryTree<ProcessedQuery> {
    let mut tree = QueryTree::new();
    for query in queries {
        tree.push(&query.domain, &query.intent, query.clone());
    }
    tree
}

/// Like [`build_query_tree`], storing each example's markup instead of the
/// example itself.
pub fn build_raw_query_tree(queries: &[ProcessedQuery]) -> QueryTree<String> {
    let mut tree = QueryTree::new();
    for query in queries {
        tree.push(&query.domain, &query.intent, markup::dump_query(query));
    }
    tree
}

// Serialized as nested JSON objects, keeping insertion order.
impl<T: Serialize> Serialize for QueryTree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.domains.len()))?;
        for domain in &self.domains {
            map.serialize_entry(&domain.name, &IntentLevel(&domain.intents))?;
        }
        map.end()
    }
}

struct IntentLevel<'a, T>(&'a [(String, Vec<T>)]);

impl<T: Serialize> Serialize for IntentLevel<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (intent, items) in self.0 {
            map.serialize_entry(intent, items)?;
        }
        map.end()
    }
}
