//! Description graphs: subject-predicate-value triples attached to a node

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One `(subject, predicate, value)` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub value: Value,
}

/// A set of triples, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptionGraph {
    triples: Vec<Triple>,
}

impl DescriptionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph with one triple per metadata entry, all sharing `subject`
    ///
    /// Every key becomes a predicate, `resourceName` and `resourceClass`
    /// included.
    pub fn from_model<'a, I>(subject: &str, metadata: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut graph = Self::new();
        for (predicate, value) in metadata {
            graph.insert(Triple {
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                value,
            });
        }
        graph
    }

    /// Add a triple; returns false if an identical triple is already present
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.triples.contains(&triple) {
            return false;
        }
        self.triples.push(triple);
        true
    }

    /// Union `other` into this graph
    pub fn merge(&mut self, other: DescriptionGraph) {
        for triple in other.triples {
            self.insert(triple);
        }
    }

    /// Value of the first triple matching subject and predicate
    pub fn get(&self, subject: &str, predicate: &str) -> Option<&Value> {
        self.triples
            .iter()
            .find(|t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.value)
    }

    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}
