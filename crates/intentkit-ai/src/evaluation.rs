//! Evaluation results: gold vs predicted labels for a labeled query set.

use std::collections::BTreeMap;
use std::fmt;

use intentkit_core::Query;
use serde::Serialize;

/// One evaluated example.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedExample {
    pub text: String,
    pub gold: String,
    pub predicted: String,
}

impl EvaluatedExample {
    pub fn is_correct(&self) -> bool {
        self.gold == self.predicted
    }
}

/// Per-label precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelStats {
    /// Gold examples with this label.
    pub support: usize,
    /// Examples predicted as this label.
    pub predicted: usize,
    pub correct: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEvaluation {
    pub results: Vec<EvaluatedExample>,
}

impl ModelEvaluation {
    pub fn new(queries: &[Query], gold: &[String], predicted: Vec<String>) -> Self {
        let results = queries
            .iter()
            .zip(gold)
            .zip(predicted)
            .map(|((q, g), p)| EvaluatedExample {
                text: q.text.clone(),
                gold: g.clone(),
                predicted: p,
            })
            .collect();
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn correct(&self) -> impl Iterator<Item = &EvaluatedExample> {
        self.results.iter().filter(|r| r.is_correct())
    }

    pub fn incorrect(&self) -> impl Iterator<Item = &EvaluatedExample> {
        self.results.iter().filter(|r| !r.is_correct())
    }

    /// Fraction of correct predictions; 0.0 when empty.
    pub fn accuracy(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.correct().count() as f64 / self.results.len() as f64
    }

    /// Stats for every label seen as gold or predicted.
    pub fn label_stats(&self) -> BTreeMap<String, LabelStats> {
        let mut counts: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
        for r in &self.results {
            counts.entry(r.gold.as_str()).or_default().0 += 1;
            counts.entry(r.predicted.as_str()).or_default().1 += 1;
            if r.is_correct() {
                counts.entry(r.gold.as_str()).or_default().2 += 1;
            }
        }
        counts
            .into_iter()
            .map(|(label, (support, predicted, correct))| {
                let precision = ratio(correct, predicted);
                let recall = ratio(correct, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                let stats = LabelStats {
                    support,
                    predicted,
                    correct,
                    precision,
                    recall,
                    f1,
                };
                (label.to_string(), stats)
            })
            .collect()
    }

    /// `(gold, predicted)` → count.
    pub fn confusion(&self) -> BTreeMap<(String, String), usize> {
        let mut matrix: BTreeMap<(String, String), usize> = BTreeMap::new();
        for r in &self.results {
            *matrix
                .entry((r.gold.clone(), r.predicted.clone()))
                .or_default() += 1;
        }
        matrix
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for ModelEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "accuracy: {:.4} ({}/{})",
            self.accuracy(),
            self.correct().count(),
            self.len()
        )?;
        writeln!(f, "{:<24} {:>9} {:>9} {:>9} {:>8}", "label", "precision", "recall", "f1", "support")?;
        for (label, s) in self.label_stats() {
            writeln!(
                f,
                "{:<24} {:>9.4} {:>9.4} {:>9.4} {:>8}",
                label, s.precision, s.recall, s.f1, s.support
            )?;
        }
        Ok(())
    }
}
