//! In-process BM25 for the fallback bank.
//!
//! Standard Okapi parameters (k1 = 1.2, b = 0.75) over the same
//! document view the FTS5 backend indexes.

use std::collections::BTreeMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Lowercased alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A scored corpus of documents.
pub struct Bm25Index {
    docs: Vec<Vec<String>>,
    doc_freq: BTreeMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    /// Index a corpus (one string per document).
    pub fn build(documents: &[String]) -> Self {
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for doc in &docs {
            let mut seen: Vec<&String> = Vec::new();
            for term in doc {
                if !seen.contains(&term) {
                    seen.push(term);
                    *doc_freq.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(Vec::len).sum::<usize>() as f64 / docs.len() as f64
        };
        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    /// Score every document against the query. Zero means no overlap.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        let n = self.docs.len() as f64;
        self.docs
            .iter()
            .map(|doc| {
                let len = doc.len() as f64;
                terms
                    .iter()
                    .map(|term| {
                        let tf = doc.iter().filter(|t| *t == term).count() as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        idf * (tf * (K1 + 1.0))
                            / (tf + K1 * (1.0 - B + B * len / self.avg_len.max(1.0)))
                    })
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_and_lowercases() {
        assert_eq!(
            tokenize("Use class_hierarchy, then SUBMIT!"),
            vec!["use", "class", "hierarchy", "then", "submit"]
        );
    }

    #[test]
    fn matching_document_outscores_non_matching() {
        let index = Bm25Index::build(&[
            "subclass hierarchy traversal with sparql".to_string(),
            "remote endpoint timeout handling".to_string(),
        ]);
        let scores = index.scores("list subclasses in the hierarchy");
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn rare_terms_weigh_more() {
        let index = Bm25Index::build(&[
            "sparql sparql sparql common".to_string(),
            "annotation sparql common".to_string(),
            "sparql common".to_string(),
        ]);
        let scores = index.scores("annotation");
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > scores[2]);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let index = Bm25Index::build(&[]);
        assert!(index.scores("anything").is_empty());
    }
}
