use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

use super::RetrievedDocument;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// In-memory Okapi BM25 index over the chunked corpus. Built once at
/// startup, read-only afterwards; `search` is CPU-bound and is expected
/// to run on a blocking worker thread.
pub struct Bm25Retriever {
    docs: Vec<RetrievedDocument>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl Bm25Retriever {
    pub fn build(docs: Vec<RetrievedDocument>) -> Self {
        let mut term_freqs = Vec::with_capacity(docs.len());
        let mut doc_lens = Vec::with_capacity(docs.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in &docs {
            let tokens = tokenize(&doc.content);
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            term_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32
        };

        info!("BM25 index built over {} chunks", docs.len());

        Self {
            docs,
            term_freqs,
            doc_lens,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedDocument> {
        if self.docs.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f32;
        let mut scored: Vec<(usize, f32)> = Vec::new();

        for (idx, freqs) in self.term_freqs.iter().enumerate() {
            let doc_len = self.doc_lens[idx] as f32;
            let mut score = 0.0f32;

            for term in &query_terms {
                let Some(&tf) = freqs.get(term) else { continue };
                let df = self.doc_freq[term] as f32;
                let idf = (((n - df + 0.5) / (df + 0.5)) + 1.0).ln();
                let tf = tf as f32;
                let norm = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_len.max(1.0));
                score += idf * tf * (K1 + 1.0) / norm;
            }

            if score > 0.0 {
                scored.push((idx, score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(idx, _)| self.docs[idx].clone())
            .collect()
    }
}

/// Lowercase alphanumeric word tokenizer with short-token and stop-word
/// removal.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|word| word.to_lowercase())
        .filter(|word| word.len() > 1 && !is_stop_word(word))
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "an" | "and" | "or" | "of" | "to" | "in" | "is" | "are" | "be"
            | "for" | "on" | "at" | "by" | "it" | "as" | "with" | "that" | "this"
            | "what" | "which" | "how" | "do" | "does" | "can"
    )
}
