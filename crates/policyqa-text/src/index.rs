use std::collections::{BTreeMap, HashMap};

use policyqa_core::config::Bm25Settings;
use policyqa_core::types::{Chunk, ChunkId};
use policyqa_core::{Error, Result};

use crate::tantivy_utils::{build_analyzer, tokenize};

/// BM25 Okapi statistics over the full chunk corpus, computed once.
///
/// `idf(t) = ln(N - n(t) + 0.5) - ln(n(t) + 0.5)`; terms that occur in more
/// than half of the corpus get a negative idf, which is replaced by
/// `epsilon * mean(idf)`.
pub struct Bm25Index {
	params: Bm25Settings,
	chunk_ids: Vec<ChunkId>,
	term_freqs: Vec<HashMap<String, u32>>,
	doc_lens: Vec<f64>,
	avgdl: f64,
	idf: HashMap<String, f64>,
}

impl Bm25Index {
	pub fn build(chunks: &[Chunk], params: Bm25Settings) -> Self {
		let mut analyzer = build_analyzer();
		let mut chunk_ids = Vec::with_capacity(chunks.len());
		let mut term_freqs = Vec::with_capacity(chunks.len());
		let mut doc_lens = Vec::with_capacity(chunks.len());
		// ordered so the idf sum is reproducible bit for bit
		let mut doc_freq: BTreeMap<String, u32> = BTreeMap::new();

		for chunk in chunks {
			let tokens = tokenize(&mut analyzer, &chunk.text);
			doc_lens.push(tokens.len() as f64);
			let mut freqs: HashMap<String, u32> = HashMap::new();
			for token in tokens {
				*freqs.entry(token).or_insert(0) += 1;
			}
			for term in freqs.keys() {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}
			chunk_ids.push(chunk.chunk_id);
			term_freqs.push(freqs);
		}

		let n = chunk_ids.len() as f64;
		let avgdl = if chunk_ids.is_empty() { 0.0 } else { doc_lens.iter().sum::<f64>() / n };

		let mut idf = HashMap::with_capacity(doc_freq.len());
		let mut idf_sum = 0.0;
		let mut negative = Vec::new();
		for (term, df) in doc_freq {
			let df = f64::from(df);
			let value = (n - df + 0.5).ln() - (df + 0.5).ln();
			idf_sum += value;
			if value < 0.0 {
				negative.push(term.clone());
			}
			idf.insert(term, value);
		}
		let average_idf = if idf.is_empty() { 0.0 } else { idf_sum / idf.len() as f64 };
		let floor = params.epsilon * average_idf;
		for term in negative {
			idf.insert(term, floor);
		}

		tracing::info!(chunks = chunk_ids.len(), vocabulary = idf.len(), avgdl, "BM25 index built");
		Self { params, chunk_ids, term_freqs, doc_lens, avgdl, idf }
	}

	/// An index over an empty corpus is never ready: callers get an
	/// upstream error instead of an empty result.
	pub fn is_ready(&self) -> bool { !self.chunk_ids.is_empty() }

	pub fn len(&self) -> usize { self.chunk_ids.len() }

	pub fn is_empty(&self) -> bool { self.chunk_ids.is_empty() }

	pub fn vocabulary_size(&self) -> usize { self.idf.len() }

	pub fn avgdl(&self) -> f64 { self.avgdl }

	pub fn idf(&self, term: &str) -> Option<f64> { self.idf.get(term).copied() }

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = build_analyzer();
		tokenize(&mut analyzer, text)
	}

	/// Score of every chunk, in corpus order. Repeated query tokens count
	/// once per occurrence; unknown tokens contribute nothing.
	pub fn scores(&self, query: &str) -> Result<Vec<f64>> {
		self.ensure_ready()?;
		let Bm25Settings { k1, b, .. } = self.params;
		let mut scores = vec![0.0; self.chunk_ids.len()];
		for token in self.tokenize(query) {
			let Some(&idf) = self.idf.get(&token) else { continue };
			for (doc, freqs) in self.term_freqs.iter().enumerate() {
				let Some(&tf) = freqs.get(&token) else { continue };
				let tf = f64::from(tf);
				let norm = 1.0 - b + b * self.doc_lens[doc] / self.avgdl;
				scores[doc] += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
			}
		}
		Ok(scores)
	}

	/// The `k` best chunks by descending score. Equal scores keep corpus
	/// order; a corpus smaller than `k` yields a shorter list.
	pub fn top_k(&self, query: &str, k: usize) -> Result<Vec<(ChunkId, f64)>> {
		let scores = self.scores(query)?;
		let mut order: Vec<usize> = (0..scores.len()).collect();
		order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
		Ok(order.into_iter().take(k).map(|i| (self.chunk_ids[i], scores[i])).collect())
	}

	fn ensure_ready(&self) -> Result<()> {
		if self.is_ready() {
			Ok(())
		} else {
			Err(Error::upstream("lexical index not ready: corpus is empty"))
		}
	}
}
