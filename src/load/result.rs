use serde::Serialize;

use crate::store::DocumentFailure;

/// Terminal state of one submitted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
	FullySucceeded {
		confirmed: usize,
	},
	PartiallySucceeded {
		confirmed: usize,
		errors: Vec<DocumentFailure>,
	},
	Failed {
		reason: String,
	},
}

impl ChunkOutcome {
	pub fn confirmed(&self) -> usize {
		match self {
			ChunkOutcome::FullySucceeded { confirmed }
			| ChunkOutcome::PartiallySucceeded { confirmed, .. } => *confirmed,
			ChunkOutcome::Failed { .. } => 0,
		}
	}
}

/// A chunk that did not fully succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkFailure {
	/// Some documents were confirmed, the rest rejected with itemized reasons.
	Partial {
		chunk_index: usize,
		confirmed: usize,
		errors: Vec<DocumentFailure>,
	},
	/// The destination call failed before any accounting was available.
	Total { chunk_index: usize, reason: String },
}

impl ChunkFailure {
	pub fn chunk_index(&self) -> usize {
		match self {
			ChunkFailure::Partial { chunk_index, .. } | ChunkFailure::Total { chunk_index, .. } => {
				*chunk_index
			}
		}
	}

	pub fn confirmed(&self) -> usize {
		match self {
			ChunkFailure::Partial { confirmed, .. } => *confirmed,
			ChunkFailure::Total { .. } => 0,
		}
	}

	pub fn is_total(&self) -> bool {
		matches!(self, ChunkFailure::Total { .. })
	}
}

/// Summary of one load run. Counts only ever increase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LoadResult {
	/// Documents in every submitted chunk
	pub attempted: usize,
	/// Documents the destination confirmed as written
	pub confirmed: usize,
	pub chunks_submitted: usize,
	/// Chunks that did not fully succeed, in submission order
	pub failures: Vec<ChunkFailure>,
	/// The run stopped before every chunk was submitted
	pub cancelled: bool,
}

impl LoadResult {
	/// Fold one chunk's terminal outcome into the run totals.
	pub fn record(&mut self, chunk_index: usize, chunk_len: usize, outcome: ChunkOutcome) {
		self.chunks_submitted += 1;
		self.attempted += chunk_len;
		self.confirmed += outcome.confirmed();

		match outcome {
			ChunkOutcome::FullySucceeded { .. } => {}
			ChunkOutcome::PartiallySucceeded { confirmed, errors } => {
				self.failures.push(ChunkFailure::Partial {
					chunk_index,
					confirmed,
					errors,
				});
			}
			ChunkOutcome::Failed { reason } => {
				self.failures.push(ChunkFailure::Total {
					chunk_index,
					reason,
				});
			}
		}
	}

	/// Sum another run (e.g. the next input file) into this one. Chunk indices
	/// are not rebased; keep the per-run results when a failure must be traced
	/// back to its source.
	pub fn merge(&mut self, other: LoadResult) {
		self.attempted += other.attempted;
		self.confirmed += other.confirmed;
		self.chunks_submitted += other.chunks_submitted;
		self.failures.extend(other.failures);
		self.cancelled |= other.cancelled;
	}

	pub fn rejected(&self) -> usize {
		self.attempted - self.confirmed
	}

	/// Every attempted document was confirmed and the run was not cancelled.
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty() && !self.cancelled
	}

	pub fn partial_failures(&self) -> impl Iterator<Item = &ChunkFailure> {
		self.failures.iter().filter(|f| !f.is_total())
	}

	pub fn total_failures(&self) -> impl Iterator<Item = &ChunkFailure> {
		self.failures.iter().filter(|f| f.is_total())
	}
}
