//! Resilient, chunked loading of normalized documents.
//!
//! Documents are partitioned into contiguous chunks of `chunk_size` and each
//! chunk is submitted as one unordered insert. A chunk that fails partially or
//! wholly is recorded in the [`LoadResult`] and the run moves on: the loader
//! never aborts because of one chunk and never retries on its own.
//!
//! Submission is sequential. One chunk reaches a terminal state before the
//! next is submitted, and cancellation is honored only between chunks.

pub mod result;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::Document;
use crate::observability::MetricsRegistry;
use crate::store::InsertTarget;

pub use result::{ChunkFailure, ChunkOutcome, LoadResult};

/// Default number of documents per insert call.
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoaderError {
	#[error("chunk size must be positive")]
	InvalidChunkSize,
}

/// Submits document chunks to an [`InsertTarget`] and accounts for the outcome.
pub struct BatchLoader {
	target: Arc<dyn InsertTarget>,
	chunk_size: usize,
	chunk_timeout: Option<Duration>,
	metrics: Option<Arc<MetricsRegistry>>,
}

impl BatchLoader {
	pub fn new(target: Arc<dyn InsertTarget>, chunk_size: usize) -> Result<Self, LoaderError> {
		if chunk_size == 0 {
			return Err(LoaderError::InvalidChunkSize);
		}
		Ok(Self {
			target,
			chunk_size,
			chunk_timeout: None,
			metrics: None,
		})
	}

	/// Record a chunk as failed when its insert call takes longer than `timeout`.
	///
	/// The destination may still have committed part of a timed-out chunk;
	/// such writes are not counted as confirmed.
	pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
		self.chunk_timeout = Some(timeout);
		self
	}

	pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
		self.metrics = Some(metrics);
		self
	}

	pub fn chunk_size(&self) -> usize {
		self.chunk_size
	}

	/// Load every chunk of `documents`.
	pub async fn load(&self, documents: Vec<Document>) -> LoadResult {
		self.load_with_cancel(documents, &CancellationToken::new())
			.await
	}

	/// Load `documents`, checking `cancel` before each chunk is submitted.
	pub async fn load_with_cancel(
		&self,
		documents: Vec<Document>,
		cancel: &CancellationToken,
	) -> LoadResult {
		let mut result = LoadResult::default();
		if documents.is_empty() {
			return result;
		}

		let total_chunks = documents.len().div_ceil(self.chunk_size);
		for (chunk_index, chunk) in documents.chunks(self.chunk_size).enumerate() {
			if cancel.is_cancelled() {
				info!(
					"load cancelled before chunk {}/{}",
					chunk_index + 1,
					total_chunks
				);
				result.cancelled = true;
				break;
			}

			let outcome = self.submit_chunk(chunk_index, chunk).await;
			self.observe(&outcome, chunk.len());
			result.record(chunk_index, chunk.len(), outcome);
		}

		info!(
			"load finished: {} of {} documents confirmed across {} chunks ({} failed chunks)",
			result.confirmed,
			result.attempted,
			result.chunks_submitted,
			result.failures.len()
		);
		result
	}

	/// Submit one chunk and reduce the destination's answer to a terminal outcome.
	async fn submit_chunk(&self, chunk_index: usize, chunk: &[Document]) -> ChunkOutcome {
		debug!(
			"chunk {} submitted ({} documents)",
			chunk_index,
			chunk.len()
		);
		let start = Instant::now();

		let call = self.target.insert_unordered(chunk);
		let response = match self.chunk_timeout {
			Some(limit) => match tokio::time::timeout(limit, call).await {
				Ok(r) => r,
				Err(_) => {
					self.observe_latency(start);
					warn!("chunk {} timed out after {:?}", chunk_index, limit);
					return ChunkOutcome::Failed {
						reason: format!("insert timed out after {:?}", limit),
					};
				}
			},
			None => call.await,
		};
		self.observe_latency(start);

		match response {
			Ok(outcome) => {
				let mut confirmed = outcome.confirmed;
				if confirmed > chunk.len() {
					warn!(
						"chunk {}: destination confirmed {} documents for a chunk of {}; clamping",
						chunk_index,
						confirmed,
						chunk.len()
					);
					confirmed = chunk.len();
				}

				if outcome.failures.is_empty() && confirmed == chunk.len() {
					debug!("chunk {} fully succeeded", chunk_index);
					ChunkOutcome::FullySucceeded { confirmed }
				} else {
					warn!(
						"chunk {}: {} inserted, {} errors",
						chunk_index,
						confirmed,
						outcome.failures.len()
					);
					ChunkOutcome::PartiallySucceeded {
						confirmed,
						errors: outcome.failures,
					}
				}
			}
			Err(e) => {
				warn!("chunk {} failed: {}", chunk_index, e);
				ChunkOutcome::Failed {
					reason: e.to_string(),
				}
			}
		}
	}

	fn observe_latency(&self, start: Instant) {
		if let Some(m) = &self.metrics {
			m.chunk_latency_seconds
				.observe(start.elapsed().as_secs_f64());
		}
	}

	fn observe(&self, outcome: &ChunkOutcome, chunk_len: usize) {
		let Some(m) = &self.metrics else {
			return;
		};
		m.chunks_submitted_total.inc();
		m.documents_attempted_total.inc_by(chunk_len as u64);
		m.documents_confirmed_total
			.inc_by(outcome.confirmed() as u64);
		match outcome {
			ChunkOutcome::FullySucceeded { .. } => {}
			ChunkOutcome::PartiallySucceeded { .. } => m.chunk_partial_failures_total.inc(),
			ChunkOutcome::Failed { .. } => m.chunk_total_failures_total.inc(),
		}
	}
}
