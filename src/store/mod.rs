pub mod mongo;
pub mod ndjson;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::model::Document;

pub use mongo::MongoTarget;
pub use ndjson::NdjsonTarget;

/// One rejected document, or a chunk-level note when no index is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
	/// 0-based position within the submitted chunk
	pub index: Option<usize>,
	/// Destination error code, if the destination reports one
	pub code: Option<i32>,
	pub reason: String,
}

/// What the destination confirmed for a single unordered insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsertOutcome {
	pub confirmed: usize,
	pub failures: Vec<DocumentFailure>,
}

impl InsertOutcome {
	pub fn complete(confirmed: usize) -> Self {
		Self {
			confirmed,
			failures: Vec::new(),
		}
	}

	pub fn partial(confirmed: usize, failures: Vec<DocumentFailure>) -> Self {
		Self {
			confirmed,
			failures,
		}
	}
}

/// The destination call failed before any per-document accounting existed.
#[derive(Debug, Error)]
pub enum InsertError {
	#[error("transport error: {0}")]
	Transport(String),
	#[error("destination rejected the batch: {0}")]
	Rejected(String),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Append-only write target for normalized documents.
///
/// Implementations must attempt every document of `chunk` even after one is
/// rejected, and report how many were confirmed. A returned `Err` means no
/// accounting is available for the chunk.
#[async_trait]
pub trait InsertTarget: Send + Sync + 'static {
	async fn insert_unordered(&self, chunk: &[Document]) -> Result<InsertOutcome, InsertError>;
}
