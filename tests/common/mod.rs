/// Common test utilities and helpers for integration tests.
use std::env;
use std::sync::Mutex;

use async_trait::async_trait;
use trip_ingest::model::Document;
use trip_ingest::store::{DocumentFailure, InsertError, InsertOutcome, InsertTarget};

/// Check if live MongoDB tests are enabled via environment variable.
#[allow(dead_code)]
pub fn is_mongo_test_enabled() -> bool {
	env::var("RUN_MONGO_INTEGRATION_TESTS").is_ok()
}

/// Skip the test with a message if live MongoDB tests are not enabled.
/// Returns true if the test should proceed, false if it should be skipped.
#[allow(dead_code)]
pub fn check_mongo_enabled() -> bool {
	if !is_mongo_test_enabled() {
		eprintln!("Skipping MongoDB integration test; set RUN_MONGO_INTEGRATION_TESTS=1 to enable");
		return false;
	}
	true
}

/// URI of the test server; defaults to a local instance.
#[allow(dead_code)]
pub fn mongo_uri() -> String {
	env::var("TRIP_TEST_MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017/".to_string())
}

/// In-memory destination that keeps accepted documents and rejects the ones
/// matching `reject`, the way an unordered insert reports per-document errors.
#[allow(dead_code)]
pub struct RecordingTarget {
	pub stored: Mutex<Vec<Document>>,
	pub calls: Mutex<Vec<usize>>,
	reject: Box<dyn Fn(&Document) -> bool + Send + Sync>,
}

#[allow(dead_code)]
impl RecordingTarget {
	pub fn accepting() -> Self {
		Self::rejecting(|_| false)
	}

	pub fn rejecting(reject: impl Fn(&Document) -> bool + Send + Sync + 'static) -> Self {
		Self {
			stored: Mutex::new(Vec::new()),
			calls: Mutex::new(Vec::new()),
			reject: Box::new(reject),
		}
	}

	pub fn stored_len(&self) -> usize {
		self.stored.lock().unwrap().len()
	}
}

#[async_trait]
impl InsertTarget for RecordingTarget {
	async fn insert_unordered(&self, chunk: &[Document]) -> Result<InsertOutcome, InsertError> {
		self.calls.lock().unwrap().push(chunk.len());

		let mut failures = Vec::new();
		let mut stored = self.stored.lock().unwrap();
		for (index, doc) in chunk.iter().enumerate() {
			if (self.reject)(doc) {
				failures.push(DocumentFailure {
					index: Some(index),
					code: Some(121),
					reason: "document failed validation".to_string(),
				});
			} else {
				stored.push(doc.clone());
			}
		}

		let confirmed = chunk.len() - failures.len();
		Ok(if failures.is_empty() {
			InsertOutcome::complete(confirmed)
		} else {
			InsertOutcome::partial(confirmed, failures)
		})
	}
}
