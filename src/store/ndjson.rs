use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{InsertError, InsertOutcome, InsertTarget};
use crate::model::Document;

/// Appends documents to a newline-delimited JSON file, one object per line.
///
/// Useful for inspecting normalized output or feeding `mongoimport`.
pub struct NdjsonTarget {
	path: PathBuf,
	file: Mutex<File>,
}

impl NdjsonTarget {
	/// Create (or truncate) `path`.
	pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
		let path = path.as_ref().to_path_buf();
		let file = std::fs::File::create(&path)?;
		Ok(Self {
			path,
			file: Mutex::new(File::from_std(file)),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl InsertTarget for NdjsonTarget {
	async fn insert_unordered(&self, chunk: &[Document]) -> Result<InsertOutcome, InsertError> {
		// Serialized before taking the lock. A failed write may still leave part
		// of the chunk on disk.
		let mut buf = Vec::with_capacity(chunk.len() * 256);
		for doc in chunk {
			serde_json::to_writer(&mut buf, doc)
				.map_err(|e| InsertError::Rejected(e.to_string()))?;
			buf.push(b'\n');
		}

		let mut file = self.file.lock().await;
		file.write_all(&buf).await?;
		file.flush().await?;
		Ok(InsertOutcome::complete(chunk.len()))
	}
}
