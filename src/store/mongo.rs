use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use mongodb::bson::{self, Bson, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

use super::{DocumentFailure, InsertError, InsertOutcome, InsertTarget};
use crate::model::{Document, FieldValue};

/// MongoDB collection used as an unordered, append-only write target.
pub struct MongoTarget {
	collection: Collection<bson::Document>,
}

impl MongoTarget {
	/// Wrap an already-selected collection.
	pub fn new(collection: Collection<bson::Document>) -> Self {
		Self { collection }
	}

	/// Connect from a `mongodb://` URI and verify the server answers a ping.
	pub async fn connect(
		uri: &str,
		database: &str,
		collection: &str,
		server_selection_timeout: Duration,
	) -> Result<Self> {
		let mut options = ClientOptions::parse(uri)
			.await
			.with_context(|| format!("invalid MongoDB URI '{}'", uri))?;
		options.server_selection_timeout = Some(server_selection_timeout);
		options.app_name = Some("trip-ingest".to_string());

		let client = Client::with_options(options)?;
		client
			.database("admin")
			.run_command(doc! { "ping": 1 })
			.await
			.context("MongoDB did not answer ping")?;
		info!("connected to MongoDB, target {}.{}", database, collection);

		Ok(Self::new(client.database(database).collection(collection)))
	}

	pub async fn count(&self) -> Result<u64> {
		Ok(self.collection.count_documents(doc! {}).await?)
	}

	/// Remove every document from the collection; returns how many were removed.
	pub async fn clear(&self) -> Result<u64> {
		let existing = self.count().await?;
		if existing == 0 {
			return Ok(0);
		}
		info!("clearing {} existing documents", existing);
		let res = self.collection.delete_many(doc! {}).await?;
		Ok(res.deleted_count)
	}
}

#[async_trait]
impl InsertTarget for MongoTarget {
	async fn insert_unordered(&self, chunk: &[Document]) -> Result<InsertOutcome, InsertError> {
		if chunk.is_empty() {
			return Ok(InsertOutcome::default());
		}
		let docs: Vec<bson::Document> = chunk.iter().map(to_bson).collect();

		match self.collection.insert_many(docs).ordered(false).await {
			Ok(res) => Ok(InsertOutcome::complete(res.inserted_ids.len())),
			Err(e) => match e.kind.as_ref() {
				ErrorKind::InsertMany(failure) => {
					// Unordered: every document not listed as a write error was inserted.
					let mut failures: Vec<DocumentFailure> = failure
						.write_errors
						.iter()
						.flatten()
						.map(|w| DocumentFailure {
							index: Some(w.index),
							code: Some(w.code),
							reason: w.message.clone(),
						})
						.collect();
					let confirmed = chunk.len().saturating_sub(failures.len());
					if let Some(wc) = &failure.write_concern_error {
						failures.push(DocumentFailure {
							index: None,
							code: Some(wc.code),
							reason: format!("write concern error: {}", wc.message),
						});
					}
					debug!(
						"insert_many partial failure: {} confirmed, {} errors",
						confirmed,
						failures.len()
					);
					Ok(InsertOutcome::partial(confirmed, failures))
				}
				_ => Err(InsertError::Transport(e.to_string())),
			},
		}
	}
}

/// Convert to BSON, preserving field order.
pub fn to_bson(document: &Document) -> bson::Document {
	let mut out = bson::Document::new();
	for (key, value) in document.iter() {
		out.insert(key, field_to_bson(value));
	}
	out
}

fn field_to_bson(value: &FieldValue) -> Bson {
	match value {
		FieldValue::Null => Bson::Null,
		FieldValue::String(s) => Bson::String(s.clone()),
		FieldValue::Int(v) => Bson::Int64(*v),
		FieldValue::Float(v) => Bson::Double(*v),
		FieldValue::Bool(v) => Bson::Boolean(*v),
		FieldValue::DateTime(v) => {
			Bson::DateTime(bson::DateTime::from_millis(v.and_utc().timestamp_millis()))
		}
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	#[test]
	fn converts_documents_to_bson_in_order() {
		let when = NaiveDate::from_ymd_opt(2025, 1, 1)
			.unwrap()
			.and_hms_milli_opt(12, 0, 0, 500)
			.unwrap();
		let mut doc = Document::default();
		doc.insert("pickup_datetime", FieldValue::DateTime(when));
		doc.insert("PULocationID", FieldValue::Int(132));
		doc.insert("tips", FieldValue::Float(1.5));
		doc.insert("on_scene_datetime", FieldValue::Null);
		doc.insert("pickup_date", FieldValue::String("2025-01-01".into()));
		doc.insert("shared", FieldValue::Bool(false));

		let b = to_bson(&doc);

		let keys: Vec<&str> = b.keys().map(String::as_str).collect();
		assert_eq!(
			keys,
			vec![
				"pickup_datetime",
				"PULocationID",
				"tips",
				"on_scene_datetime",
				"pickup_date",
				"shared"
			]
		);
		assert_eq!(
			b.get_datetime("pickup_datetime").unwrap().timestamp_millis(),
			when.and_utc().timestamp_millis()
		);
		assert_eq!(b.get_i64("PULocationID").unwrap(), 132);
		assert_eq!(b.get("on_scene_datetime"), Some(&Bson::Null));
		assert_eq!(b.get_str("pickup_date").unwrap(), "2025-01-01");
	}
}
