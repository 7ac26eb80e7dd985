//! Conversion of typed tabular batches into document-store-safe documents.
//!
//! Every column is normalized according to its declared [`SemanticType`]:
//!
//! - timestamps (with or without offset) become timezone-naive UTC instants;
//!   null and not-a-time become `null`, never a sentinel
//! - date-only values become `YYYY-MM-DD` strings
//! - nullable wide integers become plain `i64`, with absent values zero-filled
//!   and out-of-range values rejected
//! - any remaining missing value (e.g. float `NaN`) becomes `null`
//!
//! Columns without a declared type are typed by probing their first
//! non-missing value. Normalization is pure and deterministic: the same batch
//! always yields the same documents.

pub mod text;

use chrono::SecondsFormat;
use log::debug;
use thiserror::Error;

use crate::model::{CellValue, Column, Document, FieldValue, SemanticType, TabularBatch};

/// Structural errors. Either one fails the whole batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("schema mismatch in column '{column}' at row {row}: expected {expected}, found {found}")]
	SchemaMismatch {
		column: String,
		row: usize,
		expected: SemanticType,
		found: String,
	},
	#[error(
		"numeric overflow in column '{column}' at row {row}: {value} does not fit in a signed 64-bit integer"
	)]
	NumericOverflow {
		column: String,
		row: usize,
		value: i128,
	},
}

/// Per-cell failure, lifted into a [`NormalizeError`] once column and row are known.
#[derive(Debug)]
enum CellError {
	Mismatch(String),
	Overflow(i128),
}

/// Normalize `batch` into one document per row, preserving row order.
pub fn normalize(batch: &TabularBatch) -> Result<Vec<Document>, NormalizeError> {
	let mut columns = Vec::with_capacity(batch.num_columns());
	for column in batch.columns() {
		columns.push((column.name.as_str(), normalize_column(column)?.into_iter()));
	}

	let mut documents = Vec::with_capacity(batch.num_rows());
	for _ in 0..batch.num_rows() {
		let mut doc = Document::with_capacity(columns.len());
		for (name, values) in columns.iter_mut() {
			doc.push(name.to_string(), values.next().unwrap_or(FieldValue::Null));
		}
		documents.push(doc);
	}

	debug!(
		"normalized {} rows x {} columns",
		batch.num_rows(),
		batch.num_columns()
	);
	Ok(documents)
}

/// Normalize a single column into its output values.
pub fn normalize_column(column: &Column) -> Result<Vec<FieldValue>, NormalizeError> {
	let semantic = match column.semantic.or_else(|| probe_semantic(&column.values)) {
		Some(s) => s,
		// Undeclared and entirely missing: nothing to infer from.
		None => return Ok(vec![FieldValue::Null; column.len()]),
	};

	column
		.values
		.iter()
		.enumerate()
		.map(|(row, value)| {
			normalize_cell(semantic, value).map_err(|e| match e {
				CellError::Mismatch(found) => NormalizeError::SchemaMismatch {
					column: column.name.clone(),
					row,
					expected: semantic,
					found,
				},
				CellError::Overflow(value) => NormalizeError::NumericOverflow {
					column: column.name.clone(),
					row,
					value,
				},
			})
		})
		.collect()
}

/// Fallback typing for undeclared columns: the first non-missing value decides.
pub fn probe_semantic(values: &[CellValue]) -> Option<SemanticType> {
	let first = values.iter().find(|v| !v.is_missing())?;
	Some(match first {
		CellValue::Timestamp(_) => SemanticType::TimestampNaive,
		CellValue::TimestampTz(_) => SemanticType::TimestampTz,
		CellValue::Date(_) => SemanticType::DateOnly,
		CellValue::Int(_) => SemanticType::NullableWideInt,
		CellValue::Float(_) => SemanticType::Float64,
		CellValue::Bool(_) => SemanticType::Boolean,
		CellValue::Text(_) | CellValue::Null | CellValue::NotATime => SemanticType::PlainString,
	})
}

fn normalize_cell(semantic: SemanticType, value: &CellValue) -> Result<FieldValue, CellError> {
	match semantic {
		SemanticType::TimestampTz | SemanticType::TimestampNaive => timestamp(value),
		SemanticType::DateOnly => date(value),
		SemanticType::NullableWideInt => wide_int(value),
		SemanticType::Float64 => float(value),
		SemanticType::PlainString => Ok(string(value)),
		SemanticType::Boolean => boolean(value),
	}
}

fn mismatch(value: &CellValue) -> CellError {
	match value {
		CellValue::Text(s) => CellError::Mismatch(format!("text {:?}", s)),
		other => CellError::Mismatch(other.kind().to_string()),
	}
}

fn timestamp(value: &CellValue) -> Result<FieldValue, CellError> {
	match value {
		CellValue::Null | CellValue::NotATime => Ok(FieldValue::Null),
		CellValue::Timestamp(naive) => Ok(FieldValue::DateTime(*naive)),
		CellValue::TimestampTz(dt) => Ok(FieldValue::DateTime(dt.naive_utc())),
		CellValue::Text(s) if text::is_missing_token(s) => Ok(FieldValue::Null),
		CellValue::Text(s) => match text::parse_timestamp(s) {
			Some(parsed) => timestamp(&parsed),
			None => Err(mismatch(value)),
		},
		_ => Err(mismatch(value)),
	}
}

fn date(value: &CellValue) -> Result<FieldValue, CellError> {
	match value {
		CellValue::Null | CellValue::NotATime => Ok(FieldValue::Null),
		CellValue::Date(d) => Ok(FieldValue::String(d.format("%Y-%m-%d").to_string())),
		CellValue::Text(s) if text::is_missing_token(s) => Ok(FieldValue::Null),
		CellValue::Text(s) => match text::parse_date(s) {
			Some(d) => Ok(FieldValue::String(d.format("%Y-%m-%d").to_string())),
			None => Err(mismatch(value)),
		},
		_ => Err(mismatch(value)),
	}
}

fn narrow(value: i128) -> Result<FieldValue, CellError> {
	i64::try_from(value)
		.map(FieldValue::Int)
		.map_err(|_| CellError::Overflow(value))
}

fn wide_int(value: &CellValue) -> Result<FieldValue, CellError> {
	match value {
		// Zero-fill keeps derived numeric fields directly aggregable.
		CellValue::Null | CellValue::NotATime => Ok(FieldValue::Int(0)),
		CellValue::Int(v) => narrow(*v),
		CellValue::Float(f) if f.is_nan() => Ok(FieldValue::Int(0)),
		CellValue::Float(f) => match text::float_to_integer(*f) {
			Some(v) => narrow(v),
			None => Err(mismatch(value)),
		},
		CellValue::Text(s) if text::is_missing_token(s) => Ok(FieldValue::Int(0)),
		CellValue::Text(s) => match text::parse_integer(s) {
			Some(v) => narrow(v),
			None => Err(mismatch(value)),
		},
		_ => Err(mismatch(value)),
	}
}

fn float(value: &CellValue) -> Result<FieldValue, CellError> {
	let f = match value {
		CellValue::Null | CellValue::NotATime => return Ok(FieldValue::Null),
		CellValue::Float(f) => *f,
		CellValue::Int(v) => *v as f64,
		CellValue::Text(s) if text::is_missing_token(s) => return Ok(FieldValue::Null),
		CellValue::Text(s) => text::parse_float(s).ok_or_else(|| mismatch(value))?,
		_ => return Err(mismatch(value)),
	};
	if f.is_nan() {
		Ok(FieldValue::Null)
	} else {
		Ok(FieldValue::Float(f))
	}
}

fn string(value: &CellValue) -> FieldValue {
	match value {
		CellValue::Null | CellValue::NotATime => FieldValue::Null,
		CellValue::Float(f) if f.is_nan() => FieldValue::Null,
		CellValue::Text(s) => FieldValue::String(s.clone()),
		CellValue::Int(v) => FieldValue::String(v.to_string()),
		CellValue::Float(f) => FieldValue::String(f.to_string()),
		CellValue::Bool(b) => FieldValue::String(b.to_string()),
		CellValue::Date(d) => FieldValue::String(d.format("%Y-%m-%d").to_string()),
		CellValue::Timestamp(t) => {
			FieldValue::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
		}
		CellValue::TimestampTz(t) => {
			FieldValue::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, false))
		}
	}
}

fn boolean(value: &CellValue) -> Result<FieldValue, CellError> {
	match value {
		CellValue::Null | CellValue::NotATime => Ok(FieldValue::Null),
		CellValue::Bool(b) => Ok(FieldValue::Bool(*b)),
		CellValue::Int(0) => Ok(FieldValue::Bool(false)),
		CellValue::Int(1) => Ok(FieldValue::Bool(true)),
		CellValue::Text(s) if text::is_missing_token(s) => Ok(FieldValue::Null),
		CellValue::Text(s) => text::parse_bool(s)
			.map(FieldValue::Bool)
			.ok_or_else(|| mismatch(value)),
		_ => Err(mismatch(value)),
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

	use super::*;

	fn naive(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
		NaiveDate::from_ymd_opt(y, m, d)
			.unwrap()
			.and_hms_opt(h, min, s)
			.unwrap()
	}

	fn single(column: Column) -> Vec<FieldValue> {
		let batch = TabularBatch::new(vec![column]).unwrap();
		normalize(&batch)
			.unwrap()
			.into_iter()
			.map(|doc| doc.iter().next().unwrap().1.clone())
			.collect()
	}

	#[test]
	fn offset_timestamps_become_naive_utc_and_round_trip() {
		let offsets = [
			FixedOffset::east_opt(5 * 3600).unwrap(),
			FixedOffset::west_opt(4 * 3600 + 1800).unwrap(),
			FixedOffset::east_opt(0).unwrap(),
		];
		let originals: Vec<_> = offsets
			.iter()
			.map(|o| o.from_local_datetime(&naive(2025, 3, 9, 1, 30, 0)).single().unwrap())
			.collect();
		let mut values: Vec<CellValue> =
			originals.iter().map(|dt| CellValue::TimestampTz(*dt)).collect();
		values.push(CellValue::Null);
		values.push(CellValue::NotATime);

		let out = single(Column::new("t", SemanticType::TimestampTz, values));

		for (original, got) in originals.iter().zip(&out) {
			let utc = got.as_datetime().expect("instant");
			let relocalized = Utc.from_utc_datetime(&utc).with_timezone(original.offset());
			assert_eq!(&relocalized, original);
		}
		assert_eq!(out[0].as_datetime(), Some(naive(2025, 3, 8, 20, 30, 0)));
		assert_eq!(out[3], FieldValue::Null);
		assert_eq!(out[4], FieldValue::Null);
	}

	#[test]
	fn naive_timestamps_pass_through() {
		let t = naive(2025, 1, 1, 0, 15, 0);
		let out = single(Column::new(
			"t",
			SemanticType::TimestampNaive,
			vec![
				CellValue::Timestamp(t),
				CellValue::Text("2025-01-01 00:15:00".into()),
				CellValue::Text("NaT".into()),
			],
		));
		assert_eq!(
			out,
			vec![
				FieldValue::DateTime(t),
				FieldValue::DateTime(t),
				FieldValue::Null
			]
		);
	}

	#[test]
	fn unparseable_timestamp_is_schema_mismatch() {
		let batch = TabularBatch::new(vec![Column::new(
			"pickup_datetime",
			SemanticType::TimestampNaive,
			vec![
				CellValue::Timestamp(naive(2025, 1, 1, 0, 0, 0)),
				CellValue::Text("soon".into()),
			],
		)])
		.unwrap();
		match normalize(&batch).unwrap_err() {
			NormalizeError::SchemaMismatch {
				column,
				row,
				expected,
				..
			} => {
				assert_eq!(column, "pickup_datetime");
				assert_eq!(row, 1);
				assert_eq!(expected, SemanticType::TimestampNaive);
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn dates_render_as_iso_strings() {
		let d = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
		let out = single(Column::new(
			"pickup_date",
			SemanticType::DateOnly,
			vec![CellValue::Date(d), CellValue::Null, CellValue::Text("2025-03-01".into())],
		));
		assert_eq!(out[0], FieldValue::String("2025-02-28".into()));
		assert_eq!(out[1], FieldValue::Null);
		let back = NaiveDate::parse_from_str(out[2].as_str().unwrap(), "%Y-%m-%d").unwrap();
		assert_eq!(back, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
	}

	#[test]
	fn date_column_rejects_timestamps() {
		let batch = TabularBatch::new(vec![Column::new(
			"d",
			SemanticType::DateOnly,
			vec![CellValue::Timestamp(naive(2025, 1, 1, 0, 0, 0))],
		)])
		.unwrap();
		assert!(matches!(
			normalize(&batch),
			Err(NormalizeError::SchemaMismatch { .. })
		));
	}

	#[test]
	fn wide_ints_zero_fill_and_narrow() {
		let out = single(Column::new(
			"PULocationID",
			SemanticType::NullableWideInt,
			vec![
				CellValue::Int(132),
				CellValue::Null,
				CellValue::Int(i64::MIN as i128),
				CellValue::Float(f64::NAN),
				CellValue::Text("17".into()),
			],
		));
		assert_eq!(
			out,
			vec![
				FieldValue::Int(132),
				FieldValue::Int(0),
				FieldValue::Int(i64::MIN),
				FieldValue::Int(0),
				FieldValue::Int(17),
			]
		);
	}

	#[test]
	fn wide_int_overflow_is_reported() {
		let too_big = i64::MAX as i128 + 1;
		let batch = TabularBatch::new(vec![Column::new(
			"trip_time",
			SemanticType::NullableWideInt,
			vec![CellValue::Int(1), CellValue::Int(too_big)],
		)])
		.unwrap();
		assert_eq!(
			normalize(&batch).unwrap_err(),
			NormalizeError::NumericOverflow {
				column: "trip_time".into(),
				row: 1,
				value: too_big,
			}
		);
	}

	#[test]
	fn float_nan_becomes_null() {
		let out = single(Column::new(
			"tips",
			SemanticType::Float64,
			vec![
				CellValue::Float(2.5),
				CellValue::Float(f64::NAN),
				CellValue::Int(3),
				CellValue::Text("nan".into()),
			],
		));
		assert_eq!(
			out,
			vec![
				FieldValue::Float(2.5),
				FieldValue::Null,
				FieldValue::Float(3.0),
				FieldValue::Null
			]
		);
	}

	#[test]
	fn undeclared_columns_are_probed() {
		let d = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
		let batch = TabularBatch::new(vec![
			Column::undeclared("d", vec![CellValue::Null, CellValue::Date(d)]),
			Column::undeclared("n", vec![CellValue::Int(4), CellValue::Null]),
			Column::undeclared("empty", vec![CellValue::Null, CellValue::NotATime]),
		])
		.unwrap();
		let docs = normalize(&batch).unwrap();
		assert_eq!(docs[1].get("d"), Some(&FieldValue::String("2025-05-01".into())));
		assert_eq!(docs[1].get("n"), Some(&FieldValue::Int(0)));
		assert_eq!(docs[0].get("empty"), Some(&FieldValue::Null));
	}

	#[test]
	fn normalization_is_idempotent() {
		let batch = TabularBatch::new(vec![
			Column::new(
				"t",
				SemanticType::TimestampNaive,
				vec![CellValue::Timestamp(naive(2025, 1, 1, 1, 1, 1)), CellValue::NotATime],
			),
			Column::new(
				"f",
				SemanticType::Float64,
				vec![CellValue::Float(1.25), CellValue::Float(f64::NAN)],
			),
			Column::new(
				"s",
				SemanticType::PlainString,
				vec![CellValue::Text("N".into()), CellValue::Null],
			),
		])
		.unwrap();
		let first = normalize(&batch).unwrap();
		let second = normalize(&batch).unwrap();
		assert_eq!(first, second);
		assert_eq!(first.len(), 2);
		assert_eq!(first[0].keys().collect::<Vec<_>>(), vec!["t", "f", "s"]);
	}

	#[test]
	fn empty_batch_yields_no_documents() {
		let docs = normalize(&TabularBatch::default()).unwrap();
		assert!(docs.is_empty());
	}
}
