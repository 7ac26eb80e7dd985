//! In-memory tabular batches and the documents produced from them.
//!
//! A [`TabularBatch`] is a set of equally long, uniquely named columns. Each
//! column carries an optional [`SemanticType`]; when it is absent the
//! normalizer falls back to probing the first non-missing value.
//!
//! A [`Document`] is a flat, ordered, unique-keyed mapping whose values are
//! restricted to the scalar kinds a schemaless document store accepts.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Logical type of a column, independent of how its cells are held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
	TimestampTz,
	TimestampNaive,
	DateOnly,
	NullableWideInt,
	Float64,
	PlainString,
	Boolean,
}

impl SemanticType {
	pub fn as_str(&self) -> &'static str {
		match self {
			SemanticType::TimestampTz => "timestamp_tz",
			SemanticType::TimestampNaive => "timestamp_naive",
			SemanticType::DateOnly => "date_only",
			SemanticType::NullableWideInt => "nullable_wide_int",
			SemanticType::Float64 => "float64",
			SemanticType::PlainString => "plain_string",
			SemanticType::Boolean => "boolean",
		}
	}

	pub fn is_timestamp(&self) -> bool {
		matches!(self, SemanticType::TimestampTz | SemanticType::TimestampNaive)
	}
}

impl fmt::Display for SemanticType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One cell of a source batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
	Null,
	/// Explicit not-a-time sentinel produced by lenient timestamp coercion.
	NotATime,
	/// Raw text from a text-based reader; coerced according to the column type.
	Text(String),
	/// Held wide so values outside the signed 64-bit range stay detectable.
	Int(i128),
	Float(f64),
	Bool(bool),
	Timestamp(NaiveDateTime),
	TimestampTz(DateTime<FixedOffset>),
	Date(NaiveDate),
}

impl CellValue {
	/// True for `Null` and `NotATime`.
	pub fn is_missing(&self) -> bool {
		matches!(self, CellValue::Null | CellValue::NotATime)
	}

	/// Short name of the variant, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			CellValue::Null => "null",
			CellValue::NotATime => "not-a-time",
			CellValue::Text(_) => "text",
			CellValue::Int(_) => "integer",
			CellValue::Float(_) => "float",
			CellValue::Bool(_) => "boolean",
			CellValue::Timestamp(_) => "timestamp",
			CellValue::TimestampTz(_) => "timestamp with offset",
			CellValue::Date(_) => "date",
		}
	}
}

/// A named column with its declared semantic type, if known.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
	pub name: String,
	pub semantic: Option<SemanticType>,
	pub values: Vec<CellValue>,
}

impl Column {
	pub fn new(name: impl Into<String>, semantic: SemanticType, values: Vec<CellValue>) -> Self {
		Self {
			name: name.into(),
			semantic: Some(semantic),
			values,
		}
	}

	/// A column whose type is decided by probing its values.
	pub fn undeclared(name: impl Into<String>, values: Vec<CellValue>) -> Self {
		Self {
			name: name.into(),
			semantic: None,
			values,
		}
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
	#[error("column '{name}' has {found} rows, expected {expected}")]
	RaggedColumn {
		name: String,
		expected: usize,
		found: usize,
	},
	#[error("duplicate column '{0}'")]
	DuplicateColumn(String),
	#[error("row index {index} out of bounds for batch of {rows} rows")]
	RowOutOfBounds { index: usize, rows: usize },
}

/// Rows × typed columns. All columns have the same length and unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularBatch {
	columns: Vec<Column>,
	rows: usize,
}

impl TabularBatch {
	pub fn new(columns: Vec<Column>) -> Result<Self, BatchError> {
		let rows = columns.first().map(Column::len).unwrap_or(0);
		let mut seen = HashSet::with_capacity(columns.len());
		for col in &columns {
			if !seen.insert(col.name.as_str()) {
				return Err(BatchError::DuplicateColumn(col.name.clone()));
			}
			if col.len() != rows {
				return Err(BatchError::RaggedColumn {
					name: col.name.clone(),
					expected: rows,
					found: col.len(),
				});
			}
		}
		Ok(Self { columns, rows })
	}

	pub fn num_rows(&self) -> usize {
		self.rows
	}

	pub fn num_columns(&self) -> usize {
		self.columns.len()
	}

	pub fn columns(&self) -> &[Column] {
		&self.columns
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|c| c.name == name)
	}

	pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
		self.columns.iter_mut().find(|c| c.name == name)
	}

	pub fn into_columns(self) -> Vec<Column> {
		self.columns
	}

	/// Replace the column with the same name, or append it.
	pub fn set_column(&mut self, column: Column) -> Result<(), BatchError> {
		let found = column.len();
		if !self.columns.is_empty() && found != self.rows {
			return Err(BatchError::RaggedColumn {
				name: column.name,
				expected: self.rows,
				found,
			});
		}
		if self.columns.is_empty() {
			self.rows = column.len();
		}
		match self.columns.iter_mut().find(|c| c.name == column.name) {
			Some(existing) => *existing = column,
			None => self.columns.push(column),
		}
		Ok(())
	}

	/// Build a new batch holding only `indices`, in the given order.
	pub fn take_rows(&self, indices: &[usize]) -> Result<Self, BatchError> {
		if let Some(&index) = indices.iter().find(|&&i| i >= self.rows) {
			return Err(BatchError::RowOutOfBounds {
				index,
				rows: self.rows,
			});
		}
		let columns = self
			.columns
			.iter()
			.map(|c| Column {
				name: c.name.clone(),
				semantic: c.semantic,
				values: indices.iter().map(|&i| c.values[i].clone()).collect(),
			})
			.collect();
		Ok(Self {
			columns,
			rows: indices.len(),
		})
	}
}

/// A scalar that can be written to the destination store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
	Null,
	String(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	/// Timezone-naive UTC instant.
	DateTime(NaiveDateTime),
}

impl FieldValue {
	pub fn is_null(&self) -> bool {
		matches!(self, FieldValue::Null)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			FieldValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			FieldValue::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			FieldValue::Float(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_datetime(&self) -> Option<NaiveDateTime> {
		match self {
			FieldValue::DateTime(v) => Some(*v),
			_ => None,
		}
	}
}

impl Serialize for FieldValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			FieldValue::Null => serializer.serialize_unit(),
			FieldValue::String(s) => serializer.serialize_str(s),
			FieldValue::Int(v) => serializer.serialize_i64(*v),
			FieldValue::Float(v) => serializer.serialize_f64(*v),
			FieldValue::Bool(v) => serializer.serialize_bool(*v),
			FieldValue::DateTime(v) => {
				serializer.collect_str(&v.format("%Y-%m-%dT%H:%M:%S%.3f"))
			}
		}
	}
}

/// Flat, ordered field-name → scalar mapping ready for storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
	fields: Vec<(String, FieldValue)>,
}

impl Document {
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			fields: Vec::with_capacity(capacity),
		}
	}

	/// Set `key`, replacing an existing value in place so order is kept.
	pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
		let key = key.into();
		match self.fields.iter_mut().find(|(k, _)| *k == key) {
			Some((_, v)) => *v = value,
			None => self.fields.push((key, value)),
		}
	}

	/// Append without the uniqueness scan; callers guarantee `key` is new.
	pub(crate) fn push(&mut self, key: String, value: FieldValue) {
		self.fields.push((key, value));
	}

	pub fn get(&self, key: &str) -> Option<&FieldValue> {
		self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
		self.fields.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.fields.iter().map(|(k, _)| k.as_str())
	}
}

impl Serialize for Document {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.fields.len()))?;
		for (k, v) in &self.fields {
			map.serialize_entry(k, v)?;
		}
		map.end()
	}
}
