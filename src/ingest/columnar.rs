//! Parquet input through Arrow record batches.
//!
//! Unlike the delimited reader, Parquet cells arrive already typed: Arrow
//! timestamps keep their zone, dates stay dates and integer columns carry
//! real nulls. The file's own column types decide the semantic type; the
//! declared schema only types text columns, which are then coerced like
//! delimited input.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::timezone::Tz;
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
	DataType, Date32Type, Float64Type, Int64Type, Schema, TimeUnit, UInt64Type,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::schema::{ColumnSpec, declared_type};
use crate::model::{CellValue, Column, SemanticType, TabularBatch};

/// Days from 0001-01-01 to the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Read a whole Parquet file into one batch.
pub fn read_parquet(path: &Path, schema: &[ColumnSpec]) -> Result<TabularBatch> {
	let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
	let builder = ParquetRecordBatchReaderBuilder::try_new(file)
		.with_context(|| format!("failed to read parquet metadata of {}", path.display()))?;
	let arrow_schema = builder.schema().clone();
	debug!(
		"reading {} as parquet: {} row groups, {} columns",
		path.display(),
		builder.metadata().num_row_groups(),
		arrow_schema.fields().len()
	);

	let reader = builder.build()?;
	from_record_batches(&arrow_schema, reader, schema)
		.with_context(|| format!("failed to read {}", path.display()))
}

/// Concatenate record batches sharing `arrow_schema` into one batch.
pub fn from_record_batches<I>(arrow_schema: &Schema, batches: I, schema: &[ColumnSpec]) -> Result<TabularBatch>
where
	I: IntoIterator<Item = Result<RecordBatch, ArrowError>>,
{
	let fields = arrow_schema.fields();
	let mut values: Vec<Vec<CellValue>> = vec![Vec::new(); fields.len()];

	for batch in batches {
		let batch = batch?;
		if batch.num_columns() != fields.len() {
			bail!(
				"record batch has {} columns, schema has {}",
				batch.num_columns(),
				fields.len()
			);
		}
		for (out, array) in values.iter_mut().zip(batch.columns()) {
			append_cells(array, out)?;
		}
	}

	let columns = fields
		.iter()
		.zip(values)
		.map(|(field, values)| Column {
			semantic: semantic_for(field.data_type())
				.or_else(|| declared_type(schema, field.name())),
			name: field.name().clone(),
			values,
		})
		.collect();

	Ok(TabularBatch::new(columns)?)
}

/// Semantic type implied by an Arrow type; `None` for text.
pub fn semantic_for(data_type: &DataType) -> Option<SemanticType> {
	match data_type {
		DataType::Timestamp(_, Some(_)) => Some(SemanticType::TimestampTz),
		DataType::Timestamp(_, None) => Some(SemanticType::TimestampNaive),
		DataType::Date32 | DataType::Date64 => Some(SemanticType::DateOnly),
		DataType::Boolean => Some(SemanticType::Boolean),
		dt if dt.is_integer() => Some(SemanticType::NullableWideInt),
		dt if dt.is_floating() => Some(SemanticType::Float64),
		_ => None,
	}
}

fn append_cells(array: &ArrayRef, out: &mut Vec<CellValue>) -> Result<()> {
	match array.data_type() {
		DataType::Timestamp(unit, tz) => {
			let zone = tz.as_deref().map(str::parse::<Tz>).transpose()?;
			let raw = cast(array, &DataType::Int64)?;
			for v in raw.as_primitive::<Int64Type>().iter() {
				let Some(v) = v else {
					out.push(CellValue::Null);
					continue;
				};
				let utc = instant(*unit, v).ok_or_else(|| anyhow!("timestamp {v} out of range"))?;
				out.push(match &zone {
					Some(zone) => CellValue::TimestampTz(utc.with_timezone(zone).fixed_offset()),
					None => CellValue::Timestamp(utc.naive_utc()),
				});
			}
		}
		DataType::Date32 | DataType::Date64 => {
			let days = cast(array, &DataType::Date32)?;
			for v in days.as_primitive::<Date32Type>().iter() {
				out.push(match v {
					None => CellValue::Null,
					Some(v) => CellValue::Date(
						v.checked_add(EPOCH_DAYS_FROM_CE)
							.and_then(NaiveDate::from_num_days_from_ce_opt)
							.ok_or_else(|| anyhow!("date {v} out of range"))?,
					),
				});
			}
		}
		DataType::UInt64 => {
			for v in array.as_primitive::<UInt64Type>().iter() {
				out.push(v.map_or(CellValue::Null, |v| CellValue::Int(v.into())));
			}
		}
		dt if dt.is_integer() => {
			let wide = cast(array, &DataType::Int64)?;
			for v in wide.as_primitive::<Int64Type>().iter() {
				out.push(v.map_or(CellValue::Null, |v| CellValue::Int(v.into())));
			}
		}
		dt if dt.is_floating() => {
			let wide = cast(array, &DataType::Float64)?;
			for v in wide.as_primitive::<Float64Type>().iter() {
				out.push(v.map_or(CellValue::Null, CellValue::Float));
			}
		}
		DataType::Boolean => {
			for v in array.as_boolean().iter() {
				out.push(v.map_or(CellValue::Null, CellValue::Bool));
			}
		}
		DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _) => {
			let text = cast(array, &DataType::Utf8)?;
			for v in text.as_string::<i32>().iter() {
				out.push(v.map_or(CellValue::Null, |s| CellValue::Text(s.to_string())));
			}
		}
		other => bail!("unsupported column type {other}"),
	}
	Ok(())
}

fn instant(unit: TimeUnit, value: i64) -> Option<DateTime<Utc>> {
	match unit {
		TimeUnit::Second => DateTime::from_timestamp(value, 0),
		TimeUnit::Millisecond => DateTime::from_timestamp_millis(value),
		TimeUnit::Microsecond => DateTime::from_timestamp_micros(value),
		TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(value)),
	}
}
