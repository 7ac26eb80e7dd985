use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;

use super::columnar::read_parquet;
use super::format_detection::{InputFormat, detect_delimiter, is_gzip, is_parquet};
use super::schema::{ColumnSpec, declared_type};
use crate::model::{CellValue, Column, TabularBatch};

/// Read a delimited table with a header row into a batch of text cells.
///
/// Empty fields become `Null`; everything else is kept as raw `Text` and
/// coerced later according to the column's declared type. Columns missing
/// from `schema` are left undeclared.
pub fn read_table<R: Read>(reader: R, delimiter: u8, schema: &[ColumnSpec]) -> Result<TabularBatch> {
	let mut rdr = csv::ReaderBuilder::new()
		.has_headers(true)
		.delimiter(delimiter)
		.trim(csv::Trim::All)
		.from_reader(reader);

	let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
	let mut values: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];

	for (line, result) in rdr.records().enumerate() {
		let record = result.with_context(|| format!("malformed record {}", line + 1))?;
		for (column, field) in values.iter_mut().zip(record.iter()) {
			column.push(if field.is_empty() {
				CellValue::Null
			} else {
				CellValue::Text(field.to_string())
			});
		}
	}

	let columns = headers
		.into_iter()
		.zip(values)
		.map(|(name, values)| Column {
			semantic: declared_type(schema, &name),
			name,
			values,
		})
		.collect();

	Ok(TabularBatch::new(columns)?)
}

/// Open `path` (Parquet, or plain or gzip-compressed CSV/TSV) and read it as
/// one batch. The format is detected from the leading bytes.
pub fn read_file(path: &Path, schema: &[ColumnSpec]) -> Result<TabularBatch> {
	let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
	let mut raw = BufReader::new(file);
	let peek = raw.fill_buf()?;
	if is_parquet(peek) {
		return read_parquet(path, schema);
	}
	let gzip = is_gzip(peek);

	let mut input: Box<dyn BufRead> = if gzip {
		Box::new(BufReader::new(GzDecoder::new(raw)))
	} else {
		Box::new(raw)
	};
	let delimiter = detect_delimiter(input.fill_buf()?);
	let format = InputFormat::Delimited { delimiter, gzip };
	debug!("reading {} as {}", path.display(), format.as_str());

	read_table(input, delimiter, schema).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use std::io::Write;

	use flate2::Compression;
	use flate2::write::GzEncoder;

	use super::*;
	use crate::model::SemanticType;

	const SAMPLE: &str = "pickup_datetime,PULocationID,extra\n\
2025-01-01 00:10:00,132,a\n\
,, \n";

	fn schema() -> Vec<ColumnSpec> {
		vec![
			ColumnSpec::new("pickup_datetime", SemanticType::TimestampNaive),
			ColumnSpec::new("PULocationID", SemanticType::NullableWideInt),
		]
	}

	#[test]
	fn reads_text_cells_with_declared_types() {
		let batch = read_table(SAMPLE.as_bytes(), b',', &schema()).expect("read");
		assert_eq!(batch.num_rows(), 2);
		let pickup = batch.column("pickup_datetime").unwrap();
		assert_eq!(pickup.semantic, Some(SemanticType::TimestampNaive));
		assert_eq!(pickup.values[0], CellValue::Text("2025-01-01 00:10:00".into()));
		assert_eq!(pickup.values[1], CellValue::Null);
		assert_eq!(batch.column("extra").unwrap().semantic, None);
		assert_eq!(batch.column("extra").unwrap().values[1], CellValue::Null);
	}

	#[test]
	fn rejects_ragged_records() {
		let csv = "a,b\n1,2\n3\n";
		assert!(read_table(csv.as_bytes(), b',', &[]).is_err());
	}

	#[test]
	fn reads_gzip_tsv_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("trips.tsv.gz");
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder
			.write_all(b"PULocationID\ttrip_miles\n7\t1.5\n8\t2.5\n")
			.unwrap();
		std::fs::write(&path, encoder.finish().unwrap()).unwrap();

		let batch = read_file(&path, &schema()).expect("read gzip");
		assert_eq!(batch.num_rows(), 2);
		assert_eq!(batch.num_columns(), 2);
		assert_eq!(
			batch.column("trip_miles").unwrap().values[1],
			CellValue::Text("2.5".into())
		);
	}

	#[test]
	fn missing_file_is_an_error() {
		let err = read_file(Path::new("/nonexistent/trips.csv"), &[]).unwrap_err();
		assert!(err.to_string().contains("failed to open"));
	}
}
