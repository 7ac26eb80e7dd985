//! Parsing of raw text cells into typed values.
//!
//! Shared by the normalizer (strict: unparseable text is an error) and the
//! trip derivation step (lenient: unparseable timestamps become not-a-time).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::model::CellValue;

/// Text tokens treated as "missing" in every typed, non-string column.
const MISSING_TOKENS: [&str; 5] = ["nat", "nan", "null", "none", "<na>"];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// `%z` does not accept a literal `Z`, so the UTC designator gets its own form.
const UTC_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.fZ";

const NAIVE_FORMATS: [&str; 4] = [
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y-%m-%dT%H:%M",
	"%Y-%m-%d %H:%M",
];

pub fn is_missing_token(input: &str) -> bool {
	let input = input.trim();
	input.is_empty() || MISSING_TOKENS.iter().any(|t| input.eq_ignore_ascii_case(t))
}

/// Parse an instant, keeping its offset when the text carries one.
///
/// Returns `CellValue::TimestampTz` or `CellValue::Timestamp`.
pub fn parse_timestamp(input: &str) -> Option<CellValue> {
	let input = input.trim();

	if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
		return Some(CellValue::TimestampTz(dt));
	}
	for format in &OFFSET_FORMATS {
		if let Ok(dt) = DateTime::parse_from_str(input, format) {
			return Some(CellValue::TimestampTz(dt));
		}
	}
	if let Ok(naive) = NaiveDateTime::parse_from_str(input, UTC_FORMAT) {
		return Some(CellValue::TimestampTz(naive.and_utc().fixed_offset()));
	}
	for format in &NAIVE_FORMATS {
		if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
			return Some(CellValue::Timestamp(naive));
		}
	}
	None
}

pub fn parse_date(input: &str) -> Option<NaiveDate> {
	NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

/// Parse a decimal integer into the wide container. Integral float literals
/// such as `"132.0"` are accepted.
pub fn parse_integer(input: &str) -> Option<i128> {
	let input = input.trim();
	if let Ok(v) = input.parse::<i128>() {
		return Some(v);
	}
	let f = input.parse::<f64>().ok()?;
	float_to_integer(f)
}

/// Integral, finite floats only. Magnitudes beyond `i128` saturate, which is
/// still caught by the 64-bit narrowing check.
pub fn float_to_integer(f: f64) -> Option<i128> {
	if f.is_finite() && f.fract() == 0.0 {
		Some(f as i128)
	} else {
		None
	}
}

pub fn parse_float(input: &str) -> Option<f64> {
	input.trim().parse::<f64>().ok()
}

pub fn parse_bool(input: &str) -> Option<bool> {
	let input = input.trim();
	if input.eq_ignore_ascii_case("true") || input == "1" {
		Some(true)
	} else if input.eq_ignore_ascii_case("false") || input == "0" {
		Some(false)
	} else {
		None
	}
}
