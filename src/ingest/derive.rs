//! Trip-level fields computed from the raw pickup/dropoff columns.
//!
//! Rows with an implausible duration or distance are dropped before any
//! derived column is added, so every surviving row has a valid pickup instant.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use log::debug;
use thiserror::Error;

use crate::model::{BatchError, CellValue, Column, SemanticType, TabularBatch};
use crate::normalize::text;

pub const PICKUP_COLUMN: &str = "pickup_datetime";
pub const DROPOFF_COLUMN: &str = "dropoff_datetime";
pub const MILES_COLUMN: &str = "trip_miles";

#[derive(Debug, Error, PartialEq)]
pub enum DeriveError {
	#[error("required column '{0}' is missing")]
	MissingColumn(String),
	#[error(transparent)]
	Batch(#[from] BatchError),
}

/// Upper bounds (inclusive) for a plausible trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripLimits {
	pub max_duration_minutes: f64,
	pub max_trip_miles: f64,
}

impl Default for TripLimits {
	fn default() -> Self {
		Self {
			max_duration_minutes: 300.0,
			max_trip_miles: 100.0,
		}
	}
}

/// Filter implausible trips and append the derived pickup/duration columns.
pub fn derive_trip_fields(mut batch: TabularBatch, limits: &TripLimits) -> Result<TabularBatch, DeriveError> {
	for required in [PICKUP_COLUMN, DROPOFF_COLUMN, MILES_COLUMN] {
		if batch.column(required).is_none() {
			return Err(DeriveError::MissingColumn(required.to_string()));
		}
	}

	let timestamp_columns: Vec<String> = batch
		.columns()
		.iter()
		.filter(|c| {
			c.semantic.is_some_and(|s| s.is_timestamp())
				|| c.name == PICKUP_COLUMN
				|| c.name == DROPOFF_COLUMN
		})
		.map(|c| c.name.clone())
		.collect();
	for name in &timestamp_columns {
		if let Some(column) = batch.column_mut(name) {
			for value in column.values.iter_mut() {
				coerce_timestamp(value);
			}
		}
	}

	let (kept, durations) = {
		let pickup = batch.column(PICKUP_COLUMN).map(|c| &c.values[..]).unwrap_or(&[]);
		let dropoff = batch.column(DROPOFF_COLUMN).map(|c| &c.values[..]).unwrap_or(&[]);
		let miles = batch.column(MILES_COLUMN).map(|c| &c.values[..]).unwrap_or(&[]);

		let mut kept = Vec::new();
		let mut durations = Vec::new();
		for row in 0..batch.num_rows() {
			let duration = match (instant(&pickup[row]), instant(&dropoff[row])) {
				(Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 60_000.0,
				_ => continue,
			};
			let distance = match distance(&miles[row]) {
				Some(d) => d,
				None => continue,
			};
			if duration > 0.0
				&& duration <= limits.max_duration_minutes
				&& distance > 0.0
				&& distance <= limits.max_trip_miles
			{
				kept.push(row);
				durations.push(duration);
			}
		}
		(kept, durations)
	};

	let total = batch.num_rows();
	let mut filtered = batch.take_rows(&kept)?;
	debug!("kept {} of {} trips within limits", filtered.num_rows(), total);

	let pickups: Vec<NaiveDateTime> = filtered
		.column(PICKUP_COLUMN)
		.map(|c| c.values.iter().filter_map(wall_clock).collect())
		.unwrap_or_default();

	let ints = |f: fn(&NaiveDateTime) -> i128| -> Vec<CellValue> {
		pickups.iter().map(|p| CellValue::Int(f(p))).collect()
	};
	let derived = vec![
		Column::new(
			"trip_duration_minutes",
			SemanticType::Float64,
			durations.into_iter().map(CellValue::Float).collect(),
		),
		Column::new("pickup_hour", SemanticType::NullableWideInt, ints(|p| p.hour() as i128)),
		Column::new(
			"pickup_day_of_week",
			SemanticType::NullableWideInt,
			ints(|p| p.weekday().num_days_from_monday() as i128),
		),
		Column::new(
			"pickup_day_name",
			SemanticType::PlainString,
			pickups
				.iter()
				.map(|p| CellValue::Text(day_name(p.weekday()).to_string()))
				.collect(),
		),
		Column::new("pickup_month", SemanticType::NullableWideInt, ints(|p| p.month() as i128)),
		Column::new(
			"pickup_date",
			SemanticType::DateOnly,
			pickups.iter().map(|p| CellValue::Date(p.date())).collect(),
		),
	];
	for column in derived {
		filtered.set_column(column)?;
	}
	Ok(filtered)
}

/// Lenient coercion: text that is not a recognizable instant becomes not-a-time.
fn coerce_timestamp(value: &mut CellValue) {
	let coerced = match value {
		CellValue::Text(s) if text::is_missing_token(s) => CellValue::Null,
		CellValue::Text(s) => text::parse_timestamp(s).unwrap_or(CellValue::NotATime),
		_ => return,
	};
	*value = coerced;
}

fn instant(value: &CellValue) -> Option<NaiveDateTime> {
	match value {
		CellValue::Timestamp(t) => Some(*t),
		CellValue::TimestampTz(t) => Some(t.naive_utc()),
		_ => None,
	}
}

/// Pickup as read, in the offset it was recorded in.
fn wall_clock(value: &CellValue) -> Option<NaiveDateTime> {
	match value {
		CellValue::Timestamp(t) => Some(*t),
		CellValue::TimestampTz(t) => Some(t.naive_local()),
		_ => None,
	}
}

fn distance(value: &CellValue) -> Option<f64> {
	match value {
		CellValue::Float(f) => Some(*f),
		CellValue::Int(v) => Some(*v as f64),
		CellValue::Text(s) => text::parse_float(s),
		_ => None,
	}
}

fn day_name(day: Weekday) -> &'static str {
	match day {
		Weekday::Mon => "Monday",
		Weekday::Tue => "Tuesday",
		Weekday::Wed => "Wednesday",
		Weekday::Thu => "Thursday",
		Weekday::Fri => "Friday",
		Weekday::Sat => "Saturday",
		Weekday::Sun => "Sunday",
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	fn text(values: &[&str]) -> Vec<CellValue> {
		values
			.iter()
			.map(|v| {
				if v.is_empty() {
					CellValue::Null
				} else {
					CellValue::Text(v.to_string())
				}
			})
			.collect()
	}

	fn trips() -> TabularBatch {
		TabularBatch::new(vec![
			Column::new(
				PICKUP_COLUMN,
				SemanticType::TimestampNaive,
				text(&[
					"2025-01-06 08:00:00",
					"2025-01-06 09:00:00",
					"2025-01-06 10:00:00",
					"2025-01-06 11:00:00",
					"garbage",
					"2025-01-11 23:50:00",
					"2025-01-11 23:50:00",
					"2025-01-07 00:00:00",
				]),
			),
			Column::new(
				DROPOFF_COLUMN,
				SemanticType::TimestampNaive,
				text(&[
					"2025-01-06 08:30:00",
					"2025-01-06 08:55:00",
					"2025-01-06 16:40:00",
					"2025-01-06 11:10:00",
					"2025-01-06 12:00:00",
					"2025-01-12 00:10:00",
					"2025-01-12 00:10:00",
					"2025-01-07 05:00:00",
				]),
			),
			Column::new(
				MILES_COLUMN,
				SemanticType::Float64,
				text(&["5.0", "1.0", "3.0", "0", "2.0", "150", "2.5", "100"]),
			),
			Column::undeclared("hvfhs_license_num", text(&["HV0003"; 8])),
		])
		.unwrap()
	}

	#[test]
	fn filters_implausible_trips() {
		let out = derive_trip_fields(trips(), &TripLimits::default()).unwrap();
		assert_eq!(out.num_rows(), 3);
		assert_eq!(
			out.column("trip_duration_minutes").unwrap().values,
			vec![
				CellValue::Float(30.0),
				CellValue::Float(20.0),
				CellValue::Float(300.0)
			]
		);
		assert_eq!(
			out.column(MILES_COLUMN).unwrap().values,
			text(&["5.0", "2.5", "100"])
		);
	}

	#[test]
	fn adds_pickup_calendar_fields() {
		let out = derive_trip_fields(trips(), &TripLimits::default()).unwrap();
		assert_eq!(
			out.column("pickup_hour").unwrap().values,
			vec![CellValue::Int(8), CellValue::Int(23), CellValue::Int(0)]
		);
		assert_eq!(
			out.column("pickup_day_of_week").unwrap().values,
			vec![CellValue::Int(0), CellValue::Int(5), CellValue::Int(1)]
		);
		assert_eq!(
			out.column("pickup_day_name").unwrap().values,
			text(&["Monday", "Saturday", "Tuesday"])
		);
		assert_eq!(
			out.column("pickup_month").unwrap().values,
			vec![CellValue::Int(1); 3]
		);
		assert_eq!(
			out.column("pickup_date").unwrap().values[0],
			CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap())
		);
	}

	#[test]
	fn coerces_timestamp_columns() {
		let out = derive_trip_fields(trips(), &TripLimits::default()).unwrap();
		assert!(matches!(
			out.column(PICKUP_COLUMN).unwrap().values[0],
			CellValue::Timestamp(_)
		));
	}

	#[test]
	fn tighter_limits_drop_more_rows() {
		let limits = TripLimits {
			max_duration_minutes: 25.0,
			max_trip_miles: 100.0,
		};
		let out = derive_trip_fields(trips(), &limits).unwrap();
		assert_eq!(out.num_rows(), 1);
	}

	#[test]
	fn missing_required_column_is_an_error() {
		let batch = TabularBatch::new(vec![Column::undeclared(PICKUP_COLUMN, text(&["x"]))]).unwrap();
		assert_eq!(
			derive_trip_fields(batch, &TripLimits::default()).unwrap_err(),
			DeriveError::MissingColumn(DROPOFF_COLUMN.to_string())
		);
	}
}
