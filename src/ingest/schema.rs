use serde::{Deserialize, Serialize};

use crate::model::SemanticType;

/// Declared semantic type of one input column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
	pub name: String,
	pub semantic: SemanticType,
}

impl ColumnSpec {
	pub fn new(name: impl Into<String>, semantic: SemanticType) -> Self {
		Self {
			name: name.into(),
			semantic,
		}
	}
}

/// Look up the declared type of `name`.
pub fn declared_type(schema: &[ColumnSpec], name: &str) -> Option<SemanticType> {
	schema.iter().find(|c| c.name == name).map(|c| c.semantic)
}

/// Schema of the NYC high-volume for-hire vehicle trip records.
pub fn hvfhv_schema() -> Vec<ColumnSpec> {
	use SemanticType::*;

	[
		("hvfhs_license_num", PlainString),
		("dispatching_base_num", PlainString),
		("originating_base_num", PlainString),
		("request_datetime", TimestampNaive),
		("on_scene_datetime", TimestampNaive),
		("pickup_datetime", TimestampNaive),
		("dropoff_datetime", TimestampNaive),
		("PULocationID", NullableWideInt),
		("DOLocationID", NullableWideInt),
		("trip_miles", Float64),
		("trip_time", NullableWideInt),
		("base_passenger_fare", Float64),
		("tolls", Float64),
		("bcf", Float64),
		("sales_tax", Float64),
		("congestion_surcharge", Float64),
		("airport_fee", Float64),
		("tips", Float64),
		("driver_pay", Float64),
		("shared_request_flag", PlainString),
		("shared_match_flag", PlainString),
		("access_a_ride_flag", PlainString),
		("wav_request_flag", PlainString),
		("wav_match_flag", PlainString),
		("cbd_congestion_fee", Float64),
	]
	.into_iter()
	.map(|(name, semantic)| ColumnSpec::new(name, semantic))
	.collect()
}
