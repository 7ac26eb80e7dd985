//! Reading trip files into typed batches and shaping them before normalization.

pub mod columnar;
pub mod derive;
pub mod format_detection;
pub mod reader;
pub mod sample;
pub mod schema;

pub use columnar::{from_record_batches, read_parquet};
pub use derive::{DeriveError, TripLimits, derive_trip_fields};
pub use format_detection::InputFormat;
pub use reader::{read_file, read_table};
pub use sample::{SampleError, systematic_sample};
pub use schema::{ColumnSpec, hvfhv_schema};
