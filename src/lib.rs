pub mod config;
pub mod ingest;
pub mod load;
pub mod model;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod store;

pub use load::{BatchLoader, LoadResult};
pub use model::{CellValue, Column, Document, FieldValue, SemanticType, TabularBatch};
pub use normalize::{NormalizeError, normalize};
