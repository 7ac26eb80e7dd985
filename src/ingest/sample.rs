use thiserror::Error;

use crate::model::{BatchError, TabularBatch};

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
	#[error("sample fraction must be in (0, 1], got {0}")]
	InvalidFraction(f64),
	#[error(transparent)]
	Batch(#[from] BatchError),
}

/// Step between kept rows for a given fraction, e.g. `0.025` keeps every 40th row.
pub fn sample_step(fraction: f64) -> Result<usize, SampleError> {
	if !(fraction > 0.0 && fraction <= 1.0) {
		return Err(SampleError::InvalidFraction(fraction));
	}
	Ok(((1.0 / fraction) as usize).max(1))
}

/// Keep rows `0, step, 2*step, ...` so the sample spreads evenly over the file.
pub fn systematic_sample(batch: &TabularBatch, fraction: f64) -> Result<TabularBatch, SampleError> {
	let step = sample_step(fraction)?;
	if step == 1 {
		return Ok(batch.clone());
	}
	let indices: Vec<usize> = (0..batch.num_rows()).step_by(step).collect();
	Ok(batch.take_rows(&indices)?)
}
