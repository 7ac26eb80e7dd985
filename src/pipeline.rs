//! File-level orchestration: read, sample, derive, normalize, then load.
//!
//! Files are prepared on the blocking pool and loaded one after another
//! through a single [`BatchLoader`]. A file that cannot be prepared is logged
//! and skipped; it never stops the remaining files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::ingest::derive::{TripLimits, derive_trip_fields};
use crate::ingest::reader::read_file;
use crate::ingest::sample::systematic_sample;
use crate::ingest::schema::{ColumnSpec, hvfhv_schema};
use crate::load::{BatchLoader, LoadResult};
use crate::model::Document;
use crate::normalize::normalize;
use crate::observability::MetricsRegistry;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
	pub schema: Vec<ColumnSpec>,
	/// `None` keeps every row.
	pub sample_fraction: Option<f64>,
	pub limits: TripLimits,
}

impl Default for PipelineOptions {
	fn default() -> Self {
		Self {
			schema: hvfhv_schema(),
			sample_fraction: Some(0.025),
			limits: TripLimits::default(),
		}
	}
}

/// Normalized documents for one input file, ready to load.
#[derive(Debug)]
pub struct PreparedFile {
	pub path: PathBuf,
	pub rows_read: usize,
	pub documents: Vec<Document>,
}

impl PreparedFile {
	/// Rows removed by sampling and trip filtering.
	pub fn rows_dropped(&self) -> usize {
		self.rows_read.saturating_sub(self.documents.len())
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
	pub path: PathBuf,
	pub reason: String,
}

/// Load result of one prepared file. Chunk indices in `load` count from zero
/// within this file.
#[derive(Debug, Clone, Serialize)]
pub struct FileLoad {
	pub path: PathBuf,
	pub rows_read: usize,
	pub load: LoadResult,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
	/// Files that were prepared and submitted, in input order.
	pub files: Vec<FileLoad>,
	pub files_failed: Vec<FileFailure>,
	/// Totals over `files`.
	pub load: LoadResult,
}

impl RunSummary {
	pub fn files_loaded(&self) -> usize {
		self.files.len()
	}

	pub fn is_clean(&self) -> bool {
		self.files_failed.is_empty() && self.load.is_clean()
	}

	/// The per-file result for `path`, if it was loaded.
	pub fn file(&self, path: &Path) -> Option<&FileLoad> {
		self.files.iter().find(|f| f.path == path)
	}
}

/// Read, sample, derive and normalize one file.
pub fn prepare_file(path: &Path, options: &PipelineOptions) -> Result<PreparedFile> {
	let batch = read_file(path, &options.schema)?;
	let rows_read = batch.num_rows();

	let sampled = match options.sample_fraction {
		Some(fraction) => systematic_sample(&batch, fraction)?,
		None => batch,
	};
	let derived = derive_trip_fields(sampled, &options.limits)
		.with_context(|| format!("failed to derive trip fields for {}", path.display()))?;
	let documents =
		normalize(&derived).with_context(|| format!("failed to normalize {}", path.display()))?;

	info!(
		"prepared {}: {} rows read, {} documents",
		path.display(),
		rows_read,
		documents.len()
	);
	Ok(PreparedFile {
		path: path.to_path_buf(),
		rows_read,
		documents,
	})
}

/// Prepare and load each file in order. Each file's result is kept in
/// [`RunSummary::files`] and merged into the run totals.
pub async fn run_files(
	paths: &[PathBuf],
	options: &PipelineOptions,
	loader: &BatchLoader,
	cancel: &CancellationToken,
	metrics: Option<Arc<MetricsRegistry>>,
) -> RunSummary {
	let mut summary = RunSummary::default();

	for path in paths {
		if cancel.is_cancelled() {
			info!("run cancelled before {}", path.display());
			summary.load.cancelled = true;
			break;
		}

		let prepared = {
			let path = path.clone();
			let options = options.clone();
			tokio::task::spawn_blocking(move || prepare_file(&path, &options))
				.await
				.context("prepare task panicked")
				.and_then(|r| r)
		};

		let prepared = match prepared {
			Ok(p) => p,
			Err(e) => {
				warn!("skipping {}: {:#}", path.display(), e);
				if let Some(m) = &metrics {
					m.files_failed_total.inc();
				}
				summary.files_failed.push(FileFailure {
					path: path.clone(),
					reason: format!("{:#}", e),
				});
				continue;
			}
		};

		if let Some(m) = &metrics {
			m.rows_read_total.inc_by(prepared.rows_read as u64);
			m.rows_filtered_total.inc_by(prepared.rows_dropped() as u64);
			m.documents_normalized_total
				.inc_by(prepared.documents.len() as u64);
		}

		let result = loader
			.load_with_cancel(prepared.documents, cancel)
			.await;
		info!(
			"{}: {} of {} documents confirmed",
			path.display(),
			result.confirmed,
			result.attempted
		);
		summary.load.merge(result.clone());
		summary.files.push(FileLoad {
			path: prepared.path,
			rows_read: prepared.rows_read,
			load: result,
		});
	}

	summary
}
