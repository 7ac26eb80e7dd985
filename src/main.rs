use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use trip_ingest::config::{self, Settings};
use trip_ingest::ingest::sample::sample_step;
use trip_ingest::load::BatchLoader;
use trip_ingest::observability::{MetricsRegistry, init_logging, init_metrics};
use trip_ingest::pipeline::{PipelineOptions, RunSummary, run_files};
use trip_ingest::store::{InsertTarget, MongoTarget, NdjsonTarget};

#[derive(Parser)]
#[command(
	name = "trip-ingest",
	about = "trip-ingest - normalize trip records and load them into MongoDB"
)]
struct Cli {
	/// Extra JSON configuration file, layered above the standard locations
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Args)]
struct PrepareArgs {
	/// Parquet, CSV or TSV trip files (CSV/TSV optionally gzip-compressed)
	#[arg(required = true)]
	inputs: Vec<PathBuf>,
	/// Documents per insert call
	#[arg(long)]
	chunk_size: Option<usize>,
	/// Fraction of rows to keep, by systematic sampling
	#[arg(long)]
	sample_fraction: Option<f64>,
	/// Keep every row
	#[arg(long, conflicts_with = "sample_fraction")]
	no_sample: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Load trip files into the configured MongoDB collection
	Load {
		#[command(flatten)]
		prepare: PrepareArgs,
		/// Remove existing documents from the collection first
		#[arg(long)]
		clear: bool,
		/// Write Prometheus metrics to this file when the run ends
		#[arg(long)]
		metrics_file: Option<PathBuf>,
	},
	/// Write normalized documents to a newline-delimited JSON file
	Export {
		#[command(flatten)]
		prepare: PrepareArgs,
		#[arg(long, short)]
		output: PathBuf,
	},
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	match run(cli).await {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(e) => {
			eprintln!("trip-ingest: {:#}", e);
			ExitCode::FAILURE
		}
	}
}

/// Returns `Ok(false)` when some input file was skipped or the run was interrupted.
async fn run(cli: Cli) -> Result<bool> {
	let settings = config::load_with(cli.config.as_deref())?;
	init_logging(settings.log_level.to_level_filter())?;
	let metrics = init_metrics()?;

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				warn!("interrupt received, stopping after the current chunk");
				cancel.cancel();
			}
		});
	}

	let summary = match cli.command {
		Commands::Load {
			prepare,
			clear,
			metrics_file,
		} => {
			let target = Arc::new(
				MongoTarget::connect(
					settings.mongo_uri.as_str(),
					&settings.database,
					&settings.collection,
					settings.server_selection_timeout(),
				)
				.await?,
			);
			if clear {
				let removed = target.clear().await?;
				info!("removed {} existing documents", removed);
			}

			let summary = execute(&prepare, &settings, target.clone(), &cancel, metrics.clone()).await?;
			info!("collection now holds {} documents", target.count().await?);

			if let Some(path) = metrics_file {
				std::fs::write(&path, metrics.encode())
					.with_context(|| format!("failed to write metrics to {}", path.display()))?;
			}
			summary
		}
		Commands::Export { prepare, output } => {
			let target = Arc::new(
				NdjsonTarget::create(&output)
					.with_context(|| format!("failed to create {}", output.display()))?,
			);
			let summary = execute(&prepare, &settings, target, &cancel, metrics).await?;
			info!("wrote {} documents to {}", summary.load.confirmed, output.display());
			summary
		}
	};

	println!("{}", serde_json::to_string_pretty(&summary)?);
	Ok(summary.files_failed.is_empty() && !summary.load.cancelled)
}

async fn execute(
	args: &PrepareArgs,
	settings: &Settings,
	target: Arc<dyn InsertTarget>,
	cancel: &CancellationToken,
	metrics: Arc<MetricsRegistry>,
) -> Result<RunSummary> {
	let sample_fraction = if args.no_sample {
		None
	} else {
		let fraction = args.sample_fraction.unwrap_or(settings.sample_fraction);
		sample_step(fraction)?;
		Some(fraction)
	};
	let options = PipelineOptions {
		schema: settings.columns.clone(),
		sample_fraction,
		limits: settings.trip_limits(),
	};

	let mut loader = BatchLoader::new(target, args.chunk_size.unwrap_or(settings.chunk_size))?
		.with_metrics(metrics.clone());
	if let Some(timeout) = settings.chunk_timeout() {
		loader = loader.with_chunk_timeout(timeout);
	}

	Ok(run_files(&args.inputs, &options, &loader, cancel, Some(metrics)).await)
}
