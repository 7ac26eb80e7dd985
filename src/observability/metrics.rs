use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

const NAMESPACE: &str = "trip_ingest";

/// Central registry for all Prometheus metrics
pub struct MetricsRegistry {
	registry: Registry,

	// Ingest metrics
	pub rows_read_total: IntCounter,
	pub rows_filtered_total: IntCounter,
	pub documents_normalized_total: IntCounter,
	pub files_failed_total: IntCounter,

	// Load metrics
	pub documents_attempted_total: IntCounter,
	pub documents_confirmed_total: IntCounter,
	pub chunks_submitted_total: IntCounter,
	pub chunk_partial_failures_total: IntCounter,
	pub chunk_total_failures_total: IntCounter,
	pub chunk_latency_seconds: Histogram,
}

impl MetricsRegistry {
	pub fn new() -> prometheus::Result<Self> {
		let registry = Registry::new();

		let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
			let c = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
			registry.register(Box::new(c.clone()))?;
			Ok(c)
		};

		let rows_read_total = counter("rows_read_total", "Rows read from input files")?;
		let rows_filtered_total = counter(
			"rows_filtered_total",
			"Rows dropped by sampling or trip filtering",
		)?;
		let documents_normalized_total = counter(
			"documents_normalized_total",
			"Documents produced by the normalizer",
		)?;
		let files_failed_total = counter(
			"files_failed_total",
			"Input files that could not be read, derived, or normalized",
		)?;
		let documents_attempted_total = counter(
			"documents_attempted_total",
			"Documents submitted to the destination",
		)?;
		let documents_confirmed_total = counter(
			"documents_confirmed_total",
			"Documents the destination confirmed as written",
		)?;
		let chunks_submitted_total = counter("chunks_submitted_total", "Chunks submitted")?;
		let chunk_partial_failures_total = counter(
			"chunk_partial_failures_total",
			"Chunks where the destination rejected some documents",
		)?;
		let chunk_total_failures_total = counter(
			"chunk_total_failures_total",
			"Chunks whose insert call failed outright",
		)?;

		let chunk_latency_seconds = Histogram::with_opts(
			HistogramOpts::new(
				"chunk_latency_seconds",
				"Duration of a single chunk insert in seconds",
			)
			.namespace(NAMESPACE)
			.buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
		)?;
		registry.register(Box::new(chunk_latency_seconds.clone()))?;

		Ok(Self {
			registry,
			rows_read_total,
			rows_filtered_total,
			documents_normalized_total,
			files_failed_total,
			documents_attempted_total,
			documents_confirmed_total,
			chunks_submitted_total,
			chunk_partial_failures_total,
			chunk_total_failures_total,
			chunk_latency_seconds,
		})
	}

	/// Encode metrics in Prometheus text format
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				log::error!("failed to encode metrics: {}", e);
				String::new()
			}
		}
	}
}

/// Initialize the metrics registry shared by the pipeline and loader
pub fn init_metrics() -> anyhow::Result<Arc<MetricsRegistry>> {
	Ok(Arc::new(MetricsRegistry::new()?))
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_registry_creation() {
		let registry = super::MetricsRegistry::new().expect("registry");
		assert!(!registry.encode().is_empty());
	}

	#[test]
	fn metrics_increment() {
		let registry = super::MetricsRegistry::new().expect("registry");
		registry.documents_confirmed_total.inc_by(10);
		registry.chunk_latency_seconds.observe(0.2);
		let text = registry.encode();
		assert!(text.contains("trip_ingest_documents_confirmed_total 10"));
		assert!(text.contains("trip_ingest_chunk_latency_seconds_count 1"));
	}
}
