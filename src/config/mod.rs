use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::Level;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::ingest::derive::TripLimits;
use crate::ingest::schema::{ColumnSpec, hvfhv_schema};
use crate::load::DEFAULT_CHUNK_SIZE;

/// Runtime configuration for trip-ingest.
///
/// Values are loaded from (in order): `/etc/trip-ingest/trip-ingest.json`,
/// the user config folder, the local config folder, an explicit file passed
/// on the command line, and environment variables prefixed with `TRIP_`
/// (e.g. `TRIP_CHUNK_SIZE`).
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct Settings {
	pub mongo_uri: Url,
	pub database: String,
	pub collection: String,
	pub chunk_size: usize,
	/// Per-chunk insert timeout; 0 disables it.
	pub chunk_timeout_secs: u64,
	pub server_selection_timeout_ms: u64,
	pub sample_fraction: f64,
	pub max_trip_minutes: f64,
	pub max_trip_miles: f64,
	pub log_level: Level,
	/// Declared column types; columns not listed are typed by probing.
	pub columns: Vec<ColumnSpec>,
}

impl Default for Settings {
	fn default() -> Self {
		let limits = TripLimits::default();
		Self {
			mongo_uri: Url::parse("mongodb://localhost:27017/").expect("default MongoDB URI is valid"),
			database: "nyc_hvfhv".to_string(),
			collection: "trips_2025".to_string(),
			chunk_size: DEFAULT_CHUNK_SIZE,
			chunk_timeout_secs: 0,
			server_selection_timeout_ms: 5000,
			sample_fraction: 0.025,
			max_trip_minutes: limits.max_duration_minutes,
			max_trip_miles: limits.max_trip_miles,
			log_level: Level::Info,
			columns: hvfhv_schema(),
		}
	}
}

impl Settings {
	pub fn chunk_timeout(&self) -> Option<Duration> {
		(self.chunk_timeout_secs > 0).then(|| Duration::from_secs(self.chunk_timeout_secs))
	}

	pub fn server_selection_timeout(&self) -> Duration {
		Duration::from_millis(self.server_selection_timeout_ms)
	}

	pub fn trip_limits(&self) -> TripLimits {
		TripLimits {
			max_duration_minutes: self.max_trip_minutes,
			max_trip_miles: self.max_trip_miles,
		}
	}

	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.chunk_size == 0 {
			return Err(SettingsError::Invalid("chunk_size must be at least 1".into()));
		}
		if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
			return Err(SettingsError::Invalid(format!(
				"sample_fraction must be in (0, 1], got {}",
				self.sample_fraction
			)));
		}
		if self.max_trip_minutes <= 0.0 || self.max_trip_miles <= 0.0 {
			return Err(SettingsError::Invalid("trip limits must be positive".into()));
		}
		Ok(())
	}
}

#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("configuration error: {0}")]
	Config(#[from] config::ConfigError),
	#[error("invalid configuration: {0}")]
	Invalid(String),
}

pub fn load() -> Result<Settings, SettingsError> {
	load_with(None)
}

/// Load settings, layering `extra` (if given) above the standard locations.
pub fn load_with(extra: Option<&Path>) -> Result<Settings, SettingsError> {
	let mut builder = config::Config::builder()
		.add_source(config::File::with_name("/etc/trip-ingest/trip-ingest.json").required(false));

	if let Some(folder) = dirs::config_dir() {
		let user_config_path = folder.join("trip-ingest").join("trip-ingest.json");
		builder = builder.add_source(config::File::from(user_config_path).required(false));
	}
	if let Some(folder) = dirs::config_local_dir() {
		let local_config_path = folder.join("trip-ingest").join("trip-ingest.json");
		builder = builder.add_source(config::File::from(local_config_path).required(false));
	}
	if let Some(path) = extra {
		builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
	}

	builder = builder.add_source(config::Environment::with_prefix("TRIP").separator("__"));

	let cfg = builder.build()?;

	let mut s: Settings = cfg.try_deserialize()?;

	// Single-underscore variables (TRIP_CHUNK_SIZE) are not picked up by the
	// "__"-separated environment source; apply them directly.
	if let Ok(uri) = std::env::var("TRIP_MONGO_URI") {
		if !uri.is_empty() {
			if let Ok(parsed) = Url::parse(&uri) {
				s.mongo_uri = parsed;
			}
		}
	}
	if let Ok(db) = std::env::var("TRIP_DATABASE") {
		if !db.is_empty() {
			s.database = db;
		}
	}
	if let Ok(c) = std::env::var("TRIP_COLLECTION") {
		if !c.is_empty() {
			s.collection = c;
		}
	}
	env_override("TRIP_CHUNK_SIZE", &mut s.chunk_size);
	env_override("TRIP_CHUNK_TIMEOUT_SECS", &mut s.chunk_timeout_secs);
	env_override("TRIP_SERVER_SELECTION_TIMEOUT_MS", &mut s.server_selection_timeout_ms);
	env_override("TRIP_SAMPLE_FRACTION", &mut s.sample_fraction);
	env_override("TRIP_MAX_TRIP_MINUTES", &mut s.max_trip_minutes);
	env_override("TRIP_MAX_TRIP_MILES", &mut s.max_trip_miles);
	env_override("TRIP_LOG_LEVEL", &mut s.log_level);

	s.validate()?;
	Ok(s)
}

fn env_override<T: FromStr>(key: &str, target: &mut T) {
	if let Ok(raw) = std::env::var(key) {
		if let Ok(parsed) = raw.trim().parse::<T>() {
			*target = parsed;
		}
	}
}
