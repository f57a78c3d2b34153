//! Cache tuning loaded from TOML.
//!
//! ```toml
//! page_size = 20
//! refresh_interval_ms = 15000
//! refetch_on_conflict = true
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Failure while loading a [`CacheConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The file could not be read.
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	/// The TOML is malformed or has unknown keys.
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
	/// A value is out of range.
	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Tuning knobs for a feed cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
	/// Posts requested per page.
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	/// Period of background page-1 refreshes, in milliseconds.
	#[serde(default = "default_refresh_interval_ms")]
	pub refresh_interval_ms: u64,
	/// Re-fetch an entity when the server reports a conflicting mutation.
	#[serde(default = "default_refetch_on_conflict")]
	pub refetch_on_conflict: bool,
}

fn default_page_size() -> u32 {
	10
}

fn default_refresh_interval_ms() -> u64 {
	30_000
}

fn default_refetch_on_conflict() -> bool {
	true
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			page_size: default_page_size(),
			refresh_interval_ms: default_refresh_interval_ms(),
			refetch_on_conflict: default_refetch_on_conflict(),
		}
	}
}

impl CacheConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path)?;
		Self::from_toml_str(&text)
	}

	/// Rejects values the cache cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.page_size == 0 {
			return Err(ConfigError::Invalid("page_size must be greater than zero".into()));
		}
		if self.refresh_interval_ms == 0 {
			return Err(ConfigError::Invalid("refresh_interval_ms must be greater than zero".into()));
		}
		Ok(())
	}

	/// Sets the page size.
	pub fn with_page_size(mut self, page_size: u32) -> Self {
		self.page_size = page_size;
		self
	}

	/// Background refresh period.
	pub fn refresh_interval(&self) -> Duration {
		Duration::from_millis(self.refresh_interval_ms)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		assert_eq!(CacheConfig::from_toml_str("").unwrap(), CacheConfig::default());
	}

	#[test]
	fn partial_override() {
		let config = CacheConfig::from_toml_str("page_size = 5\nrefetch_on_conflict = false").unwrap();
		assert_eq!(config.page_size, 5);
		assert!(!config.refetch_on_conflict);
		assert_eq!(config.refresh_interval(), Duration::from_secs(30));
	}

	#[test]
	fn zero_page_size_is_rejected() {
		let err = CacheConfig::from_toml_str("page_size = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid(_)));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = CacheConfig::from_toml_str("page_sise = 5").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "refresh_interval_ms = 500").unwrap();
		let config = CacheConfig::load(file.path()).unwrap();
		assert_eq!(config.refresh_interval(), Duration::from_millis(500));
	}

	#[test]
	fn missing_file_is_io_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = CacheConfig::load(dir.path().join("absent.toml")).unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}
}
