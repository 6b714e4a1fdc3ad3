use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log configuration shared by the binaries.
#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level filter to use, unless RUST_LOG is set.
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "MOQ_LOG_LEVEL")]
	#[serde(with = "level")]
	pub level: tracing::Level,
}

impl Default for Log {
	fn default() -> Self {
		Self {
			level: tracing::Level::INFO,
		}
	}
}

impl Log {
	pub fn level(&self) -> LevelFilter {
		LevelFilter::from_level(self.level)
	}

	/// Install a global subscriber writing to stderr.
	///
	/// Only call this once, from a binary.
	pub fn init(&self) {
		let mut filter = EnvFilter::builder()
			.with_default_directive(self.level().into())
			.from_env_lossy();

		// quinn is noisy at debug.
		if let Ok(quinn) = "quinn=info".parse() {
			filter = filter.add_directive(quinn);
		}

		tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.with_env_filter(filter)
			.init();
	}
}

mod level {
	use serde::{Deserialize, Deserializer, Serializer, de::Error};

	pub fn serialize<S: Serializer>(level: &tracing::Level, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(level.as_str())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<tracing::Level, D::Error> {
		let level = String::deserialize(deserializer)?;
		level.parse().map_err(D::Error::custom)
	}
}
