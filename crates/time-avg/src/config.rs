//! Configuration for the time-average computation.

use serde::{Deserialize, Serialize};
use tam_common::SECONDS_PER_DAY;

/// Tuning knobs for a time-average run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeAverageConfig {
    /// Number of coarse time partitions per tile layout position.
    pub num_time_parts: usize,

    /// Length of the sequential query windows inside one compute unit.
    pub unit_window_days: i64,

    /// Length of the trailing window searched during resolution and tile-set discovery.
    pub discovery_window_secs: i64,

    /// How many windows discovery may step back before giving up.
    pub max_lookback_windows: usize,

    /// Deepest recursion the partitioner may reach on persistent overflow.
    pub max_bisection_depth: usize,

    /// Smallest coordinate spacing accepted as a native resolution.
    pub min_resolution: f64,

    /// Compute units allowed in flight at once (1 runs them sequentially).
    pub max_concurrent_units: usize,

    /// Name of the data variable in the raster output.
    pub output_variable: String,
}

impl Default for TimeAverageConfig {
    fn default() -> Self {
        Self {
            num_time_parts: 18,
            unit_window_days: 90,
            discovery_window_secs: SECONDS_PER_DAY,
            max_lookback_windows: 365,
            max_bisection_depth: 48,
            min_resolution: 1e-10,
            max_concurrent_units: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            output_variable: "val".to_string(),
        }
    }
}

impl TimeAverageConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TAM_NUM_TIME_PARTS") {
            if let Ok(n) = val.parse() {
                config.num_time_parts = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_UNIT_WINDOW_DAYS") {
            if let Ok(n) = val.parse() {
                config.unit_window_days = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_DISCOVERY_WINDOW_SECS") {
            if let Ok(n) = val.parse() {
                config.discovery_window_secs = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_MAX_LOOKBACK_WINDOWS") {
            if let Ok(n) = val.parse() {
                config.max_lookback_windows = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_MAX_BISECTION_DEPTH") {
            if let Ok(n) = val.parse() {
                config.max_bisection_depth = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_MIN_RESOLUTION") {
            if let Ok(res) = val.parse() {
                config.min_resolution = res;
            }
        }

        if let Ok(val) = std::env::var("TAM_MAX_CONCURRENT_UNITS") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_units = n;
            }
        }

        if let Ok(val) = std::env::var("TAM_OUTPUT_VARIABLE") {
            config.output_variable = val;
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_time_parts == 0 {
            return Err("num_time_parts must be > 0".to_string());
        }

        if self.unit_window_days <= 0 {
            return Err("unit_window_days must be > 0".to_string());
        }

        if self.discovery_window_secs <= 0 {
            return Err("discovery_window_secs must be > 0".to_string());
        }

        if self.max_lookback_windows == 0 {
            return Err("max_lookback_windows must be > 0".to_string());
        }

        if !(self.min_resolution.is_finite() && self.min_resolution > 0.0) {
            return Err("min_resolution must be a positive number".to_string());
        }

        if self.max_concurrent_units == 0 {
            return Err("max_concurrent_units must be > 0".to_string());
        }

        if self.output_variable.trim().is_empty() {
            return Err("output_variable must not be empty".to_string());
        }

        Ok(())
    }

    /// Length of a compute unit's query window in seconds.
    pub fn unit_window_secs(&self) -> i64 {
        self.unit_window_days.saturating_mul(SECONDS_PER_DAY)
    }
}
