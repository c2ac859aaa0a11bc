//! Configuration loading from arbor.toml
//!
//! Harness configuration can be specified in an `arbor.toml` file in the
//! project root. The configuration is automatically discovered by walking up
//! from the current directory; CLI flags override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arborbench_core::BenchOptions;
use serde::{Deserialize, Serialize};

/// ArborBench harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArborConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Memory instrumentation configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Runner configuration for benchmark execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timed iterations per benchmark
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Timeout for a single invocation (e.g., "60s", "500ms", "2m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Only run benchmarks whose fully-qualified id matches this pattern
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            timeout: default_timeout(),
            filter: None,
        }
    }
}

fn default_iterations() -> u32 {
    10
}
fn default_timeout() -> String {
    "60s".to_string()
}

/// Memory instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Record per-iteration live-heap deltas
    #[serde(default)]
    pub profile: bool,
    /// Write a heap-snapshot artifact per iteration
    #[serde(default)]
    pub snapshot: bool,
    /// Where snapshot artifacts go (current directory if unset)
    #[serde(default)]
    pub snapshot_directory: Option<String>,
    /// Heap variance ratio above which growth is suspicious (0..=1)
    #[serde(default = "default_leak_variance")]
    pub leak_variance: f64,
    /// Ignore heap growth steps below this many bytes
    #[serde(default = "default_leak_minimum_bytes")]
    pub leak_minimum_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            profile: false,
            snapshot: false,
            snapshot_directory: None,
            leak_variance: default_leak_variance(),
            leak_minimum_bytes: default_leak_minimum_bytes(),
        }
    }
}

fn default_leak_variance() -> f64 {
    0.05
}
fn default_leak_minimum_bytes() -> u64 {
    512 * 1024
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl ArborConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("arbor.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# ArborBench Configuration

[runner]
# Timed iterations per benchmark
iterations = 10
# Timeout for a single invocation
timeout = "60s"
# Only run benchmarks whose id matches this pattern (uncomment to enable)
# filter = "parser"

[memory]
# Record per-iteration live-heap deltas
profile = false
# Write a heap-snapshot artifact per iteration
snapshot = false
# Snapshot output directory (uncomment to enable)
# snapshot_directory = "target/arborbench"
# Heap variance ratio above which growth is suspicious
leak_variance = 0.05
# Ignore heap growth steps below this many bytes
leak_minimum_bytes = 524288

[output]
# Default output format: human or json
format = "human"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to a [`Duration`]
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;

        let multiplier_ns: u64 = match unit_part.to_lowercase().as_str() {
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_nanos((value * multiplier_ns as f64) as u64))
    }

    /// Turn the file-level configuration into benchmark defaults.
    pub fn bench_defaults(&self) -> anyhow::Result<BenchOptions> {
        Ok(BenchOptions {
            iterations: self.runner.iterations,
            timeout: Self::parse_duration(&self.runner.timeout)?,
            profile_memory: self.memory.profile,
            snapshot_heap: self.memory.snapshot,
            snapshot_output_directory: self.memory.snapshot_directory.clone().map(PathBuf::from),
            memory_leak_variance: self.memory.leak_variance,
            memory_leak_minimum_value: self.memory.leak_minimum_bytes,
        })
    }
}
