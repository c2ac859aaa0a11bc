//! Run-level default options and per-node overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeclError;

/// Effective options for one benchmark (or one hook, which only consults
/// `timeout`). Run-level defaults merged with per-node overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchOptions {
    /// How many timed iterations to run.
    pub iterations: u32,
    /// Per-invocation timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Record per-iteration live-heap deltas.
    pub profile_memory: bool,
    /// Write a heap-snapshot artifact per iteration.
    pub snapshot_heap: bool,
    /// Where snapshot artifacts go. `None` means the current directory.
    pub snapshot_output_directory: Option<PathBuf>,
    /// Heap variance ratio above which growth is suspicious (0..=1).
    pub memory_leak_variance: f64,
    /// Ignore heap growth steps below this many bytes.
    pub memory_leak_minimum_value: u64,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            iterations: 10,
            timeout: Duration::from_secs(60),
            profile_memory: false,
            snapshot_heap: false,
            snapshot_output_directory: None,
            memory_leak_variance: 0.05,
            memory_leak_minimum_value: 512 * 1024,
        }
    }
}

impl BenchOptions {
    /// Reject option values the type system cannot rule out.
    pub fn validate(&self) -> Result<(), DeclError> {
        if self.iterations == 0 {
            return Err(DeclError::InvalidDeclaration(
                "iterations must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DeclError::InvalidDeclaration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.memory_leak_variance) {
            return Err(DeclError::InvalidDeclaration(format!(
                "memory leak variance must be within 0..=1, got {}",
                self.memory_leak_variance
            )));
        }
        Ok(())
    }

    /// Apply per-node overrides on top of these defaults.
    #[must_use]
    pub fn merge(&self, overrides: &BenchOverrides) -> Self {
        Self {
            iterations: overrides.iterations.unwrap_or(self.iterations),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            profile_memory: overrides.profile_memory.unwrap_or(self.profile_memory),
            snapshot_heap: overrides.snapshot_heap.unwrap_or(self.snapshot_heap),
            snapshot_output_directory: overrides
                .snapshot_output_directory
                .clone()
                .or_else(|| self.snapshot_output_directory.clone()),
            memory_leak_variance: overrides
                .memory_leak_variance
                .unwrap_or(self.memory_leak_variance),
            memory_leak_minimum_value: overrides
                .memory_leak_minimum_value
                .unwrap_or(self.memory_leak_minimum_value),
        }
    }
}

/// Per-benchmark (or per-hook) option overrides. Unset fields fall back to
/// the run-level defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchOverrides {
    /// Override the iteration count.
    pub iterations: Option<u32>,
    /// Override the per-invocation timeout.
    pub timeout: Option<Duration>,
    /// Override memory profiling.
    pub profile_memory: Option<bool>,
    /// Override heap snapshotting.
    pub snapshot_heap: Option<bool>,
    /// Override the snapshot output directory.
    pub snapshot_output_directory: Option<PathBuf>,
    /// Override the leak variance threshold.
    pub memory_leak_variance: Option<f64>,
    /// Override the leak minimum-step threshold.
    pub memory_leak_minimum_value: Option<u64>,
}

impl BenchOverrides {
    /// No overrides; every field falls back to run defaults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the iteration count.
    #[must_use]
    pub fn iterations(mut self, n: u32) -> Self {
        self.iterations = Some(n);
        self
    }

    /// Set the per-invocation timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable memory profiling.
    #[must_use]
    pub fn profile_memory(mut self, on: bool) -> Self {
        self.profile_memory = Some(on);
        self
    }

    /// Enable or disable heap snapshotting.
    #[must_use]
    pub fn snapshot_heap(mut self, on: bool) -> Self {
        self.snapshot_heap = Some(on);
        self
    }

    /// Set the snapshot output directory.
    #[must_use]
    pub fn snapshot_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_output_directory = Some(dir.into());
        self
    }

    /// Set the leak variance threshold.
    #[must_use]
    pub fn memory_leak_variance(mut self, ratio: f64) -> Self {
        self.memory_leak_variance = Some(ratio);
        self
    }

    /// Set the leak minimum-step threshold in bytes.
    #[must_use]
    pub fn memory_leak_minimum_value(mut self, bytes: u64) -> Self {
        self.memory_leak_minimum_value = Some(bytes);
        self
    }
}

/// Serialize a [`Duration`] as integer milliseconds, matching the wire shape
/// of the result documents.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BenchOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut options = BenchOptions::default();
        options.iterations = 0;
        assert!(matches!(
            options.validate(),
            Err(DeclError::InvalidDeclaration(_))
        ));
    }

    #[test]
    fn variance_out_of_range_rejected() {
        let mut options = BenchOptions::default();
        options.memory_leak_variance = 1.5;
        assert!(options.validate().is_err());
    }

    #[test]
    fn merge_prefers_overrides() {
        let defaults = BenchOptions::default();
        let merged = defaults.merge(
            &BenchOverrides::none()
                .iterations(3)
                .timeout(Duration::from_millis(500))
                .profile_memory(true),
        );
        assert_eq!(merged.iterations, 3);
        assert_eq!(merged.timeout, Duration::from_millis(500));
        assert!(merged.profile_memory);
        // Untouched fields keep the defaults.
        assert_eq!(
            merged.memory_leak_minimum_value,
            defaults.memory_leak_minimum_value
        );
    }

    #[test]
    fn options_serialize_camel_case() {
        let json = serde_json::to_value(BenchOptions::default()).expect("serializable");
        assert_eq!(json["iterations"], 10);
        assert_eq!(json["timeout"], 60_000);
        assert!(json.get("profileMemory").is_some());
        assert!(json.get("memoryLeakVariance").is_some());
    }
}
