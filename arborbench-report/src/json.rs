//! JSON Output

use arborbench_core::RunResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Version of the JSON envelope layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around the run results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEnvelope<'a> {
    /// Envelope layout version.
    pub schema_version: u32,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// One entry per suite run.
    pub runs: &'a [RunResult],
}

/// Generate a prettified JSON report for the given runs.
pub fn generate_json_report(runs: &[RunResult]) -> Result<String, serde_json::Error> {
    let envelope = ReportEnvelope {
        schema_version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        runs,
    };
    serde_json::to_string_pretty(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arborbench_core::{BenchOptions, BenchStatus};

    #[test]
    fn envelope_carries_version_and_camel_case_results() {
        let runs = vec![RunResult {
            filename: "suite.rs".to_string(),
            unhandled_errors: vec![],
            bench_results: vec![arborbench_core::BenchResult {
                bench_path: vec!["g".to_string(), "b".to_string()],
                status: BenchStatus::Done,
                errors: vec![],
                durations_ms: vec![1.25],
                heap_used_sizes: Some(vec![2048]),
                bench_options: BenchOptions::default(),
            }],
        }];
        let json = generate_json_report(&runs).expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["schemaVersion"], 1);
        assert!(value.get("generatedAt").is_some());
        let bench = &value["runs"][0]["benchResults"][0];
        assert_eq!(bench["benchPath"][1], "b");
        assert_eq!(bench["heapUsedSizes"][0], 2048);
    }
}
