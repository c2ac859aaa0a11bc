#![warn(missing_docs)]
//! ArborBench Report - Result Rendering
//!
//! Renders run results in two formats:
//! - Human-readable terminal output with the group tree, timing means,
//!   heap usage and leak warnings
//! - JSON (machine-readable, versioned envelope)

mod human;
mod json;

pub use human::format_human_output;
pub use json::{generate_json_report, ReportEnvelope, SCHEMA_VERSION};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Human,
    /// JSON with a versioned envelope
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_known_names() {
        assert_eq!("human".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
