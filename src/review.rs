//! Structured review produced by the analyzer

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate severity reported by the analyzer. Taken as authoritative; it is
/// never recomputed from the findings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallSeverity {
    Critical,
    Warning,
    Info,
    Clean,
}

impl OverallSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallSeverity::Critical => "critical",
            OverallSeverity::Warning => "warning",
            OverallSeverity::Info => "info",
            OverallSeverity::Clean => "clean",
        }
    }
}

impl fmt::Display for OverallSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub file_path: String,
    pub line_range: Option<LineRange>,
    pub title: String,
    pub description: String,
    pub suggestion: Option<String>,
    pub code_suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReview {
    pub summary: String,
    pub overall_severity: OverallSeverity,
    pub findings: Vec<Finding>,
}

/// JSON schema handed to the analyzer as its response format. Every field is
/// required; optional values are expressed as nullable.
pub fn response_schema() -> Value {
    let nullable_string = |description: &str| {
        json!({ "type": ["string", "null"], "description": description })
    };

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["summary", "overallSeverity", "findings"],
        "properties": {
            "summary": {
                "type": "string",
                "description": "A 2-3 sentence overall summary of the commit quality and main concerns"
            },
            "overallSeverity": {
                "type": "string",
                "enum": ["critical", "warning", "info", "clean"],
                "description": "The highest severity level found across all findings"
            },
            "findings": {
                "type": "array",
                "description": "List of specific issues found in the code",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": [
                        "severity", "filePath", "lineRange", "title",
                        "description", "suggestion", "codeSuggestion"
                    ],
                    "properties": {
                        "severity": { "type": "string", "enum": ["critical", "warning", "info"] },
                        "filePath": {
                            "type": "string",
                            "description": "The file path affected by this finding"
                        },
                        "lineRange": {
                            "anyOf": [
                                {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["start", "end"],
                                    "properties": {
                                        "start": { "type": "integer" },
                                        "end": { "type": "integer" }
                                    }
                                },
                                { "type": "null" }
                            ],
                            "description": "Line range in the diff, or null if not applicable"
                        },
                        "title": {
                            "type": "string",
                            "description": "Short title summarizing the finding"
                        },
                        "description": {
                            "type": "string",
                            "description": "Detailed explanation of the issue found"
                        },
                        "suggestion": nullable_string(
                            "Suggested fix or improvement in natural language, or null if none"
                        ),
                        "codeSuggestion": nullable_string(
                            "A concise code snippet illustrating the fix, or null if not applicable"
                        )
                    }
                }
            }
        }
    })
}
