//! Data models for analysis results.
//!
//! These mirror the shapes returned by the analysis backend: a result
//! carries one bucket per severity, each with a count and its findings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the backend to a submitted contract.
pub type ContractId = u64;

/// Identifier assigned by the backend to an audit (analysis job).
pub type AuditId = u64;

/// Identifier of a stored result (report). Not the same as its audit id.
pub type ResultId = u64;

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational notes
    Info,
    /// Low severity - style issues, minor suggestions
    Low,
    /// Medium severity - potential bugs
    Medium,
    /// High severity - exploitable under some conditions
    High,
    /// Critical severity - directly exploitable vulnerabilities
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "🔵",
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// A single finding reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Short title describing the finding.
    pub title: String,
    /// Detailed description.
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Code location, e.g. `Token.sol:42`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Offending code excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Analyzer rule that produced the finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// Count and findings for one severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBucket {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub items: Vec<Finding>,
}

impl SeverityBucket {
    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.items.is_empty()
    }
}

/// Findings grouped by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueBuckets {
    #[serde(default)]
    pub critical: SeverityBucket,
    #[serde(default)]
    pub high: SeverityBucket,
    #[serde(default)]
    pub medium: SeverityBucket,
    #[serde(default)]
    pub low: SeverityBucket,
    #[serde(default)]
    pub info: SeverityBucket,
}

impl IssueBuckets {
    pub fn bucket(&self, severity: Severity) -> &SeverityBucket {
        match severity {
            Severity::Critical => &self.critical,
            Severity::High => &self.high,
            Severity::Medium => &self.medium,
            Severity::Low => &self.low,
            Severity::Info => &self.info,
        }
    }

    /// Buckets paired with their severity, most severe first.
    pub fn iter(&self) -> impl Iterator<Item = (Severity, &SeverityBucket)> {
        Severity::DESCENDING.into_iter().map(move |s| (s, self.bucket(s)))
    }

    /// Total across all buckets, using the reported counts.
    pub fn total(&self) -> usize {
        self.iter().map(|(_, b)| b.count).sum()
    }

    /// Highest severity with at least one finding.
    pub fn highest(&self) -> Option<Severity> {
        self.iter().find(|(_, b)| !b.is_empty()).map(|(s, _)| s)
    }
}

/// Lifecycle status attached to a stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Completed,
    InProgress,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Completed => write!(f, "Completed"),
            ResultStatus::InProgress => write!(f, "Running"),
            ResultStatus::Failed => write!(f, "Failed"),
            ResultStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Immutable result snapshot for one completed audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: ResultId,
    /// Audit that produced this result, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<AuditId>,
    #[serde(default)]
    pub contract_id: ContractId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub issues: IssueBuckets,
}

impl AnalysisResult {
    /// Name to show for the contract: name, then address, then id.
    pub fn display_name(&self) -> String {
        self.contract_name
            .clone()
            .or_else(|| self.contract_address.clone())
            .unwrap_or_else(|| format!("contract #{}", self.contract_id))
    }

    pub fn total_issues(&self) -> usize {
        self.issues.total()
    }

    /// Whether any finding sits at or above `threshold`.
    pub fn has_issues_at_or_above(&self, threshold: Severity) -> bool {
        self.issues
            .iter()
            .any(|(severity, bucket)| severity >= threshold && !bucket.is_empty())
    }
}

/// Report export format offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}
