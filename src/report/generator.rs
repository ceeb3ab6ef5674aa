//! Markdown report generation.
//!
//! This module renders analysis results as Markdown audit reports and
//! as JSON.

use crate::models::{AnalysisResult, Finding, IssueBuckets, Severity};
use anyhow::Result;

/// Generate a complete Markdown report for one stored result.
pub fn generate_markdown_report(result: &AnalysisResult) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!(
        "# Security Report: {}\n\n",
        escape_cell(&result.display_name())
    ));

    output.push_str(&generate_metadata_section(result));
    output.push_str(&generate_summary_section(&result.issues));
    output.push_str(&generate_findings_section(&result.issues));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Report ID:** {}\n", result.id));
    if let Some(audit_id) = result.audit_id {
        section.push_str(&format!("- **Audit ID:** {}\n", audit_id));
    }
    section.push_str(&format!("- **Contract ID:** {}\n", result.contract_id));
    if let Some(ref address) = result.contract_address {
        section.push_str(&format!("- **Address:** `{}`\n", address));
    }
    if !result.network.is_empty() {
        section.push_str(&format!("- **Network:** {}\n", result.network));
    }
    section.push_str(&format!("- **Status:** {}\n", result.status));
    if let Some(created) = result.created_at {
        section.push_str(&format!(
            "- **Started:** {}\n",
            created.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let Some(updated) = result.updated_at {
        section.push_str(&format!(
            "- **Finished:** {}\n",
            updated.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    section.push_str(&format!("- **Total Issues:** {}\n", result.total_issues()));
    section.push('\n');

    section
}

/// Generate the severity breakdown table.
fn generate_summary_section(issues: &IssueBuckets) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | {} Info | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
        Severity::Info.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | **{}** |\n\n",
        issues.critical.count,
        issues.high.count,
        issues.medium.count,
        issues.low.count,
        issues.info.count,
        issues.total()
    ));

    section
}

/// Generate the findings section, most severe bucket first.
fn generate_findings_section(issues: &IssueBuckets) -> String {
    let mut section = String::new();

    section.push_str("## Findings\n\n");

    if issues.highest().is_none() {
        section.push_str("No issues were found in this contract. 🎉\n\n");
        return section;
    }

    for (severity, bucket) in issues.iter() {
        if bucket.items.is_empty() {
            continue;
        }

        section.push_str(&format!(
            "### {} {} ({})\n\n",
            severity.emoji(),
            severity,
            bucket.count
        ));

        for finding in &bucket.items {
            section.push_str(&generate_finding_block(severity, finding));
        }
    }

    section
}

/// Generate a single finding block.
fn generate_finding_block(severity: Severity, finding: &Finding) -> String {
    let mut block = String::new();

    // An item's own severity wins over its bucket's.
    let severity = finding.severity.unwrap_or(severity);
    block.push_str(&format!(
        "#### **{}** {}\n\n",
        severity.to_string().to_uppercase(),
        finding.title
    ));

    if let Some(ref location) = finding.location {
        block.push_str(&format!("**Location:** `{}`\n\n", location));
    }
    if let Some(ref rule) = finding.rule_id {
        block.push_str(&format!("**Rule:** `{}`\n\n", rule));
    }
    if !finding.description.is_empty() {
        block.push_str(&format!("**Description:** {}\n\n", finding.description));
    }
    if let Some(ref code) = finding.code {
        block.push_str("<details>\n<summary>View Code</summary>\n\n```solidity\n");
        block.push_str(code);
        block.push_str("\n```\n</details>\n\n");
    }

    block.push_str("---\n\n");

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by contract-sentry*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(result: &AnalysisResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

/// Generate a JSON array for several results.
pub fn generate_json_reports(results: &[AnalysisResult]) -> Result<String> {
    serde_json::to_string_pretty(results).map_err(Into::into)
}

/// Generate a Markdown table listing stored reports.
pub fn generate_report_list(results: &[&AnalysisResult]) -> String {
    if results.is_empty() {
        return "No reports found.\n".to_string();
    }

    let mut table = String::new();
    table.push_str("| Report | Contract | Network | Status | Critical | High | Medium | Low | Total |\n");
    table.push_str("|---:|:---|:---|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for result in results {
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            result.id,
            escape_cell(&result.display_name()),
            result.network,
            result.status,
            result.issues.critical.count,
            result.issues.high.count,
            result.issues.medium.count,
            result.issues.low.count,
            result.total_issues()
        ));
    }

    table
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
