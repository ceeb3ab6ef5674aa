//! Issue aggregation and statistics.
//!
//! This module computes summary statistics across many analysis results:
//! severity distribution, averages, recurring rules and the contracts
//! with the most findings.

use crate::models::{AnalysisResult, Finding, ResultId, Severity};
use serde::Serialize;
use std::collections::HashMap;

/// Per-severity issue counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityDistribution {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityDistribution {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    fn add(&mut self, severity: Severity, count: usize) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        };
        *slot += count;
    }
}

/// A contract and how many issues its audit reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractIssues {
    pub result_id: ResultId,
    pub name: String,
    pub issues: usize,
}

/// Aggregate statistics over a set of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_contracts: usize,
    pub total_issues: usize,
    pub distribution: SeverityDistribution,
    pub critical_issues: usize,
    pub average_issues: f64,
    /// Rule ids by number of occurrences, most common first.
    pub top_rules: Vec<(String, usize)>,
    /// Contracts with the most issues, most first.
    pub top_contracts: Vec<ContractIssues>,
}

impl Statistics {
    /// Compute statistics, keeping `top_n` entries in the ranked lists.
    pub fn from_results(results: &[AnalysisResult], top_n: usize) -> Self {
        let mut distribution = SeverityDistribution::default();
        for result in results {
            for (severity, bucket) in result.issues.iter() {
                distribution.add(severity, bucket.count);
            }
        }

        let total_issues: usize = results.iter().map(|r| r.total_issues()).sum();
        let average_issues = if results.is_empty() {
            0.0
        } else {
            total_issues as f64 / results.len() as f64
        };

        Self {
            total_contracts: results.len(),
            total_issues,
            critical_issues: distribution.critical,
            distribution,
            average_issues,
            top_rules: most_common_rules(results, top_n),
            top_contracts: most_problematic_contracts(results, top_n),
        }
    }
}

/// Every finding across all results, with its bucket severity.
pub fn aggregate_findings(results: &[AnalysisResult]) -> Vec<(Severity, &Finding)> {
    results
        .iter()
        .flat_map(|r| {
            r.issues
                .iter()
                .flat_map(|(severity, bucket)| bucket.items.iter().map(move |f| (severity, f)))
        })
        .collect()
}

/// Rule ids ranked by how often they fire. Ties break alphabetically.
pub fn most_common_rules(results: &[AnalysisResult], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for (_, finding) in aggregate_findings(results) {
        if let Some(ref rule) = finding.rule_id {
            *counts.entry(rule.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(rule, count)| (rule.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);

    ranked
}

/// Contracts with at least one issue, ranked by issue count.
pub fn most_problematic_contracts(results: &[AnalysisResult], n: usize) -> Vec<ContractIssues> {
    let mut ranked: Vec<ContractIssues> = results
        .iter()
        .map(|r| ContractIssues {
            result_id: r.id,
            name: r.display_name(),
            issues: r.total_issues(),
        })
        .filter(|c| c.issues > 0)
        .collect();

    ranked.sort_by_key(|c| std::cmp::Reverse(c.issues));
    ranked.truncate(n);

    ranked
}

/// Generate a text summary of the statistics.
pub fn generate_statistics_text(stats: &Statistics) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Contracts Analyzed: {}", stats.total_contracts));
    lines.push(format!("Total Issues: {}", stats.total_issues));
    lines.push(format!(
        "Average Issues per Contract: {:.1}",
        stats.average_issues
    ));
    for severity in Severity::DESCENDING {
        lines.push(format!(
            "- {} {}: {}",
            severity.emoji(),
            severity,
            stats.distribution.get(severity)
        ));
    }

    if !stats.top_rules.is_empty() {
        lines.push(String::new());
        lines.push("Most Common Rules:".to_string());
        for (rule, count) in &stats.top_rules {
            lines.push(format!("- {}: {}", rule, count));
        }
    }

    if !stats.top_contracts.is_empty() {
        lines.push(String::new());
        lines.push("Most Problematic Contracts:".to_string());
        for contract in &stats.top_contracts {
            lines.push(format!(
                "- {} (report {}): {}",
                contract.name, contract.result_id, contract.issues
            ));
        }
    }

    lines.join("\n")
}
