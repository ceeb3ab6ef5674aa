//! In-memory list of kept reports.

use crate::models::{AnalysisResult, ResultId, Severity};

/// Which severity buckets a report must have findings in to be shown.
///
/// With no flag set every report matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub critical_only: bool,
    pub high_only: bool,
    pub medium_low_only: bool,
}

impl ReportFilter {
    pub fn is_empty(&self) -> bool {
        !(self.critical_only || self.high_only || self.medium_low_only)
    }

    fn selected(&self) -> Vec<Severity> {
        let mut severities = Vec::new();
        if self.critical_only {
            severities.push(Severity::Critical);
        }
        if self.high_only {
            severities.push(Severity::High);
        }
        if self.medium_low_only {
            severities.extend([Severity::Medium, Severity::Low]);
        }
        severities
    }

    pub fn matches(&self, result: &AnalysisResult) -> bool {
        if self.is_empty() {
            return true;
        }
        self.selected()
            .into_iter()
            .any(|severity| !result.issues.bucket(severity).is_empty())
    }
}

/// Reports kept for the lifetime of the process, newest first.
#[derive(Debug, Default)]
pub struct ReportStore {
    reports: Vec<AnalysisResult>,
    filter: ReportFilter,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a report at the front.
    pub fn add(&mut self, result: AnalysisResult) {
        self.reports.insert(0, result);
    }

    pub fn list(&self) -> &[AnalysisResult] {
        &self.reports
    }

    /// Most recently added report for `id`.
    pub fn get(&self, id: ResultId) -> Option<&AnalysisResult> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn set_filter(&mut self, filter: ReportFilter) {
        self.filter = filter;
    }

    /// Reports matching the current filter, newest first.
    pub fn filtered(&self) -> Vec<&AnalysisResult> {
        self.reports
            .iter()
            .filter(|r| self.filter.matches(r))
            .collect()
    }
}

impl Extend<AnalysisResult> for ReportStore {
    fn extend<I: IntoIterator<Item = AnalysisResult>>(&mut self, iter: I) {
        for result in iter {
            self.add(result);
        }
    }
}
