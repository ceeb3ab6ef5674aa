//! Report rendering and the in-memory report list.

pub mod generator;
pub mod store;

pub use generator::{
    generate_json_report, generate_json_reports, generate_markdown_report, generate_report_list,
};
pub use store::{ReportFilter, ReportStore};
