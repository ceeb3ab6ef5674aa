//! Analysis job lifecycle.
//!
//! This module provides the job client that submits a contract, polls
//! the backend with bounded retries, and reports progress to observers.

pub mod client;
pub mod retry;
pub mod state;

pub use client::AnalysisJobClient;
pub use state::{stage_message, JobEvent, JobSnapshot, JobState};
