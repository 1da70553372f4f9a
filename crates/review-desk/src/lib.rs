//! Application review workflow shared by the community bot variants.
//!
//! Applicants submit free-text or spreadsheet-imported applications, a pool of approvers votes on
//! them, and each application is finalized exactly once, either by quorum or by age.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
