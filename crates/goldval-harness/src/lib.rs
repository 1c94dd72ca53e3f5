//! Test harness for the golden-value engine.
//!
//! This crate provides:
//! - A deterministic synthetic buffer provider and external signature device
//! - A multi-loop runner driving a bound comparator
//! - Report generation: human-readable + machine-readable run reports

#![forbid(unsafe_code)]

pub mod report;
pub mod runner;
pub mod synthetic;

pub use report::{GoldenReport, ReportError};
pub use runner::{GoldenRunner, RunOutcome};
pub use synthetic::{FetchRecord, SyntheticBuffer, SyntheticProvider, SyntheticSigDevice};
