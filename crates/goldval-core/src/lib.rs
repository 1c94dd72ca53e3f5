//! Golden-value signature verification engine.
//!
//! This crate provides:
//! - Algorithm registry: signature algorithms with their element/bin counts and compare modes
//! - Record layout: stable offsets of every (algorithm, buffer) range in one flat record
//! - Miscompare accumulation: per-iteration and per-test mismatch state
//! - Comparator: the per-loop decide/fetch/compute/compare/accumulate/report cycle
//! - Collaborator traits for buffer providers, reference stores, dump sinks and schedulers
//! - Structured JSONL logging and the end-of-test error-rate summary

#![forbid(unsafe_code)]

pub mod algorithm;
pub mod buffer;
pub mod compare;
pub mod comparator;
pub mod config;
pub mod error;
pub mod format;
pub mod hooks;
pub mod layout;
pub mod miscompare;
pub mod provider;
pub mod store;
pub mod structured_log;
pub mod summary;

pub use algorithm::{Algorithm, AlgorithmMask, BinSettings, CompareMode, ErrorHandler};
pub use buffer::BufferInfo;
pub use comparator::{
    BufferReport, Comparator, IterationOutcome, IterationReport, Phase, RunState,
};
pub use config::{Action, ComputeHint, DumpTriggers, FetchHint, GoldenConfig};
pub use error::GoldenError;
pub use format::{Channel, ElementFormat, NUM_CHANNELS};
pub use hooks::{
    CollectedDump, CollectingDumpSink, DumpRequest, DumpSink, NoopScheduler, NullDumpSink,
    Scheduler,
};
pub use layout::{LayoutSlot, RecordLayout, SlotInfo};
pub use miscompare::{ExtraDiff, MiscompareDetails};
pub use provider::{BufferProvider, ComputeRequest, ExternalSignatureDevice, ProviderError};
pub use store::{ReferenceStore, StoreError, StoreHandle, StoreKey};
pub use summary::{BufferVerdict, ErrorRateSummary, RunStats};
