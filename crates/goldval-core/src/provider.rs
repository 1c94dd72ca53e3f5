//! Observed-buffer provider and external signature device interfaces.
//!
//! Both are external collaborators: the engine never fetches device memory or computes
//! signature math itself. Calls are synchronous and must not re-enter the comparator.

use thiserror::Error;

use crate::algorithm::Algorithm;
use crate::config::{ComputeHint, FetchHint};
use crate::format::ElementFormat;

/// Opaque failure reported by a provider or signature device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", buffer_prefix(.buffer))]
pub struct ProviderError {
    pub buffer: Option<u32>,
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            buffer: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn for_buffer(buffer: u32, message: impl Into<String>) -> Self {
        Self {
            buffer: Some(buffer),
            message: message.into(),
        }
    }
}

fn buffer_prefix(buffer: &Option<u32>) -> String {
    buffer.map(|b| format!("buffer {b}: ")).unwrap_or_default()
}

/// Arguments of one fetch-and-compute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeRequest {
    pub buffer: u32,
    pub subdevice: u32,
    pub fetch_hint: FetchHint,
    pub compute_hint: ComputeHint,
    pub bins: u32,
    pub algorithm: Algorithm,
}

/// Source of buffer metadata and computed signatures.
pub trait BufferProvider {
    fn buffer_count(&self) -> u32;
    fn format(&self, index: u32) -> ElementFormat;
    fn width(&self, index: u32) -> u32;
    fn height(&self, index: u32) -> u32;
    fn pitch(&self, index: u32) -> u32;

    /// Display-like resource bound to the buffer, if any. An id of 0 means none.
    fn associated_resource(&self, index: u32) -> Option<u32>;

    fn external_signature_device(&self, index: u32) -> Option<&dyn ExternalSignatureDevice>;

    /// Fetch the buffer and compute `request.algorithm` into `out`, which is exactly the
    /// buffer's sub-range of the record. When `dump` is given, the raw fetched bytes are
    /// appended to it.
    fn fetch_and_compute(
        &mut self,
        request: &ComputeRequest,
        out: &mut [u32],
        dump: Option<&mut Vec<u8>>,
    ) -> Result<(), ProviderError>;

    /// Switch the degraded (non-accelerated) fetch path on or off. Returns whether that
    /// mode is actually available.
    fn reduce_optimization(&mut self, enable: bool) -> bool;

    fn check_and_report_dma_errors(&mut self, subdevice: u32);

    /// Drop any per-iteration caches.
    fn invalidate(&mut self);
}

/// Optional per-buffer device producing its own signatures (for example a link CRC unit).
pub trait ExternalSignatureDevice {
    fn bin_count(&self) -> u32;
    fn signature_identity(&self) -> Result<String, ProviderError>;
    fn values(&self) -> Result<Vec<u32>, ProviderError>;
    fn report_mismatch(&self, bin: u32, expected: u32, actual: u32);
}
