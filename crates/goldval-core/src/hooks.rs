//! Side-effect collaborators: cooperative scheduling and buffer dumps.

use crate::buffer::BufferInfo;
use crate::config::DumpTriggers;
use crate::provider::ProviderError;

/// Cooperative scheduler the run loop yields to once per iteration.
pub trait Scheduler {
    fn yield_now(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn yield_now(&mut self) {}
}

/// Contents of one buffer handed out for dumping.
#[derive(Debug, Clone, Copy)]
pub struct DumpRequest<'a> {
    pub test_name: &'a str,
    pub loop_index: u32,
    pub buffer: &'a BufferInfo,
    /// Triggers that caused the dump.
    pub reason: DumpTriggers,
    /// Raw bytes as fetched by the provider.
    pub bytes: &'a [u8],
}

/// Receiver of buffer dumps. Encoding to image files happens behind this trait.
pub trait DumpSink {
    fn dump(&mut self, request: &DumpRequest<'_>) -> Result<(), ProviderError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullDumpSink;

impl DumpSink for NullDumpSink {
    fn dump(&mut self, _request: &DumpRequest<'_>) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Dump sink keeping every request in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingDumpSink {
    pub dumps: Vec<CollectedDump>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedDump {
    pub loop_index: u32,
    pub buffer: u32,
    pub reason: DumpTriggers,
    pub len: usize,
}

impl DumpSink for CollectingDumpSink {
    fn dump(&mut self, request: &DumpRequest<'_>) -> Result<(), ProviderError> {
        self.dumps.push(CollectedDump {
            loop_index: request.loop_index,
            buffer: request.buffer.index,
            reason: request.reason,
            len: request.bytes.len(),
        });
        Ok(())
    }
}

impl<T: DumpSink + ?Sized> DumpSink for &mut T {
    fn dump(&mut self, request: &DumpRequest<'_>) -> Result<(), ProviderError> {
        (**self).dump(request)
    }
}

impl<T: Scheduler + ?Sized> Scheduler for &mut T {
    fn yield_now(&mut self) {
        (**self).yield_now();
    }
}
