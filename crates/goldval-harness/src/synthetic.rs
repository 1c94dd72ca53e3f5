//! Deterministic in-memory buffer provider and external signature device.
//!
//! Signatures here are simple stand-ins (per-bin channel sums and an FNV-style hash), good
//! enough to make every comparison path observable without hardware.

use parking_lot::Mutex;

use goldval_core::{
    Algorithm, BufferProvider, ComputeRequest, ElementFormat, ExternalSignatureDevice,
    FetchHint, ProviderError,
};

const FNV_OFFSET: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv_step(hash: u32, value: u32) -> u32 {
    (hash ^ value).wrapping_mul(FNV_PRIME)
}

/// External signature unit with fixed values; records every reported mismatch.
#[derive(Debug)]
pub struct SyntheticSigDevice {
    identity: String,
    values: Vec<u32>,
    fail_reads: bool,
    reported: Mutex<Vec<(u32, u32, u32)>>,
}

impl SyntheticSigDevice {
    #[must_use]
    pub fn new(identity: impl Into<String>, values: Vec<u32>) -> Self {
        Self {
            identity: identity.into(),
            values,
            fail_reads: false,
            reported: Mutex::new(Vec::new()),
        }
    }

    pub fn set_values(&mut self, values: Vec<u32>) {
        self.values = values;
    }

    /// Make `values` and `signature_identity` fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.fail_reads = failing;
    }

    /// Mismatches forwarded by the comparator as `(bin, expected, actual)`.
    #[must_use]
    pub fn reported(&self) -> Vec<(u32, u32, u32)> {
        self.reported.lock().clone()
    }
}

impl ExternalSignatureDevice for SyntheticSigDevice {
    fn bin_count(&self) -> u32 {
        self.values.len() as u32
    }

    fn signature_identity(&self) -> Result<String, ProviderError> {
        if self.fail_reads {
            return Err(ProviderError::new(format!("{}: link down", self.identity)));
        }
        Ok(self.identity.clone())
    }

    fn values(&self) -> Result<Vec<u32>, ProviderError> {
        if self.fail_reads {
            return Err(ProviderError::new(format!("{}: link down", self.identity)));
        }
        Ok(self.values.clone())
    }

    fn report_mismatch(&self, bin: u32, expected: u32, actual: u32) {
        self.reported.lock().push((bin, expected, actual));
    }
}

/// One observed buffer of the synthetic provider.
#[derive(Debug)]
pub struct SyntheticBuffer {
    pub width: u32,
    pub height: u32,
    pub format: ElementFormat,
    pub display: Option<u32>,
    /// Row-major elements, `channel_count` values each.
    pub values: Vec<u32>,
    pub counters: [u32; 4],
    /// Cyclic phase the counters are reported in.
    pub counter_phase: usize,
    /// Advance `counter_phase` after every counter read.
    pub rotate_counters: bool,
    pub extra_metric: u32,
    pub device: Option<SyntheticSigDevice>,
}

impl SyntheticBuffer {
    /// A buffer filled with a pattern derived from `seed`.
    #[must_use]
    pub fn patterned(width: u32, height: u32, format: ElementFormat, seed: u32) -> Self {
        let channels = format.channel_count();
        let mut values = Vec::with_capacity((width * height * channels) as usize);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    values.push(
                        (x.wrapping_mul(7) ^ y.wrapping_mul(13))
                            .wrapping_add(c * 31)
                            .wrapping_add(seed)
                            & 0xFF,
                    );
                }
            }
        }
        Self {
            width,
            height,
            format,
            display: None,
            values,
            counters: [seed, seed + 1, seed + 2, seed + 3],
            counter_phase: 0,
            rotate_counters: false,
            extra_metric: seed,
            device: None,
        }
    }

    /// A buffer where every channel of every element holds `value`.
    #[must_use]
    pub fn filled(width: u32, height: u32, format: ElementFormat, value: u32) -> Self {
        let mut buffer = Self::patterned(width, height, format, 0);
        buffer.values.fill(value);
        buffer
    }

    #[must_use]
    pub fn with_display(mut self, display: u32) -> Self {
        self.display = Some(display);
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: SyntheticSigDevice) -> Self {
        self.device = Some(device);
        self
    }

    fn index_of(&self, x: u32, y: u32, channel: u32) -> usize {
        ((y * self.width + x) * self.format.channel_count() + channel) as usize
    }

    pub fn set(&mut self, x: u32, y: u32, channel: u32, value: u32) {
        let index = self.index_of(x, y, channel);
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32, channel: u32) -> u32 {
        self.values
            .get(self.index_of(x, y, channel))
            .copied()
            .unwrap_or(0)
    }

    fn rows_in_bin(&self, bin: u32, bins: u32) -> impl Iterator<Item = &[u32]> + '_ {
        let row_len = (self.width * self.format.channel_count()) as usize;
        (0..self.height)
            .filter(move |y| y % bins == bin)
            .filter_map(move |y| {
                let start = y as usize * row_len;
                self.values.get(start..start + row_len)
            })
    }

    fn checksums(&self, bins: u32, out: &mut [u32]) {
        let channels = self.format.channel_count() as usize;
        for bin in 0..bins {
            let base = bin as usize * channels;
            let sums = &mut out[base..base + channels];
            sums.fill(0);
            for row in self.rows_in_bin(bin, bins) {
                for element in row.chunks(channels) {
                    for (sum, value) in sums.iter_mut().zip(element) {
                        *sum = sum.wrapping_add(*value);
                    }
                }
            }
        }
    }

    fn crcs(&self, bins: u32, out: &mut [u32]) {
        let channels = self.format.channel_count() as usize;
        for bin in 0..bins {
            let base = bin as usize * channels;
            let hashes = &mut out[base..base + channels];
            hashes.fill(FNV_OFFSET);
            for row in self.rows_in_bin(bin, bins) {
                for element in row.chunks(channels) {
                    for (hash, value) in hashes.iter_mut().zip(element) {
                        *hash = fnv_step(*hash, *value);
                    }
                }
            }
        }
    }

    fn display_crcs(&self, out: &mut [u32]) {
        for (seed, slot) in (0u32..).zip(out.iter_mut()) {
            *slot = self
                .values
                .iter()
                .fold(FNV_OFFSET ^ seed, |hash, value| fnv_step(hash, *value));
        }
    }

    fn read_counters(&mut self, out: &mut [u32]) {
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = self.counters[(c + self.counter_phase) % self.counters.len()];
        }
        if self.rotate_counters {
            self.counter_phase = (self.counter_phase + 1) % self.counters.len();
        }
    }

    fn dump_bytes(&self, dump: &mut Vec<u8>) {
        for value in &self.values {
            dump.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// One call the comparator made into the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRecord {
    pub buffer: u32,
    pub algorithm: Algorithm,
    pub fetch_hint: FetchHint,
    pub degraded: bool,
}

/// Buffer provider backed by [`SyntheticBuffer`]s.
#[derive(Debug, Default)]
pub struct SyntheticProvider {
    buffers: Vec<SyntheticBuffer>,
    degraded_available: bool,
    degraded: bool,
    /// Accelerated fetches still to corrupt.
    transient_faults: u32,
    fetches: Vec<FetchRecord>,
    invalidations: u32,
    dma_checks: u32,
}

impl SyntheticProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            degraded_available: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: SyntheticBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    pub fn push_buffer(&mut self, buffer: SyntheticBuffer) -> u32 {
        self.buffers.push(buffer);
        self.buffers.len() as u32 - 1
    }

    #[must_use]
    pub fn buffer(&self, index: u32) -> Option<&SyntheticBuffer> {
        self.buffers.get(index as usize)
    }

    pub fn buffer_mut(&mut self, index: u32) -> Option<&mut SyntheticBuffer> {
        self.buffers.get_mut(index as usize)
    }

    pub fn set_degraded_available(&mut self, available: bool) {
        self.degraded_available = available;
    }

    /// Corrupt the next `count` accelerated fetches.
    pub fn inject_transient_faults(&mut self, count: u32) {
        self.transient_faults = count;
    }

    #[must_use]
    pub fn fetches(&self) -> &[FetchRecord] {
        &self.fetches
    }

    pub fn clear_fetches(&mut self) {
        self.fetches.clear();
    }

    #[must_use]
    pub const fn invalidations(&self) -> u32 {
        self.invalidations
    }

    #[must_use]
    pub const fn dma_checks(&self) -> u32 {
        self.dma_checks
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn buffer_for(&self, index: u32) -> Option<&SyntheticBuffer> {
        self.buffers.get(index as usize)
    }
}

impl BufferProvider for SyntheticProvider {
    fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    fn format(&self, index: u32) -> ElementFormat {
        self.buffer_for(index)
            .map_or(ElementFormat::Raw32, |buffer| buffer.format)
    }

    fn width(&self, index: u32) -> u32 {
        self.buffer_for(index).map_or(0, |buffer| buffer.width)
    }

    fn height(&self, index: u32) -> u32 {
        self.buffer_for(index).map_or(0, |buffer| buffer.height)
    }

    fn pitch(&self, index: u32) -> u32 {
        self.buffer_for(index).map_or(0, |buffer| {
            buffer.width * buffer.format.bytes_per_element()
        })
    }

    fn associated_resource(&self, index: u32) -> Option<u32> {
        self.buffer_for(index).and_then(|buffer| buffer.display)
    }

    fn external_signature_device(&self, index: u32) -> Option<&dyn ExternalSignatureDevice> {
        self.buffer_for(index)
            .and_then(|buffer| buffer.device.as_ref())
            .map(|device| device as &dyn ExternalSignatureDevice)
    }

    fn fetch_and_compute(
        &mut self,
        request: &ComputeRequest,
        out: &mut [u32],
        dump: Option<&mut Vec<u8>>,
    ) -> Result<(), ProviderError> {
        let degraded = self.degraded;
        let corrupt = request.fetch_hint == FetchHint::DmaAccelerated
            && !degraded
            && self.transient_faults > 0;
        if corrupt {
            self.transient_faults -= 1;
        }
        self.fetches.push(FetchRecord {
            buffer: request.buffer,
            algorithm: request.algorithm,
            fetch_hint: request.fetch_hint,
            degraded,
        });

        let buffer = self
            .buffers
            .get_mut(request.buffer as usize)
            .ok_or_else(|| ProviderError::for_buffer(request.buffer, "no such buffer"))?;
        if let Some(dump) = dump {
            buffer.dump_bytes(dump);
        }
        match request.algorithm {
            Algorithm::Checksums => buffer.checksums(request.bins, out),
            Algorithm::Crcs => buffer.crcs(request.bins, out),
            Algorithm::DisplayCrcs => buffer.display_crcs(out),
            Algorithm::HwCounters => buffer.read_counters(out),
            Algorithm::ExtraMetric => out.fill(buffer.extra_metric),
            Algorithm::ExternalCrcs => {
                return Err(ProviderError::for_buffer(
                    request.buffer,
                    "external signatures are read from the device",
                ));
            }
        }
        if corrupt && let Some(first) = out.first_mut() {
            *first ^= 0x5A5A_5A5A;
        }
        Ok(())
    }

    fn reduce_optimization(&mut self, enable: bool) -> bool {
        if !self.degraded_available {
            return false;
        }
        self.degraded = enable;
        true
    }

    fn check_and_report_dma_errors(&mut self, _subdevice: u32) {
        self.dma_checks += 1;
    }

    fn invalidate(&mut self) {
        self.invalidations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldval_core::ComputeHint;

    fn request(algorithm: Algorithm, bins: u32) -> ComputeRequest {
        ComputeRequest {
            buffer: 0,
            subdevice: 0,
            fetch_hint: FetchHint::Simple,
            compute_hint: ComputeHint::WholeBufferCpu,
            bins,
            algorithm,
        }
    }

    #[test]
    fn checksums_split_rows_into_bins() {
        let mut provider = SyntheticProvider::new().with_buffer(SyntheticBuffer::filled(
            2,
            3,
            ElementFormat::R32F,
            5,
        ));
        let mut out = [0u32; 2];
        provider
            .fetch_and_compute(&request(Algorithm::Checksums, 2), &mut out, None)
            .unwrap();
        // rows 0 and 2 land in bin 0, row 1 in bin 1
        assert_eq!(out, [20, 10]);
    }

    #[test]
    fn crcs_change_with_content() {
        let mut provider = SyntheticProvider::new().with_buffer(SyntheticBuffer::patterned(
            4,
            4,
            ElementFormat::R8G8B8A8,
            1,
        ));
        let mut before = [0u32; 4];
        provider
            .fetch_and_compute(&request(Algorithm::Crcs, 1), &mut before, None)
            .unwrap();
        provider.buffer_mut(0).unwrap().set(1, 1, 2, 200);
        let mut after = [0u32; 4];
        provider
            .fetch_and_compute(&request(Algorithm::Crcs, 1), &mut after, None)
            .unwrap();
        assert_eq!(before[0], after[0]);
        assert_ne!(before[2], after[2]);
    }

    #[test]
    fn rotating_counters_shift_phase() {
        let mut buffer = SyntheticBuffer::patterned(1, 1, ElementFormat::Y8, 10);
        buffer.rotate_counters = true;
        let mut provider = SyntheticProvider::new().with_buffer(buffer);
        let mut first = [0u32; 4];
        let mut second = [0u32; 4];
        provider
            .fetch_and_compute(&request(Algorithm::HwCounters, 1), &mut first, None)
            .unwrap();
        provider
            .fetch_and_compute(&request(Algorithm::HwCounters, 1), &mut second, None)
            .unwrap();
        assert_eq!(first, [10, 11, 12, 13]);
        assert_eq!(second, [11, 12, 13, 10]);
    }

    #[test]
    fn transient_faults_only_hit_accelerated_fetches() {
        let mut provider = SyntheticProvider::new().with_buffer(SyntheticBuffer::filled(
            1,
            1,
            ElementFormat::R32F,
            7,
        ));
        provider.inject_transient_faults(1);
        let mut simple = [0u32; 1];
        provider
            .fetch_and_compute(&request(Algorithm::Checksums, 1), &mut simple, None)
            .unwrap();
        assert_eq!(simple, [7]);

        let mut accelerated_request = request(Algorithm::Checksums, 1);
        accelerated_request.fetch_hint = FetchHint::DmaAccelerated;
        let mut corrupted = [0u32; 1];
        provider
            .fetch_and_compute(&accelerated_request, &mut corrupted, None)
            .unwrap();
        assert_ne!(corrupted, [7]);
        let mut clean = [0u32; 1];
        provider
            .fetch_and_compute(&accelerated_request, &mut clean, None)
            .unwrap();
        assert_eq!(clean, [7]);
    }

    #[test]
    fn dump_bytes_cover_all_values() {
        let mut provider = SyntheticProvider::new().with_buffer(SyntheticBuffer::filled(
            2,
            2,
            ElementFormat::R8G8B8A8,
            1,
        ));
        let mut dump = Vec::new();
        let mut out = [0u32; 4];
        provider
            .fetch_and_compute(&request(Algorithm::Checksums, 1), &mut out, Some(&mut dump))
            .unwrap();
        assert_eq!(dump.len(), 2 * 2 * 4 * 4);
        assert_eq!(out, [4, 4, 4, 4]);
    }

    #[test]
    fn device_records_mismatches() {
        let device = SyntheticSigDevice::new("link-0", vec![1, 2]);
        device.report_mismatch(1, 2, 3);
        assert_eq!(device.reported(), vec![(1, 2, 3)]);
        assert_eq!(device.bin_count(), 2);
    }

    #[test]
    fn degraded_mode_can_be_unavailable() {
        let mut provider = SyntheticProvider::new();
        assert!(provider.reduce_optimization(true));
        assert!(provider.is_degraded());
        provider.set_degraded_available(false);
        assert!(!provider.reduce_optimization(false));
    }
}
