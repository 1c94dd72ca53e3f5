//! Signature algorithm registry.
//!
//! Each known algorithm is one variant of [`Algorithm`]. Everything the layout
//! calculator and comparator need to know about it (element and bin counts, format
//! applicability, resource requirements, comparison mode, error handler) is answered by
//! matching on the variant. [`Algorithm::ALL`] is the canonical order used to lay out a
//! record.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferInfo;
use crate::format::ElementFormat;

bitflags! {
    /// Set of active algorithms.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AlgorithmMask: u32 {
        const CHECKSUMS = 1 << 0;
        const CRCS = 1 << 1;
        const DISPLAY_CRCS = 1 << 2;
        const EXTERNAL_CRCS = 1 << 3;
        const HW_COUNTERS = 1 << 4;
        const EXTRA_METRIC = 1 << 5;
    }
}

impl Default for AlgorithmMask {
    fn default() -> Self {
        Self::CHECKSUMS | Self::CRCS
    }
}

/// Number of elements produced by the hardware counter algorithm.
pub const HW_COUNTER_ELEMENTS: u32 = 4;

/// Number of values a display CRC unit reports.
pub const DISPLAY_CRC_ELEMENTS: u32 = 3;

/// Known signature algorithms, declared in canonical layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    /// Per-channel sums, tolerant within a per-channel threshold.
    Checksums,
    /// Per-channel CRCs; any difference is an error.
    Crcs,
    /// CRCs captured by the display engine scanning the buffer out.
    DisplayCrcs,
    /// Values produced by an external signature device attached to the buffer.
    ExternalCrcs,
    /// Hardware counters with no stable ordering between elements.
    HwCounters,
    /// Out-of-band scalar metric, accounted separately from bins.
    ExtraMetric,
}

/// How new and reference values are matched up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    Positional,
    /// Any cyclic rotation of a bin's element tuple is accepted.
    RotationTolerant,
}

/// Strategy invoked for each mismatch found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandler {
    /// Accumulate `|new - old|` per channel; the bin is an error only past tolerance.
    SimpleDifference,
    /// Every mismatch is an error bin.
    StrictEquality,
    /// Forward to the buffer's external signature device.
    ExternalDevice,
    /// Record an out-of-band diff instead of flagging bins.
    ExtraMetric,
    /// Unconditionally fatal.
    Fatal,
}

/// Bin configuration shared by the bin-capable algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinSettings {
    pub checksum_bins: u32,
    pub crc_bins: u32,
}

impl Default for BinSettings {
    fn default() -> Self {
        Self {
            checksum_bins: 1,
            crc_bins: 1,
        }
    }
}

impl Algorithm {
    pub const COUNT: usize = 6;

    pub const ALL: [Algorithm; Self::COUNT] = [
        Algorithm::Checksums,
        Algorithm::Crcs,
        Algorithm::DisplayCrcs,
        Algorithm::ExternalCrcs,
        Algorithm::HwCounters,
        Algorithm::ExtraMetric,
    ];

    /// Stable identifier; never reused.
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Checksums => 1,
            Self::Crcs => 2,
            Self::DisplayCrcs => 3,
            Self::ExternalCrcs => 4,
            Self::HwCounters => 5,
            Self::ExtraMetric => 6,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Checksums => "checksums",
            Self::Crcs => "crcs",
            Self::DisplayCrcs => "display_crcs",
            Self::ExternalCrcs => "external_crcs",
            Self::HwCounters => "hw_counters",
            Self::ExtraMetric => "extra_metric",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(name))
    }

    /// Position in [`Algorithm::ALL`].
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn mask_bit(self) -> AlgorithmMask {
        match self {
            Self::Checksums => AlgorithmMask::CHECKSUMS,
            Self::Crcs => AlgorithmMask::CRCS,
            Self::DisplayCrcs => AlgorithmMask::DISPLAY_CRCS,
            Self::ExternalCrcs => AlgorithmMask::EXTERNAL_CRCS,
            Self::HwCounters => AlgorithmMask::HW_COUNTERS,
            Self::ExtraMetric => AlgorithmMask::EXTRA_METRIC,
        }
    }

    #[must_use]
    pub const fn requires_associated_resource(self) -> bool {
        matches!(self, Self::DisplayCrcs)
    }

    #[must_use]
    pub const fn requires_external_device(self) -> bool {
        matches!(self, Self::ExternalCrcs)
    }

    #[must_use]
    pub const fn compare_mode(self) -> CompareMode {
        match self {
            Self::HwCounters => CompareMode::RotationTolerant,
            _ => CompareMode::Positional,
        }
    }

    #[must_use]
    pub const fn rotation_tolerant(self) -> bool {
        matches!(self.compare_mode(), CompareMode::RotationTolerant)
    }

    #[must_use]
    pub const fn error_handler(self) -> ErrorHandler {
        match self {
            Self::Checksums => ErrorHandler::SimpleDifference,
            Self::Crcs | Self::DisplayCrcs => ErrorHandler::StrictEquality,
            Self::ExternalCrcs => ErrorHandler::ExternalDevice,
            Self::HwCounters => ErrorHandler::Fatal,
            Self::ExtraMetric => ErrorHandler::ExtraMetric,
        }
    }

    #[must_use]
    pub fn supports_format(self, format: ElementFormat) -> bool {
        match self {
            Self::DisplayCrcs => format.is_color(),
            _ => true,
        }
    }

    /// Values computed per bin for a buffer of `format`.
    #[must_use]
    pub fn element_count(self, format: ElementFormat) -> u32 {
        if !self.supports_format(format) {
            return 0;
        }
        match self {
            Self::Checksums | Self::Crcs => format.channel_count(),
            Self::DisplayCrcs => DISPLAY_CRC_ELEMENTS,
            Self::ExternalCrcs | Self::ExtraMetric => 1,
            Self::HwCounters => HW_COUNTER_ELEMENTS,
        }
    }

    /// Bins computed for `buffer`.
    #[must_use]
    pub fn bin_count(self, buffer: &BufferInfo, bins: &BinSettings) -> u32 {
        match self {
            Self::Checksums => bins.checksum_bins.max(1),
            Self::Crcs => bins.crc_bins.max(1),
            Self::ExternalCrcs => buffer.external_bins.unwrap_or(0),
            Self::DisplayCrcs | Self::HwCounters | Self::ExtraMetric => 1,
        }
    }

    /// Whether this algorithm produces any values for `buffer`.
    #[must_use]
    pub fn applies_to(self, buffer: &BufferInfo) -> bool {
        if self.requires_associated_resource() && !buffer.has_display() {
            return false;
        }
        if self.requires_external_device() && !buffer.has_external_device() {
            return false;
        }
        self.supports_format(buffer.format)
    }

    /// Number of record words this algorithm occupies for `buffer`, or `None` when that
    /// does not fit in a `u32`.
    #[must_use]
    pub fn contribution(self, buffer: &BufferInfo, bins: &BinSettings) -> Option<u32> {
        if !self.applies_to(buffer) {
            return Some(0);
        }
        self.element_count(buffer.format)
            .checked_mul(self.bin_count(buffer, bins))
    }

    /// Active algorithms of `mask` in canonical order.
    pub fn active(mask: AlgorithmMask) -> impl Iterator<Item = Algorithm> {
        Self::ALL
            .into_iter()
            .filter(move |alg| mask.contains(alg.mask_bit()))
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_matches_ordinals() {
        for (i, alg) in Algorithm::ALL.iter().enumerate() {
            assert_eq!(alg.ordinal(), i);
        }
    }

    #[test]
    fn ids_and_bits_are_unique() {
        let mut seen = AlgorithmMask::empty();
        let mut ids = Vec::new();
        for alg in Algorithm::ALL {
            assert!(!seen.intersects(alg.mask_bit()));
            seen |= alg.mask_bit();
            assert!(!ids.contains(&alg.id()));
            ids.push(alg.id());
        }
        assert_eq!(seen, AlgorithmMask::all());
    }

    #[test]
    fn display_crcs_need_display_and_color() {
        let bins = BinSettings::default();
        let plain = BufferInfo::new(0, 8, 8, ElementFormat::R8G8B8A8);
        assert_eq!(Algorithm::DisplayCrcs.contribution(&plain, &bins), Some(0));

        let scanned = plain.clone().with_display(2);
        assert_eq!(Algorithm::DisplayCrcs.contribution(&scanned, &bins), Some(3));

        let depth = BufferInfo::new(1, 8, 8, ElementFormat::Z24S8).with_display(2);
        assert_eq!(Algorithm::DisplayCrcs.contribution(&depth, &bins), Some(0));
    }

    #[test]
    fn external_crcs_use_device_bins() {
        let bins = BinSettings::default();
        let info = BufferInfo::new(0, 8, 8, ElementFormat::R8G8B8A8);
        assert_eq!(Algorithm::ExternalCrcs.contribution(&info, &bins), Some(0));
        let info = info.with_external_bins(4);
        assert_eq!(Algorithm::ExternalCrcs.contribution(&info, &bins), Some(4));
    }

    #[test]
    fn checksum_contribution_scales_with_bins() {
        let bins = BinSettings {
            checksum_bins: 8,
            crc_bins: 2,
        };
        let info = BufferInfo::new(0, 8, 8, ElementFormat::Z24S8);
        assert_eq!(Algorithm::Checksums.contribution(&info, &bins), Some(16));
        assert_eq!(Algorithm::Crcs.contribution(&info, &bins), Some(4));
    }

    #[test]
    fn oversized_contribution_is_none() {
        let bins = BinSettings {
            checksum_bins: 1 << 30,
            crc_bins: 1,
        };
        let info = BufferInfo::new(0, 8, 8, ElementFormat::R8G8B8A8);
        assert_eq!(Algorithm::Checksums.contribution(&info, &bins), None);
        assert_eq!(Algorithm::Crcs.contribution(&info, &bins), Some(4));
    }

    #[test]
    fn only_hw_counters_rotate() {
        let rotating: Vec<_> = Algorithm::ALL
            .into_iter()
            .filter(|alg| alg.rotation_tolerant())
            .collect();
        assert_eq!(rotating, vec![Algorithm::HwCounters]);
    }

    #[test]
    fn active_iterates_in_canonical_order() {
        let mask = AlgorithmMask::EXTRA_METRIC | AlgorithmMask::CHECKSUMS;
        let active: Vec<_> = Algorithm::active(mask).collect();
        assert_eq!(active, vec![Algorithm::Checksums, Algorithm::ExtraMetric]);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(
            Algorithm::from_name("HW_COUNTERS"),
            Some(Algorithm::HwCounters)
        );
        assert_eq!(Algorithm::from_name("md5"), None);
    }
}
