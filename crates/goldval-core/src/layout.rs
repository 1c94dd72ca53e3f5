//! Record layout calculator.
//!
//! A record is a flat `u32` sequence holding one contiguous range per (algorithm, buffer)
//! pair. Ranges are ordered buffer-major, then by canonical algorithm order, so binding an
//! extra buffer only appends ranges and never moves existing ones.
//!
//! Every offset comes from [`offset_in`]; nothing else computes record positions.

use std::ops::Range;

use serde::Serialize;

use crate::algorithm::{Algorithm, AlgorithmMask, BinSettings};
use crate::buffer::BufferInfo;
use crate::error::GoldenError;

/// Position queried from the layout function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSlot {
    Algorithm(Algorithm),
    /// One past the last algorithm of a buffer.
    End,
}

/// Offset of `slot` for buffer `buffer_index`: the running total of all contributions
/// that precede it. `None` when the running total overflows a `u32`.
///
/// `buffers` must be ordered by index. Querying [`LayoutSlot::End`] at the last buffer
/// yields the total record length.
#[must_use]
pub fn offset_in(
    mask: AlgorithmMask,
    buffers: &[BufferInfo],
    bins: &BinSettings,
    slot: LayoutSlot,
    buffer_index: u32,
) -> Option<u32> {
    let mut total = 0u32;
    for buffer in buffers {
        for alg in Algorithm::ALL {
            if buffer.index == buffer_index && slot == LayoutSlot::Algorithm(alg) {
                return Some(total);
            }
            if mask.contains(alg.mask_bit()) {
                total = total.checked_add(alg.contribution(buffer, bins)?)?;
            }
        }
        if buffer.index == buffer_index && slot == LayoutSlot::End {
            return Some(total);
        }
    }
    Some(total)
}

fn overflow(buffer: u32) -> GoldenError {
    GoldenError::precondition(format!(
        "record layout overflows u32 at buffer {buffer}; reduce the bin counts"
    ))
}

/// Placement of one (algorithm, buffer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub offset: u32,
    pub elements: u32,
    pub bins: u32,
}

impl SlotInfo {
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.elements * self.bins
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.len() as usize
    }
}

/// Layout of the record for one buffer-set binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    mask: AlgorithmMask,
    bins: BinSettings,
    buffers: Vec<BufferInfo>,
    /// Per buffer, per canonical algorithm.
    slots: Vec<[SlotInfo; Algorithm::COUNT]>,
    total_len: u32,
}

impl RecordLayout {
    /// Compute the layout for `buffers`, which must carry indices `0..n` in order.
    pub fn compute(
        mask: AlgorithmMask,
        buffers: Vec<BufferInfo>,
        bins: BinSettings,
    ) -> Result<Self, GoldenError> {
        for (position, buffer) in buffers.iter().enumerate() {
            if buffer.index as usize != position {
                return Err(GoldenError::precondition(format!(
                    "buffer at position {position} carries index {}",
                    buffer.index
                )));
            }
        }

        let mut slots = Vec::with_capacity(buffers.len());
        for buffer in &buffers {
            let mut row = [SlotInfo {
                offset: 0,
                elements: 0,
                bins: 0,
            }; Algorithm::COUNT];
            for alg in Algorithm::active(mask) {
                let offset = offset_in(
                    mask,
                    &buffers,
                    &bins,
                    LayoutSlot::Algorithm(alg),
                    buffer.index,
                )
                .ok_or_else(|| overflow(buffer.index))?;
                let info = if alg.applies_to(buffer) {
                    SlotInfo {
                        offset,
                        elements: alg.element_count(buffer.format),
                        bins: alg.bin_count(buffer, &bins),
                    }
                } else {
                    SlotInfo {
                        offset,
                        elements: 0,
                        bins: 0,
                    }
                };
                row[alg.ordinal()] = info;
            }
            slots.push(row);
        }

        let total_len = match buffers.last() {
            Some(last) => offset_in(mask, &buffers, &bins, LayoutSlot::End, last.index)
                .ok_or_else(|| overflow(last.index))?,
            None => 0,
        };

        Ok(Self {
            mask,
            bins,
            buffers,
            slots,
            total_len,
        })
    }

    #[must_use]
    pub const fn mask(&self) -> AlgorithmMask {
        self.mask
    }

    #[must_use]
    pub const fn bins(&self) -> BinSettings {
        self.bins
    }

    #[must_use]
    pub fn buffers(&self) -> &[BufferInfo] {
        &self.buffers
    }

    #[must_use]
    pub fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    #[must_use]
    pub fn buffer(&self, index: u32) -> Option<&BufferInfo> {
        self.buffers.get(index as usize)
    }

    #[must_use]
    pub const fn total_len(&self) -> u32 {
        self.total_len
    }

    fn check(&self, alg: Algorithm, buffer: u32) -> Result<(), GoldenError> {
        if !self.mask.contains(alg.mask_bit()) {
            return Err(GoldenError::precondition(format!(
                "algorithm {alg} is not in the active mask"
            )));
        }
        if buffer as usize >= self.buffers.len() {
            return Err(GoldenError::precondition(format!(
                "buffer {buffer} is beyond the {} bound buffers",
                self.buffers.len()
            )));
        }
        Ok(())
    }

    pub fn slot(&self, alg: Algorithm, buffer: u32) -> Result<SlotInfo, GoldenError> {
        self.check(alg, buffer)?;
        Ok(self.slots[buffer as usize][alg.ordinal()])
    }

    pub fn offset_of(&self, alg: Algorithm, buffer: u32) -> Result<u32, GoldenError> {
        self.slot(alg, buffer).map(|slot| slot.offset)
    }

    pub fn range_of(&self, alg: Algorithm, buffer: u32) -> Result<Range<usize>, GoldenError> {
        self.slot(alg, buffer).map(|slot| slot.range())
    }

    /// Active algorithms that produce values for `buffer`, with their slots.
    pub fn slots_for(
        &self,
        buffer: u32,
    ) -> impl Iterator<Item = (Algorithm, SlotInfo)> + '_ {
        let row = self.slots.get(buffer as usize);
        Algorithm::active(self.mask).filter_map(move |alg| {
            let slot = row?[alg.ordinal()];
            (!slot.is_empty()).then_some((alg, slot))
        })
    }

    /// Largest bin count of any slot of `buffer`.
    #[must_use]
    pub fn max_bins(&self, buffer: u32) -> u32 {
        self.slots_for(buffer)
            .map(|(_, slot)| slot.bins)
            .max()
            .unwrap_or(0)
    }

    /// Record range covering all slots of `buffer`.
    pub fn buffer_range(&self, buffer: u32) -> Result<Range<usize>, GoldenError> {
        if buffer as usize >= self.buffers.len() {
            return Err(GoldenError::precondition(format!(
                "buffer {buffer} is beyond the {} bound buffers",
                self.buffers.len()
            )));
        }
        let start = offset_in(
            self.mask,
            &self.buffers,
            &self.bins,
            LayoutSlot::Algorithm(Algorithm::ALL[0]),
            buffer,
        )
        .ok_or_else(|| overflow(buffer))?;
        let end = offset_in(self.mask, &self.buffers, &self.bins, LayoutSlot::End, buffer)
            .ok_or_else(|| overflow(buffer))?;
        Ok(start as usize..end as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ElementFormat;

    fn rgba(index: u32) -> BufferInfo {
        BufferInfo::new(index, 16, 16, ElementFormat::R8G8B8A8)
    }

    #[test]
    fn empty_binding_has_zero_length() {
        let layout =
            RecordLayout::compute(AlgorithmMask::all(), Vec::new(), BinSettings::default())
                .expect("empty layout");
        assert_eq!(layout.total_len(), 0);
        assert!(layout.offset_of(Algorithm::Checksums, 0).is_err());
    }

    #[test]
    fn offsets_are_buffer_major() {
        let mask = AlgorithmMask::CHECKSUMS | AlgorithmMask::CRCS;
        let layout = RecordLayout::compute(
            mask,
            vec![rgba(0), rgba(1)],
            BinSettings {
                checksum_bins: 2,
                crc_bins: 1,
            },
        )
        .expect("layout");
        assert_eq!(layout.offset_of(Algorithm::Checksums, 0).unwrap(), 0);
        assert_eq!(layout.offset_of(Algorithm::Crcs, 0).unwrap(), 8);
        assert_eq!(layout.offset_of(Algorithm::Checksums, 1).unwrap(), 12);
        assert_eq!(layout.offset_of(Algorithm::Crcs, 1).unwrap(), 20);
        assert_eq!(layout.total_len(), 24);
        assert_eq!(layout.buffer_range(1).unwrap(), 12..24);
    }

    #[test]
    fn inapplicable_algorithms_contribute_nothing() {
        let mask = AlgorithmMask::CHECKSUMS | AlgorithmMask::DISPLAY_CRCS | AlgorithmMask::CRCS;
        let layout = RecordLayout::compute(
            mask,
            vec![rgba(0), rgba(1).with_display(5)],
            BinSettings::default(),
        )
        .expect("layout");
        let slot = layout.slot(Algorithm::DisplayCrcs, 0).unwrap();
        assert!(slot.is_empty());
        assert_eq!(slot.offset, 8);
        assert_eq!(layout.offset_of(Algorithm::Crcs, 0).unwrap(), 4);
        assert_eq!(layout.range_of(Algorithm::DisplayCrcs, 1).unwrap(), 16..19);
        assert_eq!(layout.total_len(), 19);
        let algs: Vec<_> = layout.slots_for(0).map(|(alg, _)| alg).collect();
        assert_eq!(algs, vec![Algorithm::Checksums, Algorithm::Crcs]);
    }

    #[test]
    fn inactive_algorithm_is_a_precondition_violation() {
        let layout =
            RecordLayout::compute(AlgorithmMask::CHECKSUMS, vec![rgba(0)], BinSettings::default())
                .expect("layout");
        let err = layout
            .offset_of(Algorithm::HwCounters, 0)
            .expect_err("inactive algorithm");
        assert!(matches!(err, GoldenError::PreconditionViolation(_)));
        assert!(layout.offset_of(Algorithm::Checksums, 1).is_err());
    }

    #[test]
    fn misnumbered_buffers_rejected() {
        let err = RecordLayout::compute(
            AlgorithmMask::CHECKSUMS,
            vec![rgba(1)],
            BinSettings::default(),
        )
        .expect_err("index mismatch");
        assert!(matches!(err, GoldenError::PreconditionViolation(_)));
    }

    #[test]
    fn overflowing_total_is_a_precondition_violation() {
        let bins = BinSettings {
            checksum_bins: 1 << 28,
            crc_bins: 1,
        };
        let buffers: Vec<_> = (0..4).map(rgba).collect();
        assert_eq!(
            offset_in(AlgorithmMask::CHECKSUMS, &buffers, &bins, LayoutSlot::End, 2),
            Some(3 << 30)
        );
        assert_eq!(
            offset_in(AlgorithmMask::CHECKSUMS, &buffers, &bins, LayoutSlot::End, 3),
            None
        );
        let err = RecordLayout::compute(AlgorithmMask::CHECKSUMS, buffers, bins)
            .expect_err("record does not fit");
        assert!(matches!(err, GoldenError::PreconditionViolation(_)), "{err:?}");
    }

    #[test]
    fn end_sentinel_matches_total() {
        let mask = AlgorithmMask::all();
        let buffers = vec![
            rgba(0).with_external_bins(2),
            BufferInfo::new(1, 8, 8, ElementFormat::Z24S8),
        ];
        let bins = BinSettings::default();
        let total = offset_in(mask, &buffers, &bins, LayoutSlot::End, 1).expect("fits");
        let layout = RecordLayout::compute(mask, buffers, bins).expect("layout");
        assert_eq!(layout.total_len(), total);
        // rgba: 4 + 4 + 0 (no display) + 2 + 4 + 1; z24s8: 2 + 2 + 0 + 0 + 4 + 1
        assert_eq!(total, 15 + 9);
    }

    #[test]
    fn appending_a_buffer_keeps_existing_offsets() {
        let mask = AlgorithmMask::all();
        let bins = BinSettings {
            checksum_bins: 3,
            crc_bins: 2,
        };
        let two = RecordLayout::compute(mask, vec![rgba(0), rgba(1).with_display(1)], bins)
            .expect("layout");
        let three = RecordLayout::compute(
            mask,
            vec![rgba(0), rgba(1).with_display(1), rgba(2)],
            bins,
        )
        .expect("layout");
        assert!(three.total_len() >= two.total_len());
        for buffer in 0..2 {
            for alg in Algorithm::ALL {
                assert_eq!(
                    two.slot(alg, buffer).unwrap(),
                    three.slot(alg, buffer).unwrap()
                );
            }
        }
        assert_eq!(
            three.offset_of(Algorithm::Checksums, 2).unwrap(),
            two.total_len()
        );
    }
}
