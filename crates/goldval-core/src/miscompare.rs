//! Miscompare accumulation.
//!
//! A [`MiscompareDetails`] describes the mismatches of one buffer in one iteration, or,
//! once accumulated, across many. Bin flags merge with OR, diff sums add, and vectors
//! only ever grow.

use serde::{Deserialize, Serialize};

use crate::format::{Channel, NUM_CHANNELS};

/// Mismatch of one out-of-band scalar metric.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDiff {
    /// Absolute difference; summed when accumulated.
    pub diff: i64,
    pub expected: u32,
    pub actual: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscompareDetails {
    /// Any mismatch in the bin, tolerated or not.
    pub bad_bins: Vec<bool>,
    /// Mismatch past tolerance in the bin.
    pub err_bins: Vec<bool>,
    pub channel_diff_sums: [i64; NUM_CHANNELS],
    pub extra_diffs: Vec<ExtraDiff>,
    /// Bit `i % 64` set when buffer `i` reported a mismatch.
    pub resource_fault_mask: u64,
}

impl MiscompareDetails {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bins(bins: u32) -> Self {
        let mut details = Self::default();
        details.ensure_bins(bins as usize);
        details
    }

    /// Grow both bin vectors to at least `bins` entries.
    pub fn ensure_bins(&mut self, bins: usize) {
        if self.bad_bins.len() < bins {
            self.bad_bins.resize(bins, false);
        }
        if self.err_bins.len() < bins {
            self.err_bins.resize(bins, false);
        }
    }

    pub fn ensure_extra(&mut self, slots: usize) {
        if self.extra_diffs.len() < slots {
            self.extra_diffs.resize(slots, ExtraDiff::default());
        }
    }

    pub fn flag_bad(&mut self, bin: u32) {
        let bin = bin as usize;
        self.ensure_bins(bin + 1);
        self.bad_bins[bin] = true;
    }

    /// Flag `bin` as an error; an error bin is always also bad.
    pub fn flag_err(&mut self, bin: u32) {
        let bin = bin as usize;
        self.ensure_bins(bin + 1);
        self.bad_bins[bin] = true;
        self.err_bins[bin] = true;
    }

    pub fn add_channel_diff(&mut self, channel: Channel, diff: i64) {
        self.channel_diff_sums[channel.index()] =
            self.channel_diff_sums[channel.index()].saturating_add(diff);
    }

    pub fn record_extra(&mut self, slot: usize, expected: u32, actual: u32) {
        self.ensure_extra(slot + 1);
        self.extra_diffs[slot] = ExtraDiff {
            diff: (i64::from(actual) - i64::from(expected)).abs(),
            expected,
            actual,
        };
    }

    pub fn mark_resource_fault(&mut self, buffer: u32) {
        self.resource_fault_mask |= 1u64 << (buffer % 64);
    }

    /// Merge `other` into `self`.
    pub fn accumulate(&mut self, other: &MiscompareDetails) {
        self.ensure_bins(other.bad_bins.len().max(other.err_bins.len()));
        for (dst, src) in self.bad_bins.iter_mut().zip(&other.bad_bins) {
            *dst |= *src;
        }
        for (dst, src) in self.err_bins.iter_mut().zip(&other.err_bins) {
            *dst |= *src;
        }
        for (dst, src) in self
            .channel_diff_sums
            .iter_mut()
            .zip(other.channel_diff_sums)
        {
            *dst = dst.saturating_add(src);
        }
        self.ensure_extra(other.extra_diffs.len());
        for (dst, src) in self.extra_diffs.iter_mut().zip(&other.extra_diffs) {
            if src.diff != 0 {
                dst.expected = src.expected;
                dst.actual = src.actual;
            }
            dst.diff = dst.diff.saturating_add(src.diff);
        }
        self.resource_fault_mask |= other.resource_fault_mask;
    }

    #[must_use]
    pub fn num_bad(&self) -> u32 {
        self.bad_bins.iter().filter(|&&bad| bad).count() as u32
    }

    #[must_use]
    pub fn num_err(&self) -> u32 {
        self.err_bins.iter().filter(|&&err| err).count() as u32
    }

    #[must_use]
    pub fn num_extra_diff(&self) -> u32 {
        self.extra_diffs.iter().filter(|d| d.diff != 0).count() as u32
    }

    #[must_use]
    pub fn channel_diff(&self, channel: Channel) -> i64 {
        self.channel_diff_sums[channel.index()]
    }

    #[must_use]
    pub fn total_channel_diff(&self) -> i64 {
        self.channel_diff_sums
            .iter()
            .fold(0i64, |acc, d| acc.saturating_add(*d))
    }

    /// No mismatch of any kind was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.num_bad() == 0 && self.num_extra_diff() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bins_are_also_bad() {
        let mut details = MiscompareDetails::with_bins(4);
        details.flag_err(2);
        assert_eq!(details.num_bad(), 1);
        assert_eq!(details.num_err(), 1);
        details.flag_bad(0);
        assert_eq!(details.num_bad(), 2);
        assert_eq!(details.num_err(), 1);
    }

    #[test]
    fn accumulate_ors_flags_and_sums_diffs() {
        let mut total = MiscompareDetails::with_bins(2);
        total.flag_bad(0);
        total.add_channel_diff(Channel::Red, 5);

        let mut next = MiscompareDetails::with_bins(2);
        next.flag_err(1);
        next.add_channel_diff(Channel::Red, 3);
        next.add_channel_diff(Channel::Depth, 1);

        total.accumulate(&next);
        assert_eq!(total.bad_bins, vec![true, true]);
        assert_eq!(total.err_bins, vec![false, true]);
        assert_eq!(total.channel_diff(Channel::Red), 8);
        assert_eq!(total.channel_diff(Channel::Depth), 1);
        assert_eq!(total.total_channel_diff(), 9);
    }

    #[test]
    fn accumulate_grows_shorter_side() {
        let mut short = MiscompareDetails::with_bins(1);
        let mut long = MiscompareDetails::with_bins(5);
        long.flag_bad(4);
        short.accumulate(&long);
        assert_eq!(short.bad_bins.len(), 5);
        assert_eq!(short.err_bins.len(), 5);
        assert!(short.bad_bins[4]);
        assert!(!short.bad_bins[0]);

        // The longer side never shrinks when merging a shorter one.
        let mut long_again = MiscompareDetails::with_bins(5);
        long_again.accumulate(&MiscompareDetails::with_bins(1));
        assert_eq!(long_again.bad_bins.len(), 5);
    }

    #[test]
    fn extra_diffs_sum_and_count() {
        let mut details = MiscompareDetails::new();
        details.record_extra(1, 10, 7);
        assert_eq!(details.extra_diffs.len(), 2);
        assert_eq!(details.num_extra_diff(), 1);
        assert_eq!(details.extra_diffs[1].diff, 3);

        let mut total = MiscompareDetails::new();
        total.accumulate(&details);
        total.accumulate(&details);
        assert_eq!(total.extra_diffs[1].diff, 6);
        assert_eq!(total.extra_diffs[1].expected, 10);
        assert_eq!(total.num_extra_diff(), 1);
        assert_eq!(total.num_bad(), 0);
    }

    #[test]
    fn fault_mask_merges_with_or() {
        let mut a = MiscompareDetails::new();
        a.mark_resource_fault(0);
        let mut b = MiscompareDetails::new();
        b.mark_resource_fault(3);
        a.accumulate(&b);
        assert_eq!(a.resource_fault_mask, 0b1001);
    }

    #[test]
    fn clean_details() {
        assert!(MiscompareDetails::with_bins(8).is_clean());
    }
}
