//! Run statistics and the end-of-test error-rate summary.

use serde::{Deserialize, Serialize};

use crate::error::GoldenError;
use crate::format::{Channel, ElementFormat, NUM_CHANNELS};
use crate::miscompare::MiscompareDetails;

/// Outcome of one buffer in one check iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferVerdict {
    Pass,
    /// Mismatches within the one-check allowances; recorded, never raised.
    Tolerated,
    ValueMismatch,
    ExtraValueMismatch,
}

/// One-check allowances a verdict is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowances {
    pub bad_bins: u32,
    pub error_bins: u32,
    pub extra_diffs: u32,
}

impl BufferVerdict {
    /// Classify the mismatches of one buffer.
    #[must_use]
    pub fn judge(details: &MiscompareDetails, unconditional: bool, allowed: Allowances) -> Self {
        let bad = details.num_bad();
        let err = details.num_err();
        let extra = details.num_extra_diff();
        if bad == 0 && !unconditional && extra == 0 {
            Self::Pass
        } else if bad > allowed.bad_bins || err > allowed.error_bins || unconditional {
            Self::ValueMismatch
        } else if extra > allowed.extra_diffs {
            Self::ExtraValueMismatch
        } else {
            Self::Tolerated
        }
    }

    #[must_use]
    pub const fn is_hard(self) -> bool {
        matches!(self, Self::ValueMismatch | Self::ExtraValueMismatch)
    }
}

/// Per-buffer counters since bind.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    pub checks: u32,
    pub passes: u32,
    pub tolerated: u32,
    pub failures: u32,
    /// Bad bins summed over iterations.
    pub bad_bins: u64,
    pub error_bins: u64,
    pub extra_diffs: u64,
}

impl BufferStats {
    pub(crate) fn record(&mut self, verdict: BufferVerdict, details: &MiscompareDetails) {
        self.checks += 1;
        match verdict {
            BufferVerdict::Pass => self.passes += 1,
            BufferVerdict::Tolerated => self.tolerated += 1,
            BufferVerdict::ValueMismatch | BufferVerdict::ExtraValueMismatch => {
                self.failures += 1;
            }
        }
        self.bad_bins += u64::from(details.num_bad());
        self.error_bins += u64::from(details.num_err());
        self.extra_diffs += u64::from(details.num_extra_diff());
    }
}

/// Iteration counters since bind.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub loops: u32,
    pub checks: u32,
    pub passes: u32,
    pub tolerated: u32,
    pub failures: u32,
    pub not_found: u32,
    pub retries: u32,
    pub stores: u32,
    pub duplicates: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTotal {
    pub channel: Channel,
    pub diff: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSummary {
    pub buffer: u32,
    pub format: ElementFormat,
    #[serde(flatten)]
    pub stats: BufferStats,
    pub channel_diff_sums: [i64; NUM_CHANNELS],
    /// Bins that mismatched in at least one iteration.
    pub ever_bad_bins: u32,
    pub ever_error_bins: u32,
}

/// End-of-test statistics, including the first deferred hard failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRateSummary {
    pub test_name: String,
    pub config_name: String,
    #[serde(flatten)]
    pub stats: RunStats,
    /// Failed check iterations over check iterations.
    pub error_rate: f64,
    pub total_bad_bins: u64,
    pub total_error_bins: u64,
    pub total_extra_diffs: u64,
    pub channel_totals: Vec<ChannelTotal>,
    pub buffers: Vec<BufferSummary>,
    pub first_failure: Option<String>,
    #[serde(skip)]
    deferred: Option<GoldenError>,
}

impl ErrorRateSummary {
    pub(crate) fn build(
        test_name: &str,
        config_name: &str,
        stats: &RunStats,
        buffers: Vec<BufferSummary>,
        deferred: Option<GoldenError>,
    ) -> Self {
        let mut channel_sums = [0i64; NUM_CHANNELS];
        for buffer in &buffers {
            for (dst, src) in channel_sums.iter_mut().zip(buffer.channel_diff_sums) {
                *dst = dst.saturating_add(src);
            }
        }
        let error_rate = if stats.checks == 0 {
            0.0
        } else {
            f64::from(stats.failures) / f64::from(stats.checks)
        };
        Self {
            test_name: test_name.to_string(),
            config_name: config_name.to_string(),
            stats: stats.clone(),
            error_rate,
            total_bad_bins: buffers.iter().map(|b| b.stats.bad_bins).sum(),
            total_error_bins: buffers.iter().map(|b| b.stats.error_bins).sum(),
            total_extra_diffs: buffers.iter().map(|b| b.stats.extra_diffs).sum(),
            channel_totals: Channel::ALL
                .iter()
                .map(|&channel| ChannelTotal {
                    channel,
                    diff: channel_sums[channel.index()],
                })
                .collect(),
            buffers,
            first_failure: deferred.as_ref().map(ToString::to_string),
            deferred,
        }
    }

    /// The first deferred hard failure, if any.
    pub fn status(&self) -> Result<(), GoldenError> {
        match &self.deferred {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.deferred.is_none() && self.stats.failures == 0 && self.stats.duplicates == 0
    }

    #[must_use]
    pub fn channel_total(&self, channel: Channel) -> i64 {
        self.channel_totals
            .iter()
            .find(|total| total.channel == channel)
            .map_or(0, |total| total.diff)
    }
}

pub(crate) fn buffer_summary(
    buffer: u32,
    format: ElementFormat,
    stats: &BufferStats,
    accumulated: &MiscompareDetails,
) -> BufferSummary {
    BufferSummary {
        buffer,
        format,
        stats: stats.clone(),
        channel_diff_sums: accumulated.channel_diff_sums,
        ever_bad_bins: accumulated.num_bad(),
        ever_error_bins: accumulated.num_err(),
    }
}
