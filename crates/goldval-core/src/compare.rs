//! Comparison modes and mismatch handlers.
//!
//! [`compare_slot`] walks one (algorithm, buffer) slot of a new record against the same
//! slot of the reference record, hands every mismatch to the algorithm's
//! [`ErrorHandler`], and reports whether any mismatch was unconditionally fatal.

use crate::algorithm::{Algorithm, CompareMode, ErrorHandler};
use crate::buffer::BufferInfo;
use crate::format::{Channel, NUM_CHANNELS};
use crate::layout::SlotInfo;
use crate::miscompare::MiscompareDetails;
use crate::provider::ExternalSignatureDevice;

/// Inputs shared by all mismatches of one slot.
pub struct CompareContext<'a> {
    pub algorithm: Algorithm,
    pub buffer: &'a BufferInfo,
    pub slot: SlotInfo,
    pub tolerances: &'a [u32; NUM_CHANNELS],
    pub external: Option<&'a dyn ExternalSignatureDevice>,
}

/// One mismatch that should be logged by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchReport {
    pub algorithm: Algorithm,
    pub buffer: u32,
    pub bin: u32,
    pub element: u32,
    /// Reference values; more than one for a rotation-tolerant tuple.
    pub expected: Vec<u32>,
    pub actual: Vec<u32>,
    /// Bin classified as beyond tolerance.
    pub error: bool,
    pub fatal: bool,
}

/// What a handler decided about one mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerVerdict {
    pub error: bool,
    pub fatal: bool,
    /// The caller logs it; false when the mismatch was forwarded elsewhere.
    pub log_locally: bool,
}

impl ErrorHandler {
    /// Record one mismatch at (`bin`, `element`) into `details`.
    pub fn report(
        self,
        ctx: &CompareContext<'_>,
        bin: u32,
        element: u32,
        expected: u32,
        actual: u32,
        details: &mut MiscompareDetails,
    ) -> HandlerVerdict {
        match self {
            Self::SimpleDifference => {
                let channel = ctx
                    .buffer
                    .format
                    .channels()
                    .get(element as usize)
                    .copied()
                    .unwrap_or(Channel::Other);
                let diff = i64::from(actual.abs_diff(expected));
                details.add_channel_diff(channel, diff);
                let error = diff > i64::from(ctx.tolerances[channel.index()]);
                if error {
                    details.flag_err(bin);
                } else {
                    details.flag_bad(bin);
                }
                HandlerVerdict {
                    error,
                    fatal: false,
                    log_locally: true,
                }
            }
            Self::StrictEquality => {
                details.flag_err(bin);
                HandlerVerdict {
                    error: true,
                    fatal: false,
                    log_locally: true,
                }
            }
            Self::ExternalDevice => {
                details.flag_err(bin);
                match ctx.external {
                    Some(device) => {
                        device.report_mismatch(bin, expected, actual);
                        HandlerVerdict {
                            error: true,
                            fatal: false,
                            log_locally: false,
                        }
                    }
                    None => HandlerVerdict {
                        error: true,
                        fatal: false,
                        log_locally: true,
                    },
                }
            }
            Self::ExtraMetric => {
                let slot = bin as usize * ctx.slot.elements as usize + element as usize;
                details.record_extra(slot, expected, actual);
                HandlerVerdict {
                    error: false,
                    fatal: false,
                    log_locally: true,
                }
            }
            Self::Fatal => {
                details.flag_err(bin);
                HandlerVerdict {
                    error: true,
                    fatal: true,
                    log_locally: true,
                }
            }
        }
    }
}

/// Whether some cyclic rotation `r` gives `new[(c + r) % n] == old[c]` for every `c`.
#[must_use]
pub fn rotation_matches(new: &[u32], old: &[u32]) -> bool {
    let n = new.len();
    if n != old.len() {
        return false;
    }
    if n == 0 {
        return true;
    }
    (0..n).any(|r| (0..n).all(|c| new[(c + r) % n] == old[c]))
}

/// Compare one slot. `new` and `old` are exactly the slot's range of each record.
///
/// Returns true when a mismatch was unconditionally fatal.
pub fn compare_slot(
    ctx: &CompareContext<'_>,
    new: &[u32],
    old: &[u32],
    details: &mut MiscompareDetails,
    reports: &mut Vec<MismatchReport>,
) -> bool {
    let elements = ctx.slot.elements as usize;
    let handler = ctx.algorithm.error_handler();
    let mut fatal = false;

    for bin in 0..ctx.slot.bins {
        let base = bin as usize * elements;
        let new_bin = &new[base..base + elements];
        let old_bin = &old[base..base + elements];

        match ctx.algorithm.compare_mode() {
            CompareMode::Positional => {
                for (element, (&actual, &expected)) in new_bin.iter().zip(old_bin).enumerate() {
                    if actual == expected {
                        continue;
                    }
                    let verdict =
                        handler.report(ctx, bin, element as u32, expected, actual, details);
                    details.mark_resource_fault(ctx.buffer.index);
                    fatal |= verdict.fatal;
                    if verdict.log_locally {
                        reports.push(MismatchReport {
                            algorithm: ctx.algorithm,
                            buffer: ctx.buffer.index,
                            bin,
                            element: element as u32,
                            expected: vec![expected],
                            actual: vec![actual],
                            error: verdict.error,
                            fatal: verdict.fatal,
                        });
                    }
                }
            }
            CompareMode::RotationTolerant => {
                if rotation_matches(new_bin, old_bin) {
                    continue;
                }
                let expected = old_bin.first().copied().unwrap_or_default();
                let actual = new_bin.first().copied().unwrap_or_default();
                let verdict = handler.report(ctx, bin, 0, expected, actual, details);
                details.mark_resource_fault(ctx.buffer.index);
                fatal |= verdict.fatal;
                if verdict.log_locally {
                    reports.push(MismatchReport {
                        algorithm: ctx.algorithm,
                        buffer: ctx.buffer.index,
                        bin,
                        element: 0,
                        expected: old_bin.to_vec(),
                        actual: new_bin.to_vec(),
                        error: verdict.error,
                        fatal: verdict.fatal,
                    });
                }
            }
        }
    }
    fatal
}
