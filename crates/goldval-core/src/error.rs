//! Error taxonomy of the golden-value engine.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GoldenError {
    #[error(
        "value mismatch on loop {loop_index}, buffer {buffer}: {bad_bins} bad bins, {error_bins} error bins{}",
        unconditional_suffix(.unconditional)
    )]
    ValueMismatch {
        loop_index: u32,
        buffer: u32,
        bad_bins: u32,
        error_bins: u32,
        unconditional: bool,
    },
    #[error("extra metric mismatch on loop {loop_index}, buffer {buffer}: {extra_diffs} metrics differ")]
    ExtraValueMismatch {
        loop_index: u32,
        buffer: u32,
        extra_diffs: u32,
    },
    #[error("no reference record for row {row}")]
    ValueNotFound { row: u32 },
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("reference store: {0}")]
    Store(StoreError),
    #[error("record for row {row} is identical to row {previous}")]
    DuplicateRecord { row: u32, previous: u32 },
    #[error("hard failures were deferred but the error-rate summary was never requested")]
    SummaryNotQueried,
}

fn unconditional_suffix(unconditional: &bool) -> &'static str {
    if *unconditional {
        ", unconditional failure"
    } else {
        ""
    }
}

impl GoldenError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation(message.into())
    }

    /// Failures that count against the test's error rate.
    #[must_use]
    pub const fn is_miscompare(&self) -> bool {
        matches!(
            self,
            Self::ValueMismatch { .. } | Self::ExtraValueMismatch { .. } | Self::DuplicateRecord { .. }
        )
    }
}

impl From<StoreError> for GoldenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { row } => Self::ValueNotFound { row },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_value_not_found() {
        let err: GoldenError = StoreError::NotFound { row: 7 }.into();
        assert_eq!(err, GoldenError::ValueNotFound { row: 7 });
        assert!(!err.is_miscompare());
    }

    #[test]
    fn mismatch_message_mentions_unconditional() {
        let err = GoldenError::ValueMismatch {
            loop_index: 3,
            buffer: 1,
            bad_bins: 2,
            error_bins: 0,
            unconditional: true,
        };
        let text = err.to_string();
        assert!(text.contains("buffer 1"));
        assert!(text.ends_with("unconditional failure"));
    }
}
