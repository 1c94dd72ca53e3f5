//! Snapshot of observed-buffer metadata taken at bind time.

use serde::{Deserialize, Serialize};

use crate::format::ElementFormat;
use crate::provider::BufferProvider;

/// Metadata of one observed buffer.
///
/// The layout calculator only ever sees these snapshots, so a layout is a pure function
/// of what was bound rather than of live provider state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub pitch: u32,
    pub format: ElementFormat,
    /// Associated display-like resource id.
    pub display: Option<u32>,
    /// Bin count of the associated external signature device, when one is attached.
    pub external_bins: Option<u32>,
}

impl BufferInfo {
    #[must_use]
    pub fn new(index: u32, width: u32, height: u32, format: ElementFormat) -> Self {
        Self {
            index,
            width,
            height,
            pitch: width.saturating_mul(format.bytes_per_element()),
            format,
            display: None,
            external_bins: None,
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: u32) -> Self {
        self.display = (display != 0).then_some(display);
        self
    }

    #[must_use]
    pub fn with_external_bins(mut self, bins: u32) -> Self {
        self.external_bins = Some(bins);
        self
    }

    /// Read buffer `index` from a provider.
    #[must_use]
    pub fn snapshot<P: BufferProvider + ?Sized>(provider: &P, index: u32) -> Self {
        Self {
            index,
            width: provider.width(index),
            height: provider.height(index),
            pitch: provider.pitch(index),
            format: provider.format(index),
            display: provider.associated_resource(index).filter(|&id| id != 0),
            external_bins: provider
                .external_signature_device(index)
                .map(|device| device.bin_count()),
        }
    }

    #[must_use]
    pub const fn has_display(&self) -> bool {
        self.display.is_some()
    }

    #[must_use]
    pub const fn has_external_device(&self) -> bool {
        self.external_bins.is_some()
    }

    /// Size of the visible area in bytes.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        u64::from(self.pitch) * u64::from(self.height)
    }
}
