//! Element formats and the fixed channel enumeration used for per-channel accounting.

use serde::{Deserialize, Serialize};

/// Number of distinct [`Channel`] slots.
pub const NUM_CHANNELS: usize = 7;

/// One component slot of an observed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
    Depth,
    Stencil,
    Other,
}

impl Channel {
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::Alpha,
        Channel::Depth,
        Channel::Stencil,
        Channel::Other,
    ];

    /// Slot of this channel in per-channel arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Alpha => "alpha",
            Self::Depth => "depth",
            Self::Stencil => "stencil",
            Self::Other => "other",
        }
    }
}

/// Pixel/element layout of an observed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementFormat {
    R8G8B8A8,
    B8G8R8A8,
    R5G6B5,
    R10G10B10A2,
    R16G16B16A16F,
    R32F,
    Y8,
    Z16,
    Z24S8,
    Z32F,
    /// Opaque 32-bit words with no channel structure.
    Raw32,
}

const RGBA: &[Channel] = &[Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];
const BGRA: &[Channel] = &[Channel::Blue, Channel::Green, Channel::Red, Channel::Alpha];
const RGB: &[Channel] = &[Channel::Red, Channel::Green, Channel::Blue];
const RED: &[Channel] = &[Channel::Red];
const DEPTH: &[Channel] = &[Channel::Depth];
const DEPTH_STENCIL: &[Channel] = &[Channel::Depth, Channel::Stencil];
const OTHER: &[Channel] = &[Channel::Other];

impl ElementFormat {
    /// Channels in element order. Element `i` of a per-channel signature maps to `channels()[i]`.
    #[must_use]
    pub fn channels(self) -> &'static [Channel] {
        match self {
            Self::R8G8B8A8 | Self::R10G10B10A2 | Self::R16G16B16A16F => RGBA,
            Self::B8G8R8A8 => BGRA,
            Self::R5G6B5 => RGB,
            Self::R32F => RED,
            Self::Z16 | Self::Z32F => DEPTH,
            Self::Z24S8 => DEPTH_STENCIL,
            Self::Y8 | Self::Raw32 => OTHER,
        }
    }

    #[must_use]
    pub fn channel_count(self) -> u32 {
        self.channels().len() as u32
    }

    #[must_use]
    pub const fn bytes_per_element(self) -> u32 {
        match self {
            Self::Y8 => 1,
            Self::R5G6B5 | Self::Z16 => 2,
            Self::R16G16B16A16F => 8,
            Self::R8G8B8A8
            | Self::B8G8R8A8
            | Self::R10G10B10A2
            | Self::R32F
            | Self::Z24S8
            | Self::Z32F
            | Self::Raw32 => 4,
        }
    }

    /// Formats a display engine can scan out.
    #[must_use]
    pub const fn is_color(self) -> bool {
        matches!(
            self,
            Self::R8G8B8A8
                | Self::B8G8R8A8
                | Self::R5G6B5
                | Self::R10G10B10A2
                | Self::R16G16B16A16F
        )
    }

    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Z16 | Self::Z24S8 | Self::Z32F)
    }

    /// Parse a format name (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.to_ascii_uppercase().replace(['_', '-'], "");
        let format = match normalized.as_str() {
            "R8G8B8A8" | "RGBA8" => Self::R8G8B8A8,
            "B8G8R8A8" | "BGRA8" => Self::B8G8R8A8,
            "R5G6B5" => Self::R5G6B5,
            "R10G10B10A2" => Self::R10G10B10A2,
            "R16G16B16A16F" | "RGBA16F" => Self::R16G16B16A16F,
            "R32F" => Self::R32F,
            "Y8" => Self::Y8,
            "Z16" => Self::Z16,
            "Z24S8" => Self::Z24S8,
            "Z32F" => Self::Z32F,
            "RAW32" => Self::Raw32,
            _ => return None,
        };
        Some(format)
    }
}
