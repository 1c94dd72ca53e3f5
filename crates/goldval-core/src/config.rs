//! Per-test golden-value configuration.
//!
//! One [`GoldenConfig`] value is built per test and lent to the comparator. Values come
//! from defaults, an optional JSON document, and a small set of environment overrides:
//! - `GOLDVAL_ACTION`: `check`, `store` or `skip`
//! - `GOLDVAL_SKIP_COUNT`: skip interval
//! - `GOLDVAL_STOP_ON_ERROR`: `1`/`true`/`yes` or `0`/`false`/`no`

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::algorithm::{AlgorithmMask, BinSettings};
use crate::error::GoldenError;
use crate::format::{Channel, NUM_CHANNELS};

/// What an action iteration does with the computed record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Compare against the stored reference.
    #[default]
    Check,
    /// Write the computed record as the new reference.
    Store,
    /// Compute nothing unless a dump trigger asks for it.
    Skip,
}

impl Action {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "check" | "compare" | "verify" => Some(Self::Check),
            "store" | "save" | "record" => Some(Self::Store),
            "skip" | "none" | "off" => Some(Self::Skip),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Store => "store",
            Self::Skip => "skip",
        }
    }
}

bitflags! {
    /// Conditions under which buffer contents are handed to the dump sink.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DumpTriggers: u32 {
        const ON_ERROR = 1 << 0;
        const ON_BAD_PIXEL = 1 << 1;
        const ON_SKIP = 1 << 2;
        const ON_STORE = 1 << 3;
        const ON_CHECK = 1 << 4;
        const ALWAYS = 1 << 5;
    }
}

impl DumpTriggers {
    pub const NEVER: Self = Self::empty();

    /// Triggers that only fire depending on a comparison result.
    pub const CONDITIONAL: Self = Self::ON_ERROR.union(Self::ON_BAD_PIXEL);
}

/// Path used to read buffer contents back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchHint {
    #[default]
    Simple,
    DmaAccelerated,
}

/// Where signature math runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputeHint {
    #[default]
    WholeBufferCpu,
    FragmentedCpu,
    FragmentedDevice,
}

fn default_config_name() -> String {
    "default".to_string()
}

/// Operator-facing options of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldenConfig {
    /// Configuration name; part of the reference store key.
    #[serde(default = "default_config_name")]
    pub config_name: String,
    pub action: Action,
    /// Act on every `skip_interval`-th loop (0 = every loop).
    pub skip_interval: u32,
    pub algorithm_mask: AlgorithmMask,
    pub allowed_bad_bins_one_check: u32,
    pub allowed_error_bins_one_check: u32,
    pub allowed_extra_diff_one_check: u32,
    /// Largest per-channel difference a simple-difference bin may have and still be
    /// tolerated, indexed by [`Channel::index`].
    pub per_channel_tolerance: [u32; NUM_CHANNELS],
    pub stop_on_error: bool,
    pub dump_triggers: DumpTriggers,
    pub fetch_hint: FetchHint,
    pub compute_hint: ComputeHint,
    /// Fail a store when the new record equals the previous row.
    pub check_records_unique: bool,
    pub checksum_bins: u32,
    pub crc_bins: u32,
    /// Log computed values on every action iteration.
    pub print_values: bool,
    /// Log one row per buffer and iteration.
    pub structured_report: bool,
    /// Algorithms whose computed values get corrupted on `force_error_loop`.
    pub force_error_mask: AlgorithmMask,
    pub force_error_loop: Option<u32>,
    pub store_marked_only: bool,
    pub subdevice: u32,
}

impl Default for GoldenConfig {
    fn default() -> Self {
        Self {
            config_name: default_config_name(),
            action: Action::Check,
            skip_interval: 0,
            algorithm_mask: AlgorithmMask::default(),
            allowed_bad_bins_one_check: u32::MAX,
            allowed_error_bins_one_check: 0,
            allowed_extra_diff_one_check: 0,
            per_channel_tolerance: [0; NUM_CHANNELS],
            stop_on_error: true,
            dump_triggers: DumpTriggers::NEVER,
            fetch_hint: FetchHint::Simple,
            compute_hint: ComputeHint::WholeBufferCpu,
            check_records_unique: false,
            checksum_bins: 1,
            crc_bins: 1,
            print_values: false,
            structured_report: false,
            force_error_mask: AlgorithmMask::empty(),
            force_error_loop: None,
            store_marked_only: false,
            subdevice: 0,
        }
    }
}

impl GoldenConfig {
    /// Load from a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    #[must_use]
    pub fn with_tolerance(mut self, channel: Channel, tolerance: u32) -> Self {
        self.per_channel_tolerance[channel.index()] = tolerance;
        self
    }

    #[must_use]
    pub fn with_uniform_tolerance(mut self, tolerance: u32) -> Self {
        self.per_channel_tolerance = [tolerance; NUM_CHANNELS];
        self
    }

    #[must_use]
    pub const fn tolerance(&self, channel: Channel) -> u32 {
        self.per_channel_tolerance[channel.index()]
    }

    #[must_use]
    pub const fn bin_settings(&self) -> BinSettings {
        BinSettings {
            checksum_bins: self.checksum_bins,
            crc_bins: self.crc_bins,
        }
    }

    /// Reject values no test can run with.
    pub fn validate(&self) -> Result<(), GoldenError> {
        if self.checksum_bins == 0 || self.crc_bins == 0 {
            return Err(GoldenError::precondition("bin counts must be at least 1"));
        }
        if self.config_name.trim().is_empty() {
            return Err(GoldenError::precondition("config_name must not be empty"));
        }
        Ok(())
    }

    /// Apply `GOLDVAL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), GoldenError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), GoldenError> {
        if let Some(raw) = lookup("GOLDVAL_ACTION") {
            self.action = Action::from_str_loose(&raw).ok_or_else(|| {
                GoldenError::precondition(format!("GOLDVAL_ACTION: unknown action '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("GOLDVAL_SKIP_COUNT") {
            self.skip_interval = raw.trim().parse().map_err(|_| {
                GoldenError::precondition(format!("GOLDVAL_SKIP_COUNT: not a count '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("GOLDVAL_STOP_ON_ERROR") {
            self.stop_on_error = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(GoldenError::precondition(format!(
                        "GOLDVAL_STOP_ON_ERROR: not a boolean '{raw}'"
                    )));
                }
            };
        }
        Ok(())
    }
}
