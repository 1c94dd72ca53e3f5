//! Report generation for golden-value runs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use goldval_core::structured_log::now_utc;
use goldval_core::{ErrorRateSummary, IterationOutcome, IterationReport};

use crate::runner::RunOutcome;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A run report combining per-loop outcomes and the error-rate summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenReport {
    /// Report title.
    pub title: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub aborted: Option<String>,
    pub iterations: Vec<IterationReport>,
    pub summary: ErrorRateSummary,
}

impl GoldenReport {
    #[must_use]
    pub fn from_outcome(title: impl Into<String>, outcome: &RunOutcome) -> Self {
        Self {
            title: title.into(),
            timestamp: now_utc(),
            aborted: outcome.aborted.as_ref().map(ToString::to_string),
            iterations: outcome.iterations.clone(),
            summary: outcome.summary.clone(),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.summary.passed()
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let summary = &self.summary;
        let stats = &summary.stats;
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!(
            "- Test: {} ({})\n",
            summary.test_name, summary.config_name
        ));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!(
            "- Status: {}\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        out.push_str(&format!("- Loops: {}\n", stats.loops));
        out.push_str(&format!(
            "- Checks: {} (passed {}, tolerated {}, failed {})\n",
            stats.checks, stats.passes, stats.tolerated, stats.failures
        ));
        out.push_str(&format!("- Stores: {}\n", stats.stores));
        out.push_str(&format!("- Missing references: {}\n", stats.not_found));
        out.push_str(&format!("- Degraded retries: {}\n", stats.retries));
        out.push_str(&format!("- Error rate: {:.4}\n", summary.error_rate));
        out.push_str(&format!("- Total bad bins: {}\n", summary.total_bad_bins));
        if let Some(aborted) = &self.aborted {
            out.push_str(&format!("- Aborted: {aborted}\n"));
        }
        if let Some(first) = &summary.first_failure {
            out.push_str(&format!("- First deferred failure: {first}\n"));
        }

        out.push_str("\n| Buffer | Format | Checks | Tolerated | Failed | Bad bins | Error bins |\n");
        out.push_str("|--------|--------|--------|-----------|--------|----------|------------|\n");
        for buffer in &summary.buffers {
            out.push_str(&format!(
                "| {} | {:?} | {} | {} | {} | {} | {} |\n",
                buffer.buffer,
                buffer.format,
                buffer.stats.checks,
                buffer.stats.tolerated,
                buffer.stats.failures,
                buffer.stats.bad_bins,
                buffer.stats.error_bins,
            ));
        }

        let channels: Vec<_> = summary
            .channel_totals
            .iter()
            .filter(|total| total.diff != 0)
            .collect();
        if !channels.is_empty() {
            out.push_str("\n| Channel | Diff sum |\n");
            out.push_str("|---------|----------|\n");
            for total in channels {
                out.push_str(&format!("| {} | {} |\n", total.channel.name(), total.diff));
            }
        }

        let failing: Vec<_> = self
            .iterations
            .iter()
            .filter(|it| {
                matches!(
                    it.outcome,
                    IterationOutcome::Failed | IterationOutcome::Tolerated
                )
            })
            .collect();
        if !failing.is_empty() {
            out.push_str("\n| Loop | Row | Outcome | Bad bins | Error bins |\n");
            out.push_str("|------|-----|---------|----------|------------|\n");
            for it in failing {
                out.push_str(&format!(
                    "| {} | {} | {:?} | {} | {} |\n",
                    it.loop_index,
                    it.row,
                    it.outcome,
                    it.details.num_bad(),
                    it.details.num_err(),
                ));
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write `<stem>.json` and `<stem>.md` into `dir`.
    pub fn write_to(&self, dir: &Path, stem: &str) -> Result<(), ReportError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(format!("{stem}.json")), self.to_json())?;
        std::fs::write(dir.join(format!("{stem}.md")), self.to_markdown())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::GoldenRunner;
    use crate::synthetic::{SyntheticBuffer, SyntheticProvider};
    use goldval_core::{Action, Comparator, ElementFormat, GoldenConfig};
    use goldval_store::MemoryStore;

    fn outcome() -> RunOutcome {
        let store = MemoryStore::new();
        let mut provider = SyntheticProvider::new().with_buffer(SyntheticBuffer::patterned(
            2,
            2,
            ElementFormat::Z24S8,
            9,
        ));
        let config = GoldenConfig {
            action: Action::Store,
            ..GoldenConfig::default()
        };
        let mut comparator =
            Comparator::bind(&config, "report", &mut provider, &store).expect("bind");
        GoldenRunner::new("report", 2).run_unchanged(&mut comparator)
    }

    #[test]
    fn markdown_has_header_and_buffer_table() {
        let report = GoldenReport::from_outcome("Golden run", &outcome());
        let md = report.to_markdown();
        assert!(md.starts_with("# Golden run\n"));
        assert!(md.contains("- Status: PASS"));
        assert!(md.contains("- Stores: 2"));
        assert!(md.contains("| 0 | Z24S8 |"));
    }

    #[test]
    fn json_round_trips() {
        let report = GoldenReport::from_outcome("Golden run", &outcome());
        let back = GoldenReport::from_json(&report.to_json()).expect("valid report json");
        assert_eq!(back.summary.stats, report.summary.stats);
        assert_eq!(back.iterations, report.iterations);
    }
}
