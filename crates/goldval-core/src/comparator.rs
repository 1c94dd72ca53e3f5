//! Comparator and per-iteration run loop.
//!
//! A [`Comparator`] is one binding of a buffer set to a reference store for one test. The
//! caller drives it once per loop of the system under test:
//!
//! ```text
//! Idle -> Deciding -> [Fetching] -> Computing -> Comparing -> Accumulating -> Reporting -> Idle
//! ```
//!
//! A hard failure while reading through the accelerated fetch path gets exactly one
//! retry on the degraded path, starting at the failing buffer. Buffers compared before
//! it in the same iteration are not read again.

use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, AlgorithmMask};
use crate::buffer::BufferInfo;
use crate::compare::{CompareContext, MismatchReport, compare_slot};
use crate::config::{Action, DumpTriggers, FetchHint, GoldenConfig};
use crate::error::GoldenError;
use crate::hooks::{DumpRequest, DumpSink, NoopScheduler, NullDumpSink, Scheduler};
use crate::layout::{RecordLayout, SlotInfo};
use crate::miscompare::MiscompareDetails;
use crate::provider::{BufferProvider, ComputeRequest, ProviderError};
use crate::store::{ReferenceStore, StoreError, StoreHandle, StoreKey};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::summary::{
    Allowances, BufferStats, BufferVerdict, ErrorRateSummary, RunStats, buffer_summary,
};

/// Step of the run loop the comparator is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Deciding,
    Fetching,
    Computing,
    Comparing,
    Accumulating,
    Reporting,
}

impl Phase {
    /// Whether the provider was asked to compute by the time this phase was reached.
    #[must_use]
    pub const fn touched_provider(self) -> bool {
        matches!(
            self,
            Self::Computing | Self::Comparing | Self::Accumulating | Self::Reporting
        )
    }
}

/// Mutable per-binding loop state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub loop_index: u32,
    /// Reference store row used by the next iteration.
    pub row: u32,
    pub mask: AlgorithmMask,
    pub action: Action,
    pub skip_interval: u32,
}

/// Overall result of one `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Not an action iteration and nothing to dump.
    Idle,
    /// Signatures computed for dumping only.
    Computed,
    Passed,
    Tolerated,
    /// Hard failure deferred because `stop_on_error` is off.
    Failed,
    Stored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferReport {
    pub buffer: u32,
    pub verdict: BufferVerdict,
    pub bad_bins: u32,
    pub error_bins: u32,
    pub extra_diffs: u32,
    pub unconditional: bool,
    pub channel_diff: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationReport {
    pub loop_index: u32,
    pub row: u32,
    pub action: Action,
    pub outcome: IterationOutcome,
    pub buffers: Vec<BufferReport>,
    /// All buffers of this iteration merged together.
    pub details: MiscompareDetails,
    pub retried: bool,
    pub dumps: u32,
}

impl IterationReport {
    fn new(state: &RunState) -> Self {
        Self {
            loop_index: state.loop_index,
            row: state.row,
            action: state.action,
            outcome: IterationOutcome::Idle,
            buffers: Vec::new(),
            details: MiscompareDetails::new(),
            retried: false,
            dumps: 0,
        }
    }
}

/// Side effects active for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    check: bool,
    store: bool,
    dump: DumpTriggers,
}

impl Plan {
    fn is_idle(&self) -> bool {
        !self.check && !self.store && self.dump.is_empty()
    }
}

/// Comparison of one buffer against the reference.
struct BufferComparison {
    details: MiscompareDetails,
    reports: Vec<MismatchReport>,
    unconditional: bool,
    verdict: BufferVerdict,
}

impl BufferComparison {
    fn report(&self, buffer: u32) -> BufferReport {
        BufferReport {
            buffer,
            verdict: self.verdict,
            bad_bins: self.details.num_bad(),
            error_bins: self.details.num_err(),
            extra_diffs: self.details.num_extra_diff(),
            unconditional: self.unconditional,
            channel_diff: self.details.total_channel_diff(),
        }
    }

    fn to_error(&self, loop_index: u32, buffer: u32) -> Option<GoldenError> {
        match self.verdict {
            BufferVerdict::ValueMismatch => Some(GoldenError::ValueMismatch {
                loop_index,
                buffer,
                bad_bins: self.details.num_bad(),
                error_bins: self.details.num_err(),
                unconditional: self.unconditional,
            }),
            BufferVerdict::ExtraValueMismatch => Some(GoldenError::ExtraValueMismatch {
                loop_index,
                buffer,
                extra_diffs: self.details.num_extra_diff(),
            }),
            BufferVerdict::Pass | BufferVerdict::Tolerated => None,
        }
    }
}

const fn verdict_outcome(verdict: BufferVerdict) -> Outcome {
    match verdict {
        BufferVerdict::Pass => Outcome::Pass,
        BufferVerdict::Tolerated => Outcome::Tolerated,
        BufferVerdict::ValueMismatch | BufferVerdict::ExtraValueMismatch => Outcome::Fail,
    }
}

/// Golden-value comparator bound to one provider and one reference store.
pub struct Comparator<'a, P: BufferProvider + ?Sized> {
    config: &'a GoldenConfig,
    test_name: String,
    provider: &'a mut P,
    store: &'a dyn ReferenceStore,
    scheduler: Box<dyn Scheduler + 'a>,
    dump_sink: Box<dyn DumpSink + 'a>,
    log: LogEmitter,
    state: RunState,
    phase: Phase,
    layout: RecordLayout,
    handle: StoreHandle,
    new_record: Vec<u32>,
    accumulated: Vec<MiscompareDetails>,
    buffer_stats: Vec<BufferStats>,
    stats: RunStats,
    deferred: Option<GoldenError>,
    summary_queried: bool,
}

impl<'a, P: BufferProvider + ?Sized> Comparator<'a, P> {
    /// Bind every buffer the provider exposes, without logging.
    pub fn bind(
        config: &'a GoldenConfig,
        test_name: &str,
        provider: &'a mut P,
        store: &'a dyn ReferenceStore,
    ) -> Result<Self, GoldenError> {
        Self::bind_with_logger(config, test_name, provider, store, LogEmitter::discard())
    }

    /// Bind every buffer the provider exposes, compute the record layout and open the
    /// reference store handle.
    pub fn bind_with_logger(
        config: &'a GoldenConfig,
        test_name: &str,
        provider: &'a mut P,
        store: &'a dyn ReferenceStore,
        log: LogEmitter,
    ) -> Result<Self, GoldenError> {
        config.validate()?;
        if test_name.trim().is_empty() {
            return Err(GoldenError::precondition("test name must not be empty"));
        }
        let layout = compute_layout(config, &*provider)?;
        let handle = store.open_handle(&store_key(test_name, config, &layout))?;

        let mut comparator = Self {
            config,
            test_name: test_name.to_string(),
            provider,
            store,
            scheduler: Box::new(NoopScheduler),
            dump_sink: Box::new(NullDumpSink),
            log,
            state: RunState {
                loop_index: 0,
                row: 0,
                mask: config.algorithm_mask,
                action: config.action,
                skip_interval: config.skip_interval,
            },
            phase: Phase::Idle,
            new_record: vec![0; layout.total_len() as usize],
            accumulated: Vec::new(),
            buffer_stats: Vec::new(),
            layout,
            handle,
            stats: RunStats::default(),
            deferred: None,
            summary_queried: false,
        };
        comparator.grow_accumulators();
        comparator.log_bind()?;
        Ok(comparator)
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'a) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    #[must_use]
    pub fn with_dump_sink(mut self, sink: impl DumpSink + 'a) -> Self {
        self.dump_sink = Box::new(sink);
        self
    }

    /// Re-read buffer metadata after buffers were added to the provider.
    ///
    /// Ranges of already bound buffers keep their offsets; accumulators are kept and grown.
    pub fn rebind(&mut self) -> Result<(), GoldenError> {
        let layout = compute_layout(self.config, &*self.provider)?;
        self.handle = self
            .store
            .open_handle(&store_key(&self.test_name, self.config, &layout))?;
        self.new_record = vec![0; layout.total_len() as usize];
        self.layout = layout;
        self.grow_accumulators();
        self.log_bind()
    }

    fn grow_accumulators(&mut self) {
        for buffer in 0..self.layout.buffer_count() {
            let bins = self.layout.max_bins(buffer) as usize;
            match self.accumulated.get_mut(buffer as usize) {
                Some(details) => details.ensure_bins(bins),
                None => {
                    let mut details = MiscompareDetails::new();
                    details.ensure_bins(bins);
                    self.accumulated.push(details);
                    self.buffer_stats.push(BufferStats::default());
                }
            }
        }
    }

    /// Set the loop counter; the reference row follows it.
    pub fn set_loop(&mut self, loop_index: u32) {
        self.state.loop_index = loop_index;
        self.state.row = loop_index;
    }

    pub fn set_row(&mut self, row: u32) {
        self.state.row = row;
    }

    pub fn set_action(&mut self, action: Action) {
        self.state.action = action;
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn offset_of(&self, algorithm: Algorithm, buffer: u32) -> Result<u32, GoldenError> {
        self.layout.offset_of(algorithm, buffer)
    }

    /// Record computed by the latest iteration.
    #[must_use]
    pub fn record(&self) -> &[u32] {
        &self.new_record
    }

    #[must_use]
    pub const fn handle(&self) -> StoreHandle {
        self.handle
    }

    /// Mismatches of `buffer` accumulated since bind.
    #[must_use]
    pub fn accumulated(&self, buffer: u32) -> Option<&MiscompareDetails> {
        self.accumulated.get(buffer as usize)
    }

    #[must_use]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        self.provider
    }

    /// Run one iteration for the current loop and row.
    ///
    /// With `stop_on_error` on, a hard failure is returned as `Err`. With it off, the
    /// first hard failure is kept for [`Comparator::error_rate_summary`] and the
    /// iteration reports [`IterationOutcome::Failed`].
    pub fn run(&mut self) -> Result<IterationReport, GoldenError> {
        self.scheduler.yield_now();
        self.stats.loops += 1;
        let result = self.run_iteration();
        // Anything computed this iteration is stale, whether or not it finished.
        if self.phase.touched_provider() {
            self.provider.invalidate();
        }
        self.phase = Phase::Idle;
        result
    }

    fn run_iteration(&mut self) -> Result<IterationReport, GoldenError> {
        self.phase = Phase::Deciding;
        let mut report = IterationReport::new(&self.state);
        let plan = self.plan();
        if plan.is_idle() {
            return Ok(report);
        }
        let buffer_count = self.layout.buffer_count();
        if buffer_count == 0 {
            return Err(GoldenError::precondition("no buffers bound"));
        }

        let reference = if plan.check {
            self.phase = Phase::Fetching;
            Some(self.fetch_reference()?)
        } else {
            None
        };

        self.phase = Phase::Computing;
        let want_dump = !plan.dump.is_empty();
        let mut dumps = vec![Vec::new(); buffer_count as usize];
        self.compute_from(0, self.config.fetch_hint, &mut dumps, want_dump)?;
        self.inject_forced_errors(0);

        let mut failure = None;
        let mut comparisons = Vec::new();
        if let Some(reference) = &reference {
            self.phase = Phase::Comparing;
            let mut retry_attempted = false;
            for buffer in 0..buffer_count {
                let mut comparison = self.compare_buffer(buffer, reference)?;
                if comparison.verdict.is_hard()
                    && !retry_attempted
                    && self.config.fetch_hint == FetchHint::DmaAccelerated
                {
                    retry_attempted = true;
                    if self.retry_from(buffer, &comparison, &mut dumps, want_dump)? {
                        report.retried = true;
                        comparison = self.compare_buffer(buffer, reference)?;
                    }
                }
                comparisons.push(comparison);
            }

            self.phase = Phase::Accumulating;
            failure = self.accumulate(&comparisons, &mut report);
        }

        if plan.store && failure.is_none() {
            failure = self.store_record()?;
            if failure.is_none() {
                report.outcome = IterationOutcome::Stored;
            }
        }

        self.phase = Phase::Reporting;
        report.dumps = self.dump(plan.dump, &comparisons, &dumps)?;
        if self.config.print_values {
            self.log_values();
        }
        if self.config.structured_report {
            for buffer_report in &report.buffers {
                self.log_buffer_report(buffer_report);
            }
        }

        if !plan.check && !plan.store {
            report.outcome = IterationOutcome::Computed;
        }
        match failure {
            Some(err) if self.config.stop_on_error => Err(err),
            Some(err) => {
                self.deferred.get_or_insert(err);
                report.outcome = IterationOutcome::Failed;
                Ok(report)
            }
            None => Ok(report),
        }
    }

    /// Decide which side effects this iteration runs.
    fn plan(&self) -> Plan {
        let skip = self.state.skip_interval;
        let action_iteration = skip == 0 || self.state.loop_index % skip == skip - 1;
        let configured = self.config.dump_triggers;
        let mut plan = Plan {
            check: false,
            store: false,
            dump: configured & DumpTriggers::ALWAYS,
        };
        if action_iteration {
            match self.state.action {
                Action::Check => {
                    plan.check = true;
                    plan.dump |= configured & (DumpTriggers::ON_CHECK | DumpTriggers::CONDITIONAL);
                }
                Action::Store => {
                    plan.store = true;
                    plan.dump |= configured & DumpTriggers::ON_STORE;
                }
                Action::Skip => plan.dump |= configured & DumpTriggers::ON_SKIP,
            }
        }
        plan
    }

    fn fetch_reference(&mut self) -> Result<Vec<u32>, GoldenError> {
        let row = self.state.row;
        let reference = match self.store.get(self.handle, row) {
            Ok(reference) => reference,
            Err(StoreError::NotFound { .. }) => {
                self.stats.not_found += 1;
                let entry = self
                    .entry(LogLevel::Error, "golden.not_found")
                    .with_outcome(Outcome::NotFound);
                self.emit(entry);
                return Err(GoldenError::ValueNotFound { row });
            }
            Err(err) => return Err(err.into()),
        };
        if reference.len() != self.new_record.len() {
            return Err(StoreError::LengthMismatch {
                expected: self.layout.total_len(),
                actual: reference.len() as u32,
            }
            .into());
        }
        Ok(reference)
    }

    /// Fetch and compute every active algorithm of buffers `start..` into the new record.
    fn compute_from(
        &mut self,
        start: u32,
        fetch_hint: FetchHint,
        dumps: &mut [Vec<u8>],
        want_dump: bool,
    ) -> Result<(), GoldenError> {
        for buffer in start..self.layout.buffer_count() {
            let slots: Vec<(Algorithm, SlotInfo)> = self.layout.slots_for(buffer).collect();
            let mut dump = match dumps.get_mut(buffer as usize) {
                Some(bytes) if want_dump => {
                    bytes.clear();
                    Some(bytes)
                }
                _ => None,
            };
            for (algorithm, slot) in slots {
                let out = &mut self.new_record[slot.range()];
                if algorithm.requires_external_device() {
                    let device = self.provider.external_signature_device(buffer).ok_or_else(
                        || ProviderError::for_buffer(buffer, "external signature device detached"),
                    )?;
                    let values = device.values()?;
                    if values.len() != out.len() {
                        return Err(ProviderError::for_buffer(
                            buffer,
                            format!(
                                "external device returned {} values, expected {}",
                                values.len(),
                                out.len()
                            ),
                        )
                        .into());
                    }
                    out.copy_from_slice(&values);
                    continue;
                }
                let request = ComputeRequest {
                    buffer,
                    subdevice: self.config.subdevice,
                    fetch_hint,
                    compute_hint: self.config.compute_hint,
                    bins: slot.bins,
                    algorithm,
                };
                self.provider
                    .fetch_and_compute(&request, out, dump.take())?;
            }
        }
        Ok(())
    }

    /// Corrupt the first value of every masked range on the configured loop.
    fn inject_forced_errors(&mut self, start: u32) {
        if self.config.force_error_loop != Some(self.state.loop_index) {
            return;
        }
        for buffer in start..self.layout.buffer_count() {
            for (algorithm, slot) in self.layout.slots_for(buffer) {
                if self.config.force_error_mask.contains(algorithm.mask_bit()) {
                    let value = &mut self.new_record[slot.offset as usize];
                    *value = !*value;
                }
            }
        }
    }

    fn compare_buffer(
        &self,
        buffer: u32,
        reference: &[u32],
    ) -> Result<BufferComparison, GoldenError> {
        let info: &BufferInfo = self
            .layout
            .buffer(buffer)
            .ok_or_else(|| GoldenError::precondition(format!("buffer {buffer} is not bound")))?;
        let external = self.provider.external_signature_device(buffer);
        let mut details = MiscompareDetails::with_bins(self.layout.max_bins(buffer));
        let mut reports = Vec::new();
        let mut unconditional = false;
        for (algorithm, slot) in self.layout.slots_for(buffer) {
            let ctx = CompareContext {
                algorithm,
                buffer: info,
                slot,
                tolerances: &self.config.per_channel_tolerance,
                external,
            };
            let range = slot.range();
            unconditional |= compare_slot(
                &ctx,
                &self.new_record[range.clone()],
                &reference[range],
                &mut details,
                &mut reports,
            );
        }
        let verdict = BufferVerdict::judge(&details, unconditional, self.allowances());
        Ok(BufferComparison {
            details,
            reports,
            unconditional,
            verdict,
        })
    }

    const fn allowances(&self) -> Allowances {
        Allowances {
            bad_bins: self.config.allowed_bad_bins_one_check,
            error_bins: self.config.allowed_error_bins_one_check,
            extra_diffs: self.config.allowed_extra_diff_one_check,
        }
    }

    /// Recompute buffers `buffer..` through the degraded fetch path.
    ///
    /// Returns false when the provider has no degraded mode.
    fn retry_from(
        &mut self,
        buffer: u32,
        failed: &BufferComparison,
        dumps: &mut [Vec<u8>],
        want_dump: bool,
    ) -> Result<bool, GoldenError> {
        self.provider
            .check_and_report_dma_errors(self.config.subdevice);
        let available = self.provider.reduce_optimization(true);
        let entry = self
            .entry(LogLevel::Warn, "golden.retry")
            .with_buffer(buffer)
            .with_details(serde_json::json!({
                "degraded_available": available,
                "bad_bins": failed.details.num_bad(),
                "error_bins": failed.details.num_err(),
            }));
        self.emit(entry);
        if !available {
            return Ok(false);
        }
        self.stats.retries += 1;

        self.phase = Phase::Fetching;
        let recomputed = self.compute_from(buffer, FetchHint::Simple, dumps, want_dump);
        self.provider.reduce_optimization(false);
        recomputed?;
        self.inject_forced_errors(buffer);
        self.phase = Phase::Comparing;
        Ok(true)
    }

    /// Fold comparisons into the accumulators and return the first hard failure.
    fn accumulate(
        &mut self,
        comparisons: &[BufferComparison],
        report: &mut IterationReport,
    ) -> Option<GoldenError> {
        let loop_index = self.state.loop_index;
        let mut failure = None;
        let mut tolerated = false;
        for (buffer, comparison) in (0u32..).zip(comparisons) {
            self.accumulated[buffer as usize].accumulate(&comparison.details);
            self.buffer_stats[buffer as usize].record(comparison.verdict, &comparison.details);
            report.details.accumulate(&comparison.details);
            report.buffers.push(comparison.report(buffer));
            for mismatch in &comparison.reports {
                self.log_mismatch(mismatch);
            }
            tolerated |= comparison.verdict == BufferVerdict::Tolerated;
            if failure.is_none() {
                failure = comparison.to_error(loop_index, buffer);
            }
        }

        self.stats.checks += 1;
        if failure.is_some() {
            self.stats.failures += 1;
        } else if tolerated {
            self.stats.tolerated += 1;
            report.outcome = IterationOutcome::Tolerated;
        } else {
            self.stats.passes += 1;
            report.outcome = IterationOutcome::Passed;
        }
        failure
    }

    /// Write the new record at the current row. Returns the uniqueness failure, if any.
    fn store_record(&mut self) -> Result<Option<GoldenError>, GoldenError> {
        let row = self.state.row;
        if self.config.check_records_unique && row > 0 {
            let previous = row - 1;
            match self
                .store
                .compare_to_row(self.handle, previous, &self.new_record)
            {
                Ok(true) => {
                    self.stats.duplicates += 1;
                    let entry = self
                        .entry(LogLevel::Error, "golden.duplicate")
                        .with_outcome(Outcome::Fail)
                        .with_details(serde_json::json!({ "previous_row": previous }));
                    self.emit(entry);
                    return Ok(Some(GoldenError::DuplicateRecord { row, previous }));
                }
                Ok(false) | Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.store.put(
            self.handle,
            row,
            &self.new_record,
            self.config.store_marked_only,
        )?;
        self.stats.stores += 1;
        let entry = self
            .entry(LogLevel::Info, "golden.store")
            .with_outcome(Outcome::Stored)
            .with_details(serde_json::json!({
                "record_len": self.new_record.len(),
                "marked_only": self.config.store_marked_only,
            }));
        self.emit(entry);
        Ok(None)
    }

    /// Hand fetched bytes to the dump sink for every buffer whose triggers fired.
    fn dump(
        &mut self,
        planned: DumpTriggers,
        comparisons: &[BufferComparison],
        dumps: &[Vec<u8>],
    ) -> Result<u32, GoldenError> {
        if planned.is_empty() {
            return Ok(0);
        }
        let unconditional = planned.difference(DumpTriggers::CONDITIONAL);
        let mut count = 0;
        for (buffer, bytes) in (0u32..).zip(dumps) {
            let mut reason = unconditional;
            if let Some(comparison) = comparisons.get(buffer as usize) {
                if comparison.verdict.is_hard() {
                    reason |= planned & DumpTriggers::ON_ERROR;
                }
                if comparison.details.num_bad() > 0 {
                    reason |= planned & DumpTriggers::ON_BAD_PIXEL;
                }
            }
            if reason.is_empty() {
                continue;
            }
            let Some(info) = self.layout.buffer(buffer) else {
                continue;
            };
            self.dump_sink.dump(&DumpRequest {
                test_name: &self.test_name,
                loop_index: self.state.loop_index,
                buffer: info,
                reason,
                bytes,
            })?;
            count += 1;
        }
        Ok(count)
    }

    /// End-of-test statistics. Querying it satisfies the deferred-failure contract.
    pub fn error_rate_summary(&mut self) -> ErrorRateSummary {
        self.summary_queried = true;
        let buffers = (0u32..)
            .zip(self.layout.buffers())
            .map(|(buffer, info)| {
                buffer_summary(
                    buffer,
                    info.format,
                    &self.buffer_stats[buffer as usize],
                    &self.accumulated[buffer as usize],
                )
            })
            .collect();
        let summary = ErrorRateSummary::build(
            &self.test_name,
            &self.config.config_name,
            &self.stats,
            buffers,
            self.deferred.clone(),
        );
        let level = if summary.passed() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let outcome = if summary.passed() {
            Outcome::Pass
        } else {
            Outcome::Fail
        };
        let details = serde_json::to_value(&summary).unwrap_or_default();
        let entry = self
            .entry(level, "golden.summary")
            .with_outcome(outcome)
            .with_details(details);
        self.emit(entry);
        summary
    }

    /// Release the binding.
    ///
    /// Fails with [`GoldenError::SummaryNotQueried`] when failures could have been deferred
    /// and nobody asked for the summary.
    pub fn unbind(mut self) -> Result<(), GoldenError> {
        let entry = self.entry(LogLevel::Info, "golden.unbind");
        self.emit(entry);
        let _ = self.log.flush();
        if !self.config.stop_on_error && self.stats.checks > 0 && !self.summary_queried {
            return Err(GoldenError::SummaryNotQueried);
        }
        Ok(())
    }

    // -- logging ----------------------------------------------------------

    fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        self.log
            .entry(level, event)
            .with_test(self.test_name.as_str(), self.config.config_name.as_str())
            .with_loop(self.state.loop_index, self.state.row)
    }

    fn emit(&mut self, entry: LogEntry) {
        // Logging never changes a verdict.
        let _ = self.log.emit_entry(entry);
    }

    fn log_bind(&mut self) -> Result<(), GoldenError> {
        let mut devices = Vec::new();
        for buffer in 0..self.layout.buffer_count() {
            if let Some(device) = self.provider.external_signature_device(buffer) {
                devices.push(serde_json::json!({
                    "buffer": buffer,
                    "identity": device.signature_identity()?,
                    "bins": device.bin_count(),
                }));
            }
        }
        let slots: Vec<_> = (0..self.layout.buffer_count())
            .flat_map(|buffer| {
                self.layout.slots_for(buffer).map(move |(algorithm, slot)| {
                    serde_json::json!({
                        "buffer": buffer,
                        "algorithm": algorithm.name(),
                        "offset": slot.offset,
                        "elements": slot.elements,
                        "bins": slot.bins,
                    })
                })
            })
            .collect();
        let entry = self
            .entry(LogLevel::Info, "golden.bind")
            .with_details(serde_json::json!({
                "buffers": self.layout.buffer_count(),
                "record_len": self.layout.total_len(),
                "mask": self.layout.mask().bits(),
                "slots": slots,
                "external_devices": devices,
            }));
        self.emit(entry);
        Ok(())
    }

    fn log_mismatch(&mut self, mismatch: &MismatchReport) {
        let level = if mismatch.error {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        let entry = self
            .entry(level, "golden.mismatch")
            .with_buffer(mismatch.buffer)
            .with_algorithm(mismatch.algorithm.name())
            .with_details(serde_json::json!({
                "bin": mismatch.bin,
                "element": mismatch.element,
                "expected": mismatch.expected,
                "actual": mismatch.actual,
                "error": mismatch.error,
                "fatal": mismatch.fatal,
            }));
        self.emit(entry);
    }

    fn log_values(&mut self) {
        for buffer in 0..self.layout.buffer_count() {
            let values: serde_json::Map<String, serde_json::Value> = self
                .layout
                .slots_for(buffer)
                .map(|(algorithm, slot)| {
                    (
                        algorithm.name().to_string(),
                        serde_json::json!(&self.new_record[slot.range()]),
                    )
                })
                .collect();
            let entry = self
                .entry(LogLevel::Info, "golden.values")
                .with_buffer(buffer)
                .with_details(serde_json::Value::Object(values));
            self.emit(entry);
        }
    }

    fn log_buffer_report(&mut self, report: &BufferReport) {
        let details = serde_json::to_value(report).unwrap_or_default();
        let entry = self
            .entry(LogLevel::Info, "golden.buffer")
            .with_buffer(report.buffer)
            .with_outcome(verdict_outcome(report.verdict))
            .with_details(details);
        self.emit(entry);
    }
}

fn compute_layout<P: BufferProvider + ?Sized>(
    config: &GoldenConfig,
    provider: &P,
) -> Result<RecordLayout, GoldenError> {
    let buffers = (0..provider.buffer_count())
        .map(|index| BufferInfo::snapshot(provider, index))
        .collect();
    RecordLayout::compute(config.algorithm_mask, buffers, config.bin_settings())
}

fn store_key(test_name: &str, config: &GoldenConfig, layout: &RecordLayout) -> StoreKey {
    StoreKey {
        test_name: test_name.to_string(),
        config_name: config.config_name.clone(),
        algorithm_mask: layout.mask().bits(),
        record_len: layout.total_len(),
    }
}
