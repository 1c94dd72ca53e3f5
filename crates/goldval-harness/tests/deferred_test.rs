//! Integration test: deferred failures, skip intervals, dumps and structured logging.
//!
//! Validates:
//! 1. With stop_on_error off, failures are deferred and the summary reports the first one.
//! 2. Unbinding without querying the summary is refused when failures could be deferred.
//! 3. Only every skip_interval-th loop acts.
//! 4. Dump triggers hand buffer bytes to the sink on the right loops.
//! 5. Every emitted log line validates against the JSONL schema.
//! 6. Provider caches are invalidated even when a dump fails mid-iteration.
//!
//! Run: cargo test -p goldval-harness --test deferred_test

use goldval_core::structured_log::{LogEmitter, validate_log_line};
use goldval_core::{
    Action, AlgorithmMask, Channel, CollectingDumpSink, Comparator, DumpRequest, DumpSink,
    DumpTriggers, ElementFormat, GoldenConfig, GoldenError, IterationOutcome, ProviderError,
};
use goldval_harness::{GoldenRunner, SyntheticBuffer, SyntheticProvider};
use goldval_store::MemoryStore;

fn single(value: u32) -> SyntheticProvider {
    SyntheticProvider::new().with_buffer(SyntheticBuffer::filled(1, 1, ElementFormat::R32F, value))
}

fn store_rows(config: &GoldenConfig, provider: &mut SyntheticProvider, store: &MemoryStore, rows: u32) {
    let store_config = GoldenConfig {
        action: Action::Store,
        ..config.clone()
    };
    let mut comparator =
        Comparator::bind(&store_config, "deferred", provider, store).expect("bind for store");
    GoldenRunner::new("deferred", rows)
        .run_unchanged(&mut comparator)
        .status()
        .expect("stores succeed");
    comparator.unbind().expect("unbind");
}

#[test]
fn failures_are_deferred_to_the_summary() {
    let config = GoldenConfig {
        stop_on_error: false,
        algorithm_mask: AlgorithmMask::CHECKSUMS,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = single(10);
    store_rows(&config, &mut provider, &store, 4);

    let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store).expect("bind");
    let outcome = GoldenRunner::new("deferred", 4).run(&mut comparator, |loop_index, provider| {
        let value = if loop_index % 2 == 1 { 99 } else { 10 };
        provider.buffer_mut(0).unwrap().set(0, 0, 0, value);
    });

    assert!(outcome.aborted.is_none());
    let outcomes: Vec<_> = outcome.iterations.iter().map(|it| it.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            IterationOutcome::Passed,
            IterationOutcome::Failed,
            IterationOutcome::Passed,
            IterationOutcome::Failed
        ]
    );
    let summary = &outcome.summary;
    assert_eq!(summary.stats.checks, 4);
    assert_eq!(summary.stats.failures, 2);
    assert!((summary.error_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(summary.channel_total(Channel::Red), 2 * 89);
    assert!(summary.first_failure.is_some());
    assert!(!outcome.passed());
    assert_eq!(
        outcome.status(),
        Err(GoldenError::ValueMismatch {
            loop_index: 1,
            buffer: 0,
            bad_bins: 1,
            error_bins: 1,
            unconditional: false,
        })
    );
    comparator.unbind().expect("summary was queried by the runner");
}

#[test]
fn unbind_requires_summary_when_deferring() {
    let config = GoldenConfig {
        stop_on_error: false,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = single(4);
    store_rows(&config, &mut provider, &store, 1);

    let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store).expect("bind");
    comparator.run().expect("passes");
    assert_eq!(comparator.unbind(), Err(GoldenError::SummaryNotQueried));

    // With stop_on_error on nothing can be deferred.
    let strict = GoldenConfig::default();
    let mut comparator = Comparator::bind(&strict, "deferred", &mut provider, &store).expect("bind");
    comparator.run().expect("passes");
    comparator.unbind().expect("nothing deferred");
}

#[test]
fn skip_interval_selects_action_loops() {
    let config = GoldenConfig {
        skip_interval: 3,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = single(8);
    store_rows(&config, &mut provider, &store, 6);

    let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store).expect("bind");
    assert_eq!(store.row_count(comparator.handle()), Ok(2));
    let outcome = GoldenRunner::new("deferred", 6).run_unchanged(&mut comparator);
    outcome.status().expect("stored rows match");
    let acted: Vec<_> = outcome
        .iterations
        .iter()
        .filter(|it| it.outcome != IterationOutcome::Idle)
        .map(|it| it.loop_index)
        .collect();
    assert_eq!(acted, vec![2, 5]);
    assert_eq!(outcome.summary.stats.loops, 6);
    assert_eq!(outcome.summary.stats.checks, 2);
}

#[test]
fn bad_pixel_dumps_follow_mismatches() {
    let config = GoldenConfig {
        algorithm_mask: AlgorithmMask::CHECKSUMS,
        dump_triggers: DumpTriggers::ON_BAD_PIXEL,
        ..GoldenConfig::default()
    }
    .with_uniform_tolerance(255);
    let store = MemoryStore::new();
    let mut provider = SyntheticProvider::new()
        .with_buffer(SyntheticBuffer::filled(2, 2, ElementFormat::R8G8B8A8, 20));
    store_rows(&config, &mut provider, &store, 2);

    let mut sink = CollectingDumpSink::default();
    {
        let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store)
            .expect("bind")
            .with_dump_sink(&mut sink);
        let clean = comparator.run().expect("clean loop");
        assert_eq!(clean.dumps, 0);

        comparator.set_loop(1);
        comparator.provider_mut().buffer_mut(0).unwrap().set(1, 0, 2, 21);
        let tolerated = comparator.run().expect("tolerated loop");
        assert_eq!(tolerated.outcome, IterationOutcome::Tolerated);
        assert_eq!(tolerated.dumps, 1);
    }
    assert_eq!(sink.dumps.len(), 1);
    let dump = &sink.dumps[0];
    assert_eq!(dump.loop_index, 1);
    assert_eq!(dump.buffer, 0);
    assert_eq!(dump.reason, DumpTriggers::ON_BAD_PIXEL);
    assert_eq!(dump.len, 2 * 2 * 4 * 4);
}

#[test]
fn always_dumps_without_an_action() {
    let config = GoldenConfig {
        action: Action::Skip,
        dump_triggers: DumpTriggers::ALWAYS | DumpTriggers::ON_ERROR,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = SyntheticProvider::new()
        .with_buffer(SyntheticBuffer::patterned(2, 2, ElementFormat::R8G8B8A8, 0))
        .with_buffer(SyntheticBuffer::patterned(2, 2, ElementFormat::Y8, 0));
    let mut sink = CollectingDumpSink::default();
    {
        let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store)
            .expect("bind")
            .with_dump_sink(&mut sink);
        let outcome = GoldenRunner::new("deferred", 2).run_unchanged(&mut comparator);
        outcome.status().expect("skip never fails");
        assert!(
            outcome
                .iterations
                .iter()
                .all(|it| it.outcome == IterationOutcome::Computed && it.dumps == 2)
        );
        assert_eq!(outcome.summary.stats.checks, 0);
    }
    let lens: Vec<_> = sink.dumps.iter().map(|dump| (dump.buffer, dump.len)).collect();
    assert_eq!(lens, vec![(0, 64), (1, 16), (0, 64), (1, 16)]);
    assert!(sink.dumps.iter().all(|dump| dump.reason == DumpTriggers::ALWAYS));
}

struct FullDisk;

impl DumpSink for FullDisk {
    fn dump(&mut self, request: &DumpRequest<'_>) -> Result<(), ProviderError> {
        Err(ProviderError::for_buffer(request.buffer.index, "no space left"))
    }
}

#[test]
fn failed_dump_still_invalidates_the_provider() {
    let config = GoldenConfig {
        action: Action::Skip,
        dump_triggers: DumpTriggers::ALWAYS,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = single(3);
    {
        let mut comparator = Comparator::bind(&config, "deferred", &mut provider, &store)
            .expect("bind")
            .with_dump_sink(FullDisk);
        let err = comparator.run().expect_err("dump sink fails");
        assert!(matches!(err, GoldenError::Provider(_)), "{err:?}");
        assert_eq!(comparator.provider().invalidations(), 1);
        comparator.run().expect_err("dump sink still fails");
        assert_eq!(comparator.provider().invalidations(), 2);
    }
    assert_eq!(provider.invalidations(), 2);
}

#[test]
fn structured_log_lines_validate() {
    let config = GoldenConfig {
        stop_on_error: false,
        structured_report: true,
        print_values: true,
        ..GoldenConfig::default()
    };
    let store = MemoryStore::new();
    let mut provider = single(5);
    store_rows(&config, &mut provider, &store, 1);
    provider.buffer_mut(0).unwrap().set(0, 0, 0, 6);

    let (log, buffer) = LogEmitter::to_shared_buffer("deferred", "run-1");
    let mut comparator =
        Comparator::bind_with_logger(&config, "deferred", &mut provider, &store, log)
            .expect("bind");
    let report = comparator.run().expect("deferred");
    assert_eq!(report.outcome, IterationOutcome::Failed);
    comparator.set_loop(1);
    assert_eq!(
        comparator.run().expect_err("row 1 was never stored"),
        GoldenError::ValueNotFound { row: 1 }
    );
    let summary = comparator.error_rate_summary();
    assert_eq!(summary.stats.not_found, 1);
    comparator.unbind().expect("summary queried");

    for event in [
        "golden.bind",
        "golden.mismatch",
        "golden.values",
        "golden.buffer",
        "golden.not_found",
        "golden.summary",
        "golden.unbind",
    ] {
        assert!(!buffer.events(event).is_empty(), "missing {event}");
    }
    let mismatch = &buffer.events("golden.mismatch")[0];
    assert_eq!(mismatch["algorithm"], "checksums");
    assert_eq!(mismatch["buffer"], 0);
    assert_eq!(mismatch["test"], "deferred");

    let lines = buffer.lines();
    assert!(!lines.is_empty());
    for (i, line) in lines.iter().enumerate() {
        validate_log_line(line, i + 1).unwrap_or_else(|errors| {
            panic!("line {} invalid: {}", i + 1, errors[0]);
        });
    }
    let trace_ids: Vec<_> = buffer
        .entries()
        .iter()
        .map(|entry| entry["trace_id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(trace_ids[0], "deferred::run-1::001");
}
