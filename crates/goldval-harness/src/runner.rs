//! Multi-loop driver for a bound comparator.

use goldval_core::{
    BufferProvider, Comparator, ErrorRateSummary, GoldenError, IterationReport,
};

/// Result of driving a comparator through a range of loops.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub test_name: String,
    pub iterations: Vec<IterationReport>,
    /// Error that ended the run early, if any.
    pub aborted: Option<GoldenError>,
    pub summary: ErrorRateSummary,
}

impl RunOutcome {
    /// No abort and no deferred failure.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.summary.passed()
    }

    /// The aborting error, else the first deferred failure.
    pub fn status(&self) -> Result<(), GoldenError> {
        match &self.aborted {
            Some(err) => Err(err.clone()),
            None => self.summary.status(),
        }
    }
}

/// Runs loops `first_loop..first_loop + loops` on a comparator.
#[derive(Debug, Clone)]
pub struct GoldenRunner {
    pub test_name: String,
    pub first_loop: u32,
    pub loops: u32,
}

impl GoldenRunner {
    #[must_use]
    pub fn new(test_name: impl Into<String>, loops: u32) -> Self {
        Self {
            test_name: test_name.into(),
            first_loop: 0,
            loops,
        }
    }

    #[must_use]
    pub fn starting_at(mut self, first_loop: u32) -> Self {
        self.first_loop = first_loop;
        self
    }

    /// Drive every loop, calling `mutate` on the provider before each one.
    ///
    /// Stops at the first error `run` returns, then collects the summary.
    pub fn run<P, F>(&self, comparator: &mut Comparator<'_, P>, mut mutate: F) -> RunOutcome
    where
        P: BufferProvider + ?Sized,
        F: FnMut(u32, &mut P),
    {
        let mut iterations = Vec::with_capacity(self.loops as usize);
        let mut aborted = None;
        for loop_index in self.first_loop..self.first_loop.saturating_add(self.loops) {
            mutate(loop_index, comparator.provider_mut());
            comparator.set_loop(loop_index);
            match comparator.run() {
                Ok(report) => iterations.push(report),
                Err(err) => {
                    aborted = Some(err);
                    break;
                }
            }
        }
        RunOutcome {
            test_name: self.test_name.clone(),
            iterations,
            aborted,
            summary: comparator.error_rate_summary(),
        }
    }

    /// Drive every loop without touching the provider.
    pub fn run_unchanged<P>(&self, comparator: &mut Comparator<'_, P>) -> RunOutcome
    where
        P: BufferProvider + ?Sized,
    {
        self.run(comparator, |_, _| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticBuffer, SyntheticProvider};
    use goldval_core::{Action, ElementFormat, GoldenConfig};
    use goldval_store::MemoryStore;

    fn provider() -> SyntheticProvider {
        SyntheticProvider::new().with_buffer(SyntheticBuffer::patterned(
            4,
            4,
            ElementFormat::R8G8B8A8,
            3,
        ))
    }

    #[test]
    fn store_then_check_passes_every_loop() {
        let store = MemoryStore::new();
        let mut provider = provider();

        let store_config = GoldenConfig {
            action: Action::Store,
            ..GoldenConfig::default()
        };
        let mut comparator =
            Comparator::bind(&store_config, "runner", &mut provider, &store).expect("bind");
        let stored = GoldenRunner::new("runner", 3).run_unchanged(&mut comparator);
        assert!(stored.passed());
        assert_eq!(stored.summary.stats.stores, 3);
        comparator.unbind().expect("unbind");

        let check_config = GoldenConfig::default();
        let mut comparator =
            Comparator::bind(&check_config, "runner", &mut provider, &store).expect("bind");
        let checked = GoldenRunner::new("runner", 3).run_unchanged(&mut comparator);
        assert!(checked.passed(), "{:?}", checked.status());
        assert_eq!(checked.iterations.len(), 3);
        assert_eq!(checked.summary.stats.passes, 3);
        comparator.unbind().expect("unbind");
    }

    #[test]
    fn missing_reference_aborts_the_run() {
        let store = MemoryStore::new();
        let mut provider = provider();
        let config = GoldenConfig::default();
        let mut comparator =
            Comparator::bind(&config, "runner", &mut provider, &store).expect("bind");
        let outcome = GoldenRunner::new("runner", 5)
            .starting_at(2)
            .run_unchanged(&mut comparator);
        assert!(outcome.iterations.is_empty());
        assert_eq!(
            outcome.status(),
            Err(GoldenError::ValueNotFound { row: 2 })
        );
        assert_eq!(outcome.summary.stats.not_found, 1);
    }
}
