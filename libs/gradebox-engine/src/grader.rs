/// Batch Grader - Per-Request Orchestration
///
/// Runs the binder + executor once per test case, aggregates pass counts,
/// and applies the submit-mode visibility contract.
///
/// **Independence:**
/// Every case goes through its own sandbox invocation (a fresh container),
/// so module-level state mutated by one case can never leak into another.
/// That guarantee is what makes the optional parallel mode safe: containers
/// share nothing, and ordered buffering keeps results in caller order.
///
/// **Visibility contract (submit mode):**
/// Sample and hidden cases are graded as one combined ordered batch, samples
/// first. Only the sample prefix is returned in detail; hidden inputs,
/// expected values, and error messages are withheld by design, not as an
/// optimization.
use crate::executor::execute_case;
use crate::sandbox::Sandbox;
use futures_util::stream::{self, StreamExt};
use gradebox_common::types::{BatchVerdict, RunReport, Submission, SubmitReport, TestCase};
use tracing::info;

pub struct Grader<S> {
    sandbox: S,
    parallelism: usize,
}

impl<S: Sandbox> Grader<S> {
    /// Sequential grader - the simple, safe default.
    pub fn new(sandbox: S) -> Self {
        Self {
            sandbox,
            parallelism: 1,
        }
    }

    /// Grade up to `parallelism` cases concurrently, each in its own
    /// container. Result order still follows case order.
    pub fn with_parallelism(sandbox: S, parallelism: usize) -> Self {
        Self {
            sandbox,
            parallelism: parallelism.max(1),
        }
    }

    /// Grade every case independently, preserving caller order.
    pub async fn grade_batch(&self, submission: &Submission, cases: &[TestCase]) -> BatchVerdict {
        let results: Vec<_> = stream::iter(
            cases
                .iter()
                .map(|case| execute_case(&self.sandbox, submission, case)),
        )
        .buffered(self.parallelism)
        .collect()
        .await;

        let passed_count = results.iter().filter(|r| r.passed).count();
        let total_count = results.len();
        info!(passed = passed_count, total = total_count, "Batch graded");

        BatchVerdict {
            results,
            passed_count,
            total_count,
        }
    }

    /// Run mode: sample cases only, full detail returned.
    pub async fn run(&self, submission: &Submission, cases: &[TestCase]) -> RunReport {
        let verdict = self.grade_batch(submission, cases).await;
        RunReport {
            passed: verdict.passed_count,
            total: verdict.total_count,
            results: verdict.results,
        }
    }

    /// Submit mode: samples and hidden cases graded as one combined batch;
    /// hidden outcomes contribute to the counts only.
    pub async fn submit(
        &self,
        submission: &Submission,
        sample_cases: &[TestCase],
        hidden_cases: &[TestCase],
    ) -> SubmitReport {
        let combined: Vec<TestCase> = sample_cases
            .iter()
            .chain(hidden_cases.iter())
            .cloned()
            .collect();
        let verdict = self.grade_batch(submission, &combined).await;
        withhold_hidden(verdict, sample_cases.len())
    }
}

/// Truncate a combined verdict to its sample prefix. Pure, so the
/// information-hiding contract is testable without a sandbox.
fn withhold_hidden(verdict: BatchVerdict, sample_count: usize) -> SubmitReport {
    let mut visible_results = verdict.results;
    visible_results.truncate(sample_count);
    SubmitReport {
        accepted: verdict.passed_count == verdict.total_count,
        passed: verdict.passed_count,
        total: verdict.total_count,
        visible_results,
    }
}
