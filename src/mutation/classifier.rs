//! Differential classification of mutants against the baseline run.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use super::result::{test_key, MutationRunSet, RunResult, TestResult};
use super::MutantStatus;

/// Errors that abort classification as a whole.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no baseline result found; run the baseline before classifying mutants")]
    MissingBaseline,
    #[error("baseline run is unusable: {0}")]
    UnusableBaseline(String),
}

/// How trivial mutants contribute to the mutation score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorePolicy {
    /// Count trivial mutants in the numerator as if they were killed.
    pub trivial_counts_as_killed: bool,
}

/// Number of mutants per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub live: usize,
    pub killed: usize,
    pub stillborn: usize,
    pub trivial: usize,
}

impl StatusCounts {
    fn record(&mut self, status: MutantStatus) {
        match status {
            MutantStatus::Live => self.live += 1,
            MutantStatus::Killed => self.killed += 1,
            MutantStatus::Stillborn => self.stillborn += 1,
            MutantStatus::Trivial => self.trivial += 1,
        }
    }
}

/// Aggregated outcome of a mutation analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationSummary {
    pub total_mutants: usize,
    pub mutant_status_counts: StatusCounts,
    /// Percentage of non-stillborn mutants that were killed
    pub mutation_score: f64,
    /// Number of mutants each `Class#test` helped kill
    pub test_impact: BTreeMap<String, usize>,
    pub mutant_status_by_id: BTreeMap<String, MutantStatus>,
}

impl MutationSummary {
    /// Test impact entries ordered by kill count (highest first), then by key.
    pub fn ranked_test_impact(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .test_impact
            .iter()
            .map(|(key, count)| (key.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

/// Matched-test comparison of one mutant run against the baseline.
struct Comparison<'a> {
    total: usize,
    differing: usize,
    /// Matched tests that failed under the mutant, with their class name
    failed_under_mutant: Vec<(&'a str, &'a TestResult)>,
}

fn compare<'a>(baseline: &RunResult, mutant: &'a RunResult) -> Comparison<'a> {
    let mutant_tests: HashMap<&str, (&str, &TestResult)> = mutant
        .tests()
        .map(|(class_name, test)| (test.test_unique_id.as_str(), (class_name, test)))
        .collect();

    let mut comparison = Comparison {
        total: 0,
        differing: 0,
        failed_under_mutant: Vec::new(),
    };

    let mut seen = HashSet::new();
    for (_, baseline_test) in baseline.tests() {
        // Each id is one matched pair at most
        if !seen.insert(baseline_test.test_unique_id.as_str()) {
            continue;
        }
        // Tests present on only one side are ignored.
        let Some(&(class_name, test)) = mutant_tests.get(baseline_test.test_unique_id.as_str())
        else {
            continue;
        };
        comparison.total += 1;
        if baseline_test.passed != test.passed {
            comparison.differing += 1;
        }
        if !test.passed {
            comparison.failed_under_mutant.push((class_name, test));
        }
    }

    comparison
}

fn usable_baseline(run_set: &MutationRunSet) -> Result<&RunResult, ClassifyError> {
    let baseline = run_set.baseline().ok_or(ClassifyError::MissingBaseline)?;
    if !baseline.compiled {
        return Err(ClassifyError::UnusableBaseline(format!(
            "baseline did not compile: {}",
            baseline.compile_error.as_deref().unwrap_or("unknown error")
        )));
    }
    if let Some(error) = &baseline.execution_error {
        return Err(ClassifyError::UnusableBaseline(format!(
            "baseline tests could not be executed: {}",
            error
        )));
    }
    Ok(baseline)
}

fn status_from_comparison(comparison: &Comparison<'_>) -> MutantStatus {
    if comparison.differing == 0 {
        MutantStatus::Live
    } else if comparison.differing == comparison.total {
        MutantStatus::Trivial
    } else {
        MutantStatus::Killed
    }
}

/// Classify one mutant of the run set.
///
/// Missing, non-compiling and unexecutable runs are stillborn without consulting
/// the baseline; every other mutant requires a usable baseline.
pub fn classify(mutant_id: &str, run_set: &MutationRunSet) -> Result<MutantStatus, ClassifyError> {
    let Some(run) = run_set.get(mutant_id) else {
        return Ok(MutantStatus::Stillborn);
    };
    if !run.is_testable() {
        return Ok(MutantStatus::Stillborn);
    }
    let baseline = usable_baseline(run_set)?;
    Ok(status_from_comparison(&compare(baseline, run)))
}

/// Summarize every mutant run present in the run set.
pub fn summarize(
    run_set: &MutationRunSet,
    policy: ScorePolicy,
) -> Result<MutationSummary, ClassifyError> {
    let ids: Vec<&str> = run_set.mutant_ids().collect();
    summarize_ids(run_set, &ids, policy)
}

/// Summarize a known batch of mutants.
///
/// Mutants in `mutant_ids` without a stored run are counted as stillborn instead of
/// being dropped from the totals. Runs in the set that are not listed are ignored.
pub fn summarize_expected<S: AsRef<str>>(
    run_set: &MutationRunSet,
    mutant_ids: &[S],
    policy: ScorePolicy,
) -> Result<MutationSummary, ClassifyError> {
    let mut ids: Vec<&str> = mutant_ids.iter().map(|id| id.as_ref()).collect();
    ids.sort_unstable();
    ids.dedup();
    summarize_ids(run_set, &ids, policy)
}

fn summarize_ids(
    run_set: &MutationRunSet,
    ids: &[&str],
    policy: ScorePolicy,
) -> Result<MutationSummary, ClassifyError> {
    let baseline = usable_baseline(run_set)?;

    let mut counts = StatusCounts::default();
    let mut test_impact: BTreeMap<String, usize> = BTreeMap::new();
    let mut mutant_status_by_id = BTreeMap::new();

    for &id in ids {
        let status = match run_set.get(id) {
            Some(run) if run.is_testable() => {
                let comparison = compare(baseline, run);
                let status = status_from_comparison(&comparison);
                if matches!(status, MutantStatus::Killed | MutantStatus::Trivial) {
                    for (class_name, test) in &comparison.failed_under_mutant {
                        *test_impact
                            .entry(test_key(class_name, &test.test_name))
                            .or_insert(0) += 1;
                    }
                }
                status
            }
            _ => MutantStatus::Stillborn,
        };

        counts.record(status);
        mutant_status_by_id.insert(id.to_string(), status);
    }

    let total_mutants = ids.len();
    let scored = if policy.trivial_counts_as_killed {
        counts.killed + counts.trivial
    } else {
        counts.killed
    };
    let denominator = total_mutants - counts.stillborn;
    let mutation_score = if denominator == 0 {
        0.0
    } else {
        scored as f64 / denominator as f64 * 100.0
    };

    tracing::debug!(
        "Summarized {} mutants: {} live, {} killed, {} stillborn, {} trivial",
        total_mutants,
        counts.live,
        counts.killed,
        counts.stillborn,
        counts.trivial
    );

    Ok(MutationSummary {
        total_mutants,
        mutant_status_counts: counts,
        mutation_score,
        test_impact,
        mutant_status_by_id,
    })
}
