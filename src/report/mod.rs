//! Human-readable views of summaries and stored runs.

use std::fmt;

use crate::mutation::result::test_key;
use crate::mutation::{MutationRunSet, MutationSummary, RunResult, BASELINE_RUN_ID};

/// Text report of a mutation summary.
pub struct SummaryReport<'a> {
    pub project: &'a str,
    pub summary: &'a MutationSummary,
}

impl fmt::Display for SummaryReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary;
        let counts = &summary.mutant_status_counts;

        writeln!(f, "Mutation report for '{}'", self.project)?;
        writeln!(f)?;
        writeln!(f, "Mutants:        {}", summary.total_mutants)?;
        writeln!(f, "  killed:       {}", counts.killed)?;
        writeln!(f, "  trivial:      {}", counts.trivial)?;
        writeln!(f, "  live:         {}", counts.live)?;
        writeln!(f, "  stillborn:    {}", counts.stillborn)?;
        writeln!(f, "Mutation score: {:.2}%", summary.mutation_score)?;

        writeln!(f)?;
        let ranked = summary.ranked_test_impact();
        if ranked.is_empty() {
            writeln!(f, "Test impact: no test killed a mutant")?;
        } else {
            writeln!(f, "Test impact (mutants killed per test):")?;
            for (test, kills) in ranked {
                writeln!(f, "  {:>4}  {}", kills, test)?;
            }
        }

        if !summary.mutant_status_by_id.is_empty() {
            writeln!(f)?;
            writeln!(f, "Mutant status:")?;
            let width = summary
                .mutant_status_by_id
                .keys()
                .map(String::len)
                .max()
                .unwrap_or(0);
            for (id, status) in &summary.mutant_status_by_id {
                writeln!(f, "  {:<width$}  {}", id, status, width = width)?;
            }
        }
        Ok(())
    }
}

/// One line per stored run.
pub struct RunListing<'a>(pub &'a MutationRunSet);

impl fmt::Display for RunListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No stored runs");
        }

        // Baseline first, then mutants in id order
        let runs = self
            .0
            .baseline()
            .map(|run| (BASELINE_RUN_ID, run))
            .into_iter()
            .chain(self.0.iter().filter(|(id, _)| *id != BASELINE_RUN_ID));

        for (id, run) in runs {
            writeln!(f, "{:<16} {:<24} {}", id, run.timestamp, run_state(run))?;
        }
        Ok(())
    }
}

/// Per-class and per-test outcomes of one run.
pub struct RunDetail<'a> {
    pub run_id: &'a str,
    pub run: &'a RunResult,
}

impl fmt::Display for RunDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.run;
        writeln!(f, "Run {} at {}: {}", self.run_id, run.timestamp, run_state(run))?;

        if let Some(error) = &run.compile_error {
            writeln!(f)?;
            writeln!(f, "Compiler output:")?;
            writeln!(f, "{}", error.trim_end())?;
        }
        if let Some(error) = &run.execution_error {
            writeln!(f)?;
            writeln!(f, "Test execution error:")?;
            writeln!(f, "{}", error.trim_end())?;
        }

        for class in &run.test_classes {
            writeln!(f)?;
            writeln!(
                f,
                "{}: {} passed, {} failed, {} total",
                class.class_name, class.passed_count, class.failed_count, class.total_count
            )?;
            for test in &class.test_results {
                let mark = if test.passed { "PASS" } else { "FAIL" };
                writeln!(f, "  [{}] {}", mark, test_key(&class.class_name, &test.test_name))?;
                if let Some(message) = test.error_message.as_deref().filter(|_| !test.passed) {
                    writeln!(f, "         {}", message.lines().next().unwrap_or_default())?;
                }
            }
        }
        Ok(())
    }
}

fn run_state(run: &RunResult) -> String {
    if !run.compiled {
        "compile failed".to_string()
    } else if run.execution_error.is_some() {
        "test execution failed".to_string()
    } else {
        let failed = run.failed_tests().len();
        format!("{} tests, {} failed", run.test_count(), failed)
    }
}
