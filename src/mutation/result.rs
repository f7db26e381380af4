//! Run result documents.
//!
//! These types mirror the JSON document written by the external test runner and
//! persisted once per run by the result store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::BASELINE_RUN_ID;

/// Outcome of one test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    /// Identifier that matches the same test across runs
    pub test_unique_id: String,
    #[serde(rename = "is_passed")]
    pub passed: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Outcomes of every test method of one test class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestClassResult {
    #[serde(rename = "test_class_name")]
    pub class_name: String,
    #[serde(rename = "passed_tests")]
    pub passed_count: usize,
    #[serde(rename = "failed_tests")]
    pub failed_count: usize,
    #[serde(rename = "total_tests")]
    pub total_count: usize,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
}

impl TestClassResult {
    /// Build a class result, deriving the counters from the individual outcomes.
    pub fn from_results(class_name: impl Into<String>, test_results: Vec<TestResult>) -> Self {
        let passed_count = test_results.iter().filter(|t| t.passed).count();
        let total_count = test_results.len();
        Self {
            class_name: class_name.into(),
            passed_count,
            failed_count: total_count - passed_count,
            total_count,
            test_results,
        }
    }

    /// Whether the counters agree with the listed outcomes.
    pub fn is_consistent(&self) -> bool {
        let passed = self.test_results.iter().filter(|t| t.passed).count();
        self.total_count == self.test_results.len()
            && self.passed_count + self.failed_count == self.total_count
            && self.passed_count == passed
    }
}

/// Outcome of compiling and testing one source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// ISO-8601 timestamp of the run
    pub timestamp: String,
    pub compiled: bool,
    /// Captured compiler diagnostics, present only when `compiled` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
    /// Set when the sources compiled but the test runner could not produce results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    #[serde(default)]
    pub test_classes: Vec<TestClassResult>,
}

impl RunResult {
    /// A run whose tests executed and reported results.
    pub fn tested(test_classes: Vec<TestClassResult>) -> Self {
        Self {
            timestamp: now_timestamp(),
            compiled: true,
            compile_error: None,
            execution_error: None,
            test_classes,
        }
    }

    /// A run that stopped before any test executed because the tree did not build.
    pub fn compile_failure(error: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            compiled: false,
            compile_error: Some(error.into()),
            execution_error: None,
            test_classes: Vec::new(),
        }
    }

    /// A run that compiled but whose test execution failed as a whole.
    pub fn execution_failure(error: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            compiled: true,
            compile_error: None,
            execution_error: Some(error.into()),
            test_classes: Vec::new(),
        }
    }

    /// Whether the run produced test outcomes that can be compared.
    pub fn is_testable(&self) -> bool {
        self.compiled && self.execution_error.is_none()
    }

    /// Total number of executed tests across all classes.
    pub fn test_count(&self) -> usize {
        self.test_classes.iter().map(|c| c.test_results.len()).sum()
    }

    /// Iterate over every test outcome together with its class name.
    pub fn tests(&self) -> impl Iterator<Item = (&str, &TestResult)> {
        self.test_classes.iter().flat_map(|class| {
            class
                .test_results
                .iter()
                .map(move |test| (class.class_name.as_str(), test))
        })
    }

    /// Tests that failed in this run, keyed as `Class#test`.
    pub fn failed_tests(&self) -> Vec<String> {
        self.tests()
            .filter(|(_, test)| !test.passed)
            .map(|(class, test)| test_key(class, &test.test_name))
            .collect()
    }
}

/// Key used to attribute kills to a specific test.
pub fn test_key(class_name: &str, test_name: &str) -> String {
    format!("{}#{}", class_name, test_name)
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Every loaded run result, keyed by run id.
///
/// One entry may carry [`BASELINE_RUN_ID`]; all others are mutant ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRunSet {
    runs: BTreeMap<String, RunResult>,
}

impl MutationRunSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the result of a run.
    pub fn insert(&mut self, run_id: impl Into<String>, result: RunResult) {
        self.runs.insert(run_id.into(), result);
    }

    pub fn get(&self, run_id: &str) -> Option<&RunResult> {
        self.runs.get(run_id)
    }

    /// The baseline run, if it was loaded.
    pub fn baseline(&self) -> Option<&RunResult> {
        self.runs.get(BASELINE_RUN_ID)
    }

    /// Ids of every mutant run, in sorted order.
    pub fn mutant_ids(&self) -> impl Iterator<Item = &str> {
        self.runs
            .keys()
            .map(String::as_str)
            .filter(|id| *id != BASELINE_RUN_ID)
    }

    /// All runs including the baseline.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunResult)> {
        self.runs.iter().map(|(id, run)| (id.as_str(), run))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
