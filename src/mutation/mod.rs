//! Mutant execution and classification.
//!
//! This module provides functionality for:
//! - Materializing an isolated workspace per mutant
//! - Compiling and testing a source tree against the shared test tree
//! - Persisting one result document per run and loading them back
//! - Classifying mutants against the baseline run and scoring the suite

pub mod batch;
pub mod classifier;
pub mod executor;
pub mod result;
pub mod store;
pub mod workspace;

pub use classifier::{classify, summarize, summarize_expected, MutationSummary, ScorePolicy};
pub use executor::{Pipeline, RunContext};
pub use result::{MutationRunSet, RunResult, TestClassResult, TestResult};
pub use store::ResultStore;
pub use workspace::{Workspace, WorkspaceManager};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Run identifier reserved for the unmodified source tree.
pub const BASELINE_RUN_ID: &str = "baseline";

/// Location of a mutation in the mutated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutantLocation {
    /// Line number (1-indexed) of the mutated expression
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

/// A single source-level alteration, ready to be executed.
///
/// The engine treats a mutant as opaque: it never inspects `mutated_source_text`
/// beyond writing it over `relative_file_path` inside a fresh workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutant {
    /// Unique id, also used as workspace directory name and result document name
    pub id: String,
    /// Name of the mutation operator that produced this mutant
    pub operator_name: String,
    /// Path of the mutated file, relative to the baseline source tree
    pub relative_file_path: PathBuf,
    /// Full replacement content of the mutated file
    pub mutated_source_text: String,
    pub location: MutantLocation,
    /// Free-text explanation from the generator
    pub explanation: String,
}

/// Survivability of a mutant relative to the baseline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutantStatus {
    /// No matched test changed outcome - the mutant survived
    Live,
    /// Some, but not all, matched tests changed outcome
    Killed,
    /// The mutant could not be built or exercised
    Stillborn,
    /// Every matched test changed outcome
    Trivial,
}

impl std::fmt::Display for MutantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Killed => write!(f, "killed"),
            Self::Stillborn => write!(f, "stillborn"),
            Self::Trivial => write!(f, "trivial"),
        }
    }
}

/// Check that a mutant id can safely name a workspace directory and a result document.
///
/// Ids are restricted to ASCII alphanumerics, `-`, `_` and `.`, must not be `.` or `..`,
/// and must not collide with the reserved baseline id.
pub fn validate_mutant_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("mutant id is empty".to_string());
    }
    if id == "." || id == ".." {
        return Err(format!("mutant id '{}' is not a valid path component", id));
    }
    if id == BASELINE_RUN_ID {
        return Err(format!("mutant id '{}' is reserved for the baseline run", id));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("mutant id '{}' contains invalid character {:?}", id, c));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutant_status_display() {
        assert_eq!(MutantStatus::Live.to_string(), "live");
        assert_eq!(MutantStatus::Killed.to_string(), "killed");
        assert_eq!(MutantStatus::Stillborn.to_string(), "stillborn");
        assert_eq!(MutantStatus::Trivial.to_string(), "trivial");
    }

    #[test]
    fn test_mutant_status_serializes_lowercase() {
        let json = serde_json::to_string(&MutantStatus::Stillborn).unwrap();
        assert_eq!(json, "\"stillborn\"");
    }

    #[test]
    fn test_validate_mutant_id_accepts_generator_ids() {
        assert!(validate_mutant_id("M1").is_ok());
        assert!(validate_mutant_id("Course.java-M12").is_ok());
        assert!(validate_mutant_id("m_0004").is_ok());
    }

    #[test]
    fn test_validate_mutant_id_rejects_path_tricks() {
        assert!(validate_mutant_id("").is_err());
        assert!(validate_mutant_id("..").is_err());
        assert!(validate_mutant_id("a/b").is_err());
        assert!(validate_mutant_id("a\\b").is_err());
        assert!(validate_mutant_id("with space").is_err());
    }

    #[test]
    fn test_validate_mutant_id_rejects_baseline() {
        let err = validate_mutant_id(BASELINE_RUN_ID).unwrap_err();
        assert!(err.contains("reserved"));
    }

    #[test]
    fn test_location_columns_are_optional() {
        let location: MutantLocation = serde_json::from_str(r#"{"line_number": 52}"#).unwrap();
        assert_eq!(location.line_number, 52);
        assert_eq!(location.start_column, None);
        assert_eq!(location.end_column, None);
    }
}
