//! Mutation batch documents produced by the mutant generator.
//!
//! A batch file holds either one batch object or an array of them. Each batch lists
//! whole-file replacements for one source file of the baseline tree.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{validate_mutant_id, Mutant, MutantLocation};
use crate::language::{declared_class_name, JavaLanguage};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read batch file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse batch file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidId(String),
    #[error("duplicate mutant id: {0}")]
    DuplicateId(String),
}

/// One generated mutation, as emitted by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMutation {
    pub id: String,
    pub operator: String,
    pub mutated_code: String,
    pub location: MutantLocation,
    #[serde(default)]
    pub explanation: String,
}

/// Mutations of a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationBatch {
    /// Mutated file relative to the baseline tree; resolved from the class name if absent
    #[serde(default)]
    pub rel_path: Option<PathBuf>,
    #[serde(default)]
    pub total_mutations: usize,
    pub mutations: Vec<GeneratedMutation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchDocument {
    Many(Vec<MutationBatch>),
    One(MutationBatch),
}

/// A mutant whose target file could not be located in the baseline tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedMutant {
    pub id: String,
    pub reason: String,
}

/// Mutants ready for execution, plus those that can only be recorded as stillborn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutantSet {
    pub mutants: Vec<Mutant>,
    pub unresolved: Vec<UnresolvedMutant>,
}

impl MutantSet {
    /// Every mutant id in the set, resolved or not.
    pub fn ids(&self) -> Vec<String> {
        self.mutants
            .iter()
            .map(|m| m.id.clone())
            .chain(self.unresolved.iter().map(|u| u.id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mutants.len() + self.unresolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only mutants whose file path matches `pattern`. Unresolved mutants have no
    /// path and are dropped.
    pub fn retain_matching(&mut self, pattern: &str) {
        self.mutants.retain(|m| {
            let path = m.relative_file_path.to_string_lossy().replace('\\', "/");
            glob_match::glob_match(pattern, &path)
        });
        self.unresolved.clear();
    }
}

/// Parse a batch document holding one batch or an array of batches.
pub fn parse_batches(contents: &str) -> Result<Vec<MutationBatch>, BatchError> {
    Ok(match serde_json::from_str(contents)? {
        BatchDocument::Many(batches) => batches,
        BatchDocument::One(batch) => vec![batch],
    })
}

/// Read and resolve a batch file against the baseline tree.
pub fn load_batches(
    path: &Path,
    baseline_dir: &Path,
    language: &JavaLanguage,
) -> Result<MutantSet, BatchError> {
    let contents = std::fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let batches = parse_batches(&contents)?;
    resolve_batches(batches, baseline_dir, language)
}

/// Turn generator batches into executable mutants.
///
/// Ids must be valid path components and unique across all batches.
pub fn resolve_batches(
    batches: Vec<MutationBatch>,
    baseline_dir: &Path,
    language: &JavaLanguage,
) -> Result<MutantSet, BatchError> {
    let mut set = MutantSet::default();
    let mut seen = HashSet::new();

    for batch in batches {
        if batch.total_mutations != batch.mutations.len() {
            tracing::warn!(
                "Batch for {} declares {} mutations but lists {}",
                batch
                    .rel_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unnamed file>".to_string()),
                batch.total_mutations,
                batch.mutations.len()
            );
        }

        for mutation in batch.mutations {
            validate_mutant_id(&mutation.id).map_err(BatchError::InvalidId)?;
            if !seen.insert(mutation.id.clone()) {
                return Err(BatchError::DuplicateId(mutation.id));
            }

            let target = match &batch.rel_path {
                Some(path) => Ok(path.clone()),
                None => locate_mutated_file(&mutation.mutated_code, baseline_dir, language),
            };

            match target {
                Ok(relative_file_path) => set.mutants.push(Mutant {
                    id: mutation.id,
                    operator_name: mutation.operator,
                    relative_file_path,
                    mutated_source_text: mutation.mutated_code,
                    location: mutation.location,
                    explanation: mutation.explanation,
                }),
                Err(reason) => {
                    tracing::warn!("Cannot place mutant {}: {}", mutation.id, reason);
                    set.unresolved.push(UnresolvedMutant {
                        id: mutation.id,
                        reason,
                    });
                }
            }
        }
    }

    Ok(set)
}

/// Find the baseline file a whole-file replacement belongs to, by its declared class.
fn locate_mutated_file(
    mutated_code: &str,
    baseline_dir: &Path,
    language: &JavaLanguage,
) -> Result<PathBuf, String> {
    let class_name = declared_class_name(mutated_code)
        .ok_or_else(|| "no class declaration in mutated code".to_string())?;

    match language.find_class_file(baseline_dir, &class_name) {
        Ok(Some(path)) => Ok(path),
        Ok(None) => Err(format!(
            "class {} not found in {}",
            class_name,
            baseline_dir.display()
        )),
        Err(e) => Err(format!("failed to search {}: {}", baseline_dir.display(), e)),
    }
}
