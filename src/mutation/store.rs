//! Result store: one JSON document per run id.

use std::path::{Path, PathBuf};
use thiserror::Error;

use super::result::{MutationRunSet, RunResult};

/// Errors raised by the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize result for {run_id}: {source}")]
    Serialize {
        run_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse result document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory of `<run_id>.json` documents.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the document for `run_id`.
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Persist `result` under `run_id`, replacing any earlier document.
    ///
    /// The document is written to a temporary file in the store directory and then
    /// renamed into place, so a reader never observes a partially written document.
    pub fn save(&self, run_id: &str, result: &RunResult) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let contents =
            serde_json::to_string_pretty(result).map_err(|source| StoreError::Serialize {
                run_id: run_id.to_string(),
                source,
            })?;

        let target = self.path_for(run_id);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err(&self.dir))?;
        std::io::Write::write_all(&mut tmp, contents.as_bytes()).map_err(io_err(tmp.path()))?;
        tmp.persist(&target)
            .map_err(|e| StoreError::Io {
                path: target.clone(),
                source: e.error,
            })?;

        tracing::debug!("Saved result for {} to {}", run_id, target.display());
        Ok(())
    }

    /// Load the document for `run_id`, if one exists.
    pub fn load(&self, run_id: &str) -> Result<Option<RunResult>, StoreError> {
        let path = self.path_for(run_id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let result =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse { path, source })?;
        Ok(Some(result))
    }

    /// Load every document in the store.
    ///
    /// A missing store directory yields an empty set. Documents that cannot be read
    /// or parsed are skipped with a warning and the rest are still returned.
    pub fn load_all(&self) -> Result<MutationRunSet, StoreError> {
        let mut set = MutationRunSet::new();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(set),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match self.load(run_id) {
                Ok(Some(result)) => set.insert(run_id, result),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable result document: {}", e),
            }
        }

        tracing::debug!("Loaded {} result documents from {}", set.len(), self.dir.display());
        Ok(set)
    }

    /// Remove the document for `run_id`. Returns whether one existed.
    pub fn remove(&self, run_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(run_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::result::{TestClassResult, TestResult};
    use crate::mutation::BASELINE_RUN_ID;
    use tempfile::TempDir;

    fn passing_run() -> RunResult {
        RunResult::tested(vec![TestClassResult::from_results(
            "CourseTest",
            vec![TestResult {
                test_name: "testAdd".to_string(),
                test_unique_id: "CourseTest.testAdd".to_string(),
                passed: true,
                error_message: None,
            }],
        )])
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("test_results"));

        let run = passing_run();
        store.save("M1", &run).unwrap();

        assert!(store.path_for("M1").is_file());
        assert_eq!(store.load("M1").unwrap(), Some(run));
        assert_eq!(store.load("M2").unwrap(), None);
    }

    #[test]
    fn test_save_overwrites_previous_document() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());

        store.save("M1", &RunResult::compile_failure("first")).unwrap();
        let second = passing_run();
        store.save("M1", &second).unwrap();
        store.save("M1", &second).unwrap();

        assert_eq!(store.load("M1").unwrap(), Some(second));
        let json_files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(json_files, 1);
    }

    #[test]
    fn test_load_all_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("nope"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_load_all_skips_malformed_documents() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());

        store.save(BASELINE_RUN_ID, &passing_run()).unwrap();
        store.save("M1", &RunResult::compile_failure("err")).unwrap();
        std::fs::write(dir.path().join("M2.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = store.load_all().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.baseline().is_some());
        assert!(set.get("M1").is_some());
        assert!(set.get("M2").is_none());
    }

    #[test]
    fn test_load_malformed_reports_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        std::fs::write(store.path_for("M1"), "[]").unwrap();
        assert!(matches!(store.load("M1"), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        store.save("M1", &passing_run()).unwrap();

        assert!(store.remove("M1").unwrap());
        assert!(!store.remove("M1").unwrap());
        assert_eq!(store.load("M1").unwrap(), None);
    }
}
