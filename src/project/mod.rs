//! Project layout on disk.
//!
//! A project snapshots the code under test once, at creation, and keeps every
//! artifact of its mutation runs next to it:
//!
//! ```text
//! <projects_dir>/<name>/
//!   original_src/   copy of the source tree (the baseline)
//!   tests/          copy of the test tree, shared by every run
//!   mutations/      one workspace per mutant, plus the baseline build slot
//!   test_results/   one <run_id>.json per run
//! ```

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::mutation::workspace::copy_tree;
use crate::mutation::{ResultStore, WorkspaceManager};

const SOURCE_DIR: &str = "original_src";
const TEST_DIR: &str = "tests";
const MUTATIONS_DIR: &str = "mutations";
const RESULTS_DIR: &str = "test_results";

/// An initialised mutation testing project.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
}

impl Project {
    /// Create a new project by copying the source and test trees.
    ///
    /// Fails if a project with the same name already exists.
    pub fn init(projects_dir: &Path, name: &str, source: &Path, tests: &Path) -> Result<Self> {
        validate_name(name)?;

        let root = projects_dir.join(name);
        if root.exists() {
            bail!("Project '{}' already exists at {}", name, root.display());
        }
        if !source.is_dir() {
            bail!("Source directory {} does not exist", source.display());
        }
        if !tests.is_dir() {
            bail!("Test directory {} does not exist", tests.display());
        }

        let project = Self {
            name: name.to_string(),
            root,
        };

        let created = (|| -> Result<()> {
            std::fs::create_dir_all(&project.root)
                .with_context(|| format!("Failed to create {}", project.root.display()))?;
            copy_tree(source, &project.source_dir())
                .with_context(|| format!("Failed to copy sources from {}", source.display()))?;
            copy_tree(tests, &project.test_dir())
                .with_context(|| format!("Failed to copy tests from {}", tests.display()))?;
            std::fs::create_dir_all(project.mutations_dir())?;
            std::fs::create_dir_all(project.results_dir())?;
            Ok(())
        })();

        if let Err(e) = created {
            if let Err(cleanup) = std::fs::remove_dir_all(&project.root) {
                tracing::warn!(
                    "Failed to remove partially created project {}: {}",
                    project.root.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("Created project '{}' at {}", name, project.root.display());
        Ok(project)
    }

    /// Open an existing project, checking that its layout is intact.
    pub fn open(projects_dir: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;

        let project = Self {
            name: name.to_string(),
            root: projects_dir.join(name),
        };
        if !project.root.is_dir() {
            bail!("Project '{}' not found in {}", name, projects_dir.display());
        }
        for dir in [
            project.source_dir(),
            project.test_dir(),
            project.mutations_dir(),
            project.results_dir(),
        ] {
            if !dir.is_dir() {
                bail!(
                    "Project '{}' is missing its {} directory",
                    name,
                    dir.display()
                );
            }
        }
        Ok(project)
    }

    /// Names of every project under `projects_dir`, sorted.
    pub fn list(projects_dir: &Path) -> Result<Vec<String>> {
        if !projects_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(projects_dir)
            .with_context(|| format!("Failed to read {}", projects_dir.display()))?
        {
            let entry = entry?;
            if entry.path().join(SOURCE_DIR).is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join(TEST_DIR)
    }

    pub fn mutations_dir(&self) -> PathBuf {
        self.root.join(MUTATIONS_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    pub fn workspaces(&self) -> WorkspaceManager {
        WorkspaceManager::new(self.source_dir(), self.mutations_dir())
    }

    pub fn store(&self) -> ResultStore {
        ResultStore::new(self.results_dir())
    }

    /// Remove every workspace left behind by earlier runs.
    pub fn reset_workspaces(&self) -> Result<()> {
        let dir = self.mutations_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(())
    }
}

/// Project names become directory names.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        bail!("Invalid project name '{}'", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_trees(dir: &Path) -> (PathBuf, PathBuf) {
        let src = dir.join("input/src");
        let tests = dir.join("input/test");
        std::fs::create_dir_all(src.join("edu/uni")).unwrap();
        std::fs::create_dir_all(&tests).unwrap();
        std::fs::write(src.join("edu/uni/Course.java"), "class Course {}").unwrap();
        std::fs::write(tests.join("CourseTest.java"), "class CourseTest {}").unwrap();
        (src, tests)
    }

    #[test]
    fn test_init_creates_layout() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        let projects = temp.path().join("projects");

        let project = Project::init(&projects, "course-app", &src, &tests).unwrap();

        assert_eq!(project.root, projects.join("course-app"));
        assert!(project.source_dir().join("edu/uni/Course.java").is_file());
        assert!(project.test_dir().join("CourseTest.java").is_file());
        assert!(project.mutations_dir().is_dir());
        assert!(project.results_dir().is_dir());
    }

    #[test]
    fn test_init_rejects_existing_name() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        let projects = temp.path().join("projects");

        Project::init(&projects, "course-app", &src, &tests).unwrap();
        let err = Project::init(&projects, "course-app", &src, &tests).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_init_missing_source_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let (_, tests) = sample_trees(temp.path());
        let projects = temp.path().join("projects");

        let result = Project::init(&projects, "p", &temp.path().join("nope"), &tests);
        assert!(result.is_err());
        assert!(!projects.join("p").exists());
    }

    #[test]
    fn test_invalid_names() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        for name in ["", "..", "a/b", "with space"] {
            assert!(Project::init(temp.path(), name, &src, &tests).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_open_and_list() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        let projects = temp.path().join("projects");

        Project::init(&projects, "beta", &src, &tests).unwrap();
        Project::init(&projects, "alpha", &src, &tests).unwrap();

        let project = Project::open(&projects, "alpha").unwrap();
        assert_eq!(project.name, "alpha");
        assert_eq!(Project::list(&projects).unwrap(), vec!["alpha", "beta"]);

        assert!(Project::open(&projects, "gamma").is_err());
    }

    #[test]
    fn test_open_detects_broken_layout() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        let projects = temp.path().join("projects");

        let project = Project::init(&projects, "p", &src, &tests).unwrap();
        std::fs::remove_dir_all(project.results_dir()).unwrap();

        let err = Project::open(&projects, "p").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_reset_workspaces() {
        let temp = TempDir::new().unwrap();
        let (src, tests) = sample_trees(temp.path());
        let project = Project::init(temp.path(), "p", &src, &tests).unwrap();

        std::fs::create_dir_all(project.mutations_dir().join("M1/src")).unwrap();
        project.reset_workspaces().unwrap();

        assert!(project.mutations_dir().is_dir());
        assert!(!project.mutations_dir().join("M1").exists());
    }
}
