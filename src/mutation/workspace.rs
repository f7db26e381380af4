//! Per-mutant workspaces.
//!
//! A workspace is a full copy of the baseline source tree with exactly one file
//! replaced by the mutant's text. Workspaces are never reused: creating one for an
//! id whose directory already exists is an error.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use super::{validate_mutant_id, Mutant};

/// Errors raised while materializing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid mutant id: {0}")]
    InvalidMutantId(String),
    #[error("workspace already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("mutated file path escapes the source tree: {0}")]
    PathEscapesTree(PathBuf),
    #[error("mutated file does not exist in the baseline tree: {0}")]
    FileNotInBaseline(PathBuf),
    #[error("failed to copy source tree: {0}")]
    Copy(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated source tree for one run, plus the directories the pipeline writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Run id the workspace was created for
    pub run_id: String,
    /// Directory owning everything that belongs to this run
    pub root: PathBuf,
}

impl Workspace {
    /// Copy of the baseline sources with the mutation applied.
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Compiler output directory.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Working directory of the compiler and test runner processes.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("run")
    }
}

/// Creates and discards workspaces below a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    baseline_dir: PathBuf,
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(baseline_dir: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            baseline_dir: baseline_dir.into(),
            root: root.into(),
        }
    }

    pub fn baseline_dir(&self) -> &Path {
        &self.baseline_dir
    }

    /// Path the workspace for `run_id` lives at, whether or not it exists.
    pub fn locate(&self, run_id: &str) -> Workspace {
        Workspace {
            run_id: run_id.to_string(),
            root: self.root.join(run_id),
        }
    }

    /// Materialize a fresh workspace for `mutant`.
    ///
    /// This is blocking filesystem work; async callers should run it on
    /// `spawn_blocking`. A partially created workspace is removed before an error
    /// is returned.
    pub fn create_workspace(&self, mutant: &Mutant) -> Result<Workspace, WorkspaceError> {
        validate_mutant_id(&mutant.id).map_err(WorkspaceError::InvalidMutantId)?;
        let relative = checked_relative_path(&mutant.relative_file_path)?;

        if !self.baseline_dir.join(&relative).is_file() {
            return Err(WorkspaceError::FileNotInBaseline(relative));
        }

        let workspace = self.locate(&mutant.id);
        if workspace.root.exists() {
            return Err(WorkspaceError::AlreadyExists(workspace.root));
        }

        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir(&workspace.root)?;

        let populated = copy_tree(&self.baseline_dir, &workspace.source_dir()).and_then(|()| {
            std::fs::write(
                workspace.source_dir().join(&relative),
                mutant.mutated_source_text.as_bytes(),
            )?;
            Ok(())
        });

        if let Err(e) = populated {
            if let Err(cleanup) = std::fs::remove_dir_all(&workspace.root) {
                tracing::warn!(
                    "Failed to remove partial workspace {}: {}",
                    workspace.root.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::debug!(
            "Created workspace for {} at {} ({} replaced)",
            mutant.id,
            workspace.root.display(),
            relative.display()
        );
        Ok(workspace)
    }

    /// Remove a workspace and everything in it. Missing workspaces are ignored.
    pub fn discard(&self, workspace: &Workspace) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&workspace.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Reject absolute paths and any component that could leave the tree.
fn checked_relative_path(path: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(WorkspaceError::PathEscapesTree(path.to_path_buf())),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(WorkspaceError::PathEscapesTree(path.to_path_buf()));
    }
    Ok(relative)
}

/// Recursively copy the contents of `from` into `to`, creating `to` if needed.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), WorkspaceError> {
    std::fs::create_dir_all(to)?;

    let options = fs_extra::dir::CopyOptions {
        overwrite: false,
        skip_exist: false,
        buffer_size: 64 * 1024, // 64KB buffer
        copy_inside: true,
        content_only: true,
        depth: 0,
    };

    fs_extra::dir::copy(from, to, &options).map_err(|e| WorkspaceError::Copy(e.to_string()))?;
    Ok(())
}
