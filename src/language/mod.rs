//! Language support for the project under test.
//!
//! The engine drives an external JVM toolchain: this module knows how to find
//! sources and test classes in a Java tree and how to assemble a classpath.

mod java;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use java::{declared_class_name, JavaLanguage};

/// Separator between classpath entries on this platform.
pub const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Every `*.jar` in `lib_dir`, sorted. A missing directory yields no jars.
pub fn library_jars(lib_dir: &Path) -> Result<Vec<PathBuf>> {
    if !lib_dir.is_dir() {
        tracing::debug!("Library directory {} does not exist", lib_dir.display());
        return Ok(Vec::new());
    }

    let pattern = lib_dir.join("*.jar");
    let pattern = pattern.to_string_lossy();

    let mut jars = Vec::new();
    for entry in glob::glob(&pattern).context("Invalid library glob pattern")? {
        match entry {
            Ok(path) if path.is_file() => jars.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable library entry: {}", e),
        }
    }

    jars.sort();
    Ok(jars)
}

/// Join classpath entries with the platform separator.
pub fn join_classpath<P: AsRef<Path>>(entries: &[P]) -> String {
    entries
        .iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_library_jars_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("junit-platform.jar"), "").unwrap();
        std::fs::write(temp_dir.path().join("hamcrest.jar"), "").unwrap();
        std::fs::write(temp_dir.path().join("TestRunner.class"), "").unwrap();

        let jars = library_jars(temp_dir.path()).unwrap();
        assert_eq!(
            jars,
            vec![
                temp_dir.path().join("hamcrest.jar"),
                temp_dir.path().join("junit-platform.jar"),
            ]
        );
    }

    #[test]
    fn test_library_jars_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(library_jars(&temp_dir.path().join("lib")).unwrap().is_empty());
    }

    #[test]
    fn test_join_classpath() {
        let entries = vec![PathBuf::from("build"), PathBuf::from("lib/junit.jar")];
        let expected = format!("build{}lib/junit.jar", CLASSPATH_SEPARATOR);
        assert_eq!(join_classpath(&entries), expected);
        assert_eq!(join_classpath::<PathBuf>(&[]), "");
    }
}
