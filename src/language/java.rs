//! Java source tree conventions.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Java handler, parameterised by the file extension and test naming convention.
#[derive(Debug, Clone)]
pub struct JavaLanguage {
    extension: String,
    test_suffix: String,
}

impl Default for JavaLanguage {
    fn default() -> Self {
        Self::new("java", "Test")
    }
}

impl JavaLanguage {
    pub fn new(extension: impl Into<String>, test_suffix: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            test_suffix: test_suffix.into(),
        }
    }

    /// Every source file below `dir`, sorted. Hidden entries are skipped; any other
    /// directory may be a package, whatever its name.
    pub fn find_source_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !dir.is_dir() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                // The root itself may be hidden (e.g. a temp dir); only prune below it
                if e.depth() == 0 {
                    return true;
                }
                !e.file_name().to_string_lossy().starts_with('.')
            })
        {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && path.extension().is_some_and(|ext| ext == self.extension.as_str()) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Names of the test classes under `test_dir`, package-qualified when the file
    /// declares a package. A test class is a source file whose stem ends with the
    /// test suffix.
    pub fn find_test_classes(&self, test_dir: &Path) -> Result<Vec<String>> {
        let mut classes = Vec::new();

        for path in self.find_source_files(test_dir)? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.ends_with(self.test_suffix.as_str()) {
                continue;
            }

            let source = std::fs::read_to_string(&path)?;
            match declared_package(&source) {
                Some(package) => classes.push(format!("{}.{}", package, stem)),
                None => classes.push(stem.to_string()),
            }
        }

        classes.sort();
        classes.dedup();
        Ok(classes)
    }

    /// Locate `<class_name>.<ext>` below `dir`, returning its path relative to `dir`.
    ///
    /// When several files share the name the first in sorted order wins.
    pub fn find_class_file(&self, dir: &Path, class_name: &str) -> Result<Option<PathBuf>> {
        let file_name = format!("{}.{}", class_name, self.extension);
        let found = self
            .find_source_files(dir)?
            .into_iter()
            .find(|p| p.file_name().is_some_and(|n| n == file_name.as_str()));

        Ok(found.and_then(|p| p.strip_prefix(dir).ok().map(Path::to_path_buf)))
    }
}

/// Name of the first top-level class declared in `source`.
///
/// Only lines starting with `public class ` or `class ` are considered, which is the
/// shape the mutation generator emits for whole-file replacements.
pub fn declared_class_name(source: &str) -> Option<String> {
    source.lines().find_map(|line| {
        let line = line.trim_start();
        let rest = line
            .strip_prefix("public class ")
            .or_else(|| line.strip_prefix("class "))?;
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        (!name.is_empty()).then_some(name)
    })
}

/// Package named by a `package a.b.c;` declaration, if any.
fn declared_package(source: &str) -> Option<String> {
    source.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("package ")?;
        let package = rest.trim_end().trim_end_matches(';').trim();
        (!package.is_empty()).then(|| package.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_find_source_files_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = JavaLanguage::default()
            .find_source_files(temp_dir.path())
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_find_source_files_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let files = JavaLanguage::default()
            .find_source_files(&temp_dir.path().join("missing"))
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_find_source_files_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "edu/uni/Person.java", "class Person {}");
        write(temp_dir.path(), "Course.java", "class Course {}");
        write(temp_dir.path(), "README.md", "# Readme");

        let files = JavaLanguage::default()
            .find_source_files(temp_dir.path())
            .unwrap();

        assert_eq!(
            files,
            vec![
                temp_dir.path().join("Course.java"),
                temp_dir.path().join("edu/uni/Person.java"),
            ]
        );
    }

    #[test]
    fn test_find_source_files_skips_hidden() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), ".git/Hook.java", "class Hook {}");
        write(temp_dir.path(), ".Scratch.java", "class Scratch {}");
        write(temp_dir.path(), "Main.java", "class Main {}");

        let files = JavaLanguage::default()
            .find_source_files(temp_dir.path())
            .unwrap();

        assert_eq!(files, vec![temp_dir.path().join("Main.java")]);
    }

    #[test]
    fn test_find_source_files_includes_packages_named_like_build_dirs() {
        let temp_dir = TempDir::new().unwrap();
        for package in ["build", "out", "target", "node_modules"] {
            write(
                temp_dir.path(),
                &format!("com/acme/{}/Tool.java", package),
                "class Tool {}",
            );
        }

        let files = JavaLanguage::default()
            .find_source_files(temp_dir.path())
            .unwrap();

        assert_eq!(
            files,
            vec![
                temp_dir.path().join("com/acme/build/Tool.java"),
                temp_dir.path().join("com/acme/node_modules/Tool.java"),
                temp_dir.path().join("com/acme/out/Tool.java"),
                temp_dir.path().join("com/acme/target/Tool.java"),
            ]
        );
    }

    #[test]
    fn test_find_test_classes_uses_suffix_and_package() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "CourseTest.java", "public class CourseTest {}");
        write(
            temp_dir.path(),
            "edu/uni/PersonTest.java",
            "package edu.uni;\n\npublic class PersonTest {}",
        );
        write(temp_dir.path(), "TestUtils.java", "class TestUtils {}");

        let classes = JavaLanguage::default()
            .find_test_classes(temp_dir.path())
            .unwrap();

        assert_eq!(classes, vec!["CourseTest", "edu.uni.PersonTest"]);
    }

    #[test]
    fn test_find_test_classes_custom_suffix() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "CourseSpec.java", "class CourseSpec {}");
        write(temp_dir.path(), "CourseTest.java", "class CourseTest {}");

        let classes = JavaLanguage::new("java", "Spec")
            .find_test_classes(temp_dir.path())
            .unwrap();

        assert_eq!(classes, vec!["CourseSpec"]);
    }

    #[test]
    fn test_find_class_file() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "edu/uni/Course.java", "class Course {}");

        let handler = JavaLanguage::default();
        assert_eq!(
            handler.find_class_file(temp_dir.path(), "Course").unwrap(),
            Some(PathBuf::from("edu/uni/Course.java"))
        );
        assert_eq!(handler.find_class_file(temp_dir.path(), "Cours").unwrap(), None);
    }

    #[test]
    fn test_declared_class_name() {
        let source = "package edu.uni;\n\nimport java.util.List;\n\npublic class Course extends Base {\n}";
        assert_eq!(declared_class_name(source), Some("Course".to_string()));
        assert_eq!(declared_class_name("class Person{}"), Some("Person".to_string()));
        assert_eq!(declared_class_name("interface Shape {}"), None);
    }

    #[test]
    fn test_declared_package() {
        assert_eq!(
            declared_package("package edu.uni ;\nclass A {}"),
            Some("edu.uni".to_string())
        );
        assert_eq!(declared_package("class A {}"), None);
    }
}
