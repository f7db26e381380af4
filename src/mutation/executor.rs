//! Build-and-test pipeline.
//!
//! Compiles a source tree together with the shared test tree, runs the external
//! test runner over the compiled test classes and turns its result document into a
//! [`RunResult`]. Every run is persisted before [`Pipeline::execute`] returns.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

use super::result::{RunResult, TestClassResult};
use super::store::{ResultStore, StoreError};
use super::workspace::{Workspace, WorkspaceManager};
use super::BASELINE_RUN_ID;
use crate::config::ToolchainConfig;
use crate::language::{self, JavaLanguage};

/// Reasons a compiled run could not produce test outcomes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to discover test classes: {0}")]
    Discovery(String),
    #[error("test runner timed out after {0} seconds")]
    TimedOut(u64),
    #[error("test runner exited with {status}: {output}")]
    TestExecution { status: String, output: String },
    #[error("test runner produced no result document at {0}")]
    MissingResultDocument(PathBuf),
    #[error("malformed result document {path}: {reason}")]
    MalformedResultDocument { path: PathBuf, reason: String },
}

/// Everything one pipeline invocation needs, threaded explicitly through the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    /// Source tree to compile (the baseline tree or a mutant workspace)
    pub source_dir: PathBuf,
    /// Shared, never mutated test tree
    pub test_dir: PathBuf,
    /// Compiler output
    pub build_dir: PathBuf,
    /// Working directory of the compiler and runner processes
    pub scratch_dir: PathBuf,
}

impl RunContext {
    /// Context for a mutant workspace.
    pub fn for_workspace(workspace: &Workspace, test_dir: &Path) -> Self {
        Self {
            run_id: workspace.run_id.clone(),
            source_dir: workspace.source_dir(),
            test_dir: test_dir.to_path_buf(),
            build_dir: workspace.build_dir(),
            scratch_dir: workspace.scratch_dir(),
        }
    }

    /// Context for the baseline run: the unmodified tree is compiled in place, with
    /// build output under the reserved baseline slot of the workspace root.
    pub fn baseline(manager: &WorkspaceManager, test_dir: &Path) -> Self {
        let slot = manager.locate(BASELINE_RUN_ID);
        Self {
            run_id: BASELINE_RUN_ID.to_string(),
            source_dir: manager.baseline_dir().to_path_buf(),
            test_dir: test_dir.to_path_buf(),
            build_dir: slot.build_dir(),
            scratch_dir: slot.scratch_dir(),
        }
    }

    /// Same context with every path made absolute, since subprocesses run elsewhere.
    fn absolutized(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            source_dir: absolute(&self.source_dir),
            test_dir: absolute(&self.test_dir),
            build_dir: absolute(&self.build_dir),
            scratch_dir: absolute(&self.scratch_dir),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Result of a bounded subprocess invocation.
#[derive(Debug)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CommandResult {
    /// Diagnostic text: stderr, falling back to stdout, falling back to the exit status.
    fn diagnostics(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.clone()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.clone()
        } else {
            match self.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

/// Run `program` with a hard timeout. The child is killed if the timeout expires.
pub async fn run_command_with_timeout(
    program: &str,
    args: &[String],
    working_dir: &Path,
    timeout_seconds: u64,
) -> Result<CommandResult, std::io::Error> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let timeout = Duration::from_secs(timeout_seconds);
    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;

    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => Ok(CommandResult {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
            duration_ms,
        }),
        Ok(Err(e)) => Err(e),
        // Dropping the output future drops the child, which kills it
        Err(_) => Ok(CommandResult {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("timed out after {} seconds", timeout_seconds),
            timed_out: true,
            duration_ms,
        }),
    }
}

/// Compiles and tests source trees, persisting every outcome.
#[derive(Debug, Clone)]
pub struct Pipeline {
    toolchain: ToolchainConfig,
    language: JavaLanguage,
    max_error_bytes: usize,
    store: ResultStore,
}

impl Pipeline {
    pub fn new(toolchain: ToolchainConfig, max_error_bytes: usize, store: ResultStore) -> Self {
        let language = JavaLanguage::new(
            toolchain.source_extension.clone(),
            toolchain.test_suffix.clone(),
        );
        Self {
            toolchain,
            language,
            max_error_bytes,
            store,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Build and test the context's tree, then persist the result under its run id.
    ///
    /// Compile and test failures are part of the returned result; only a failure to
    /// persist is an error.
    pub async fn execute(&self, ctx: &RunContext) -> Result<RunResult, StoreError> {
        let result = self.build_and_test(ctx).await;
        self.store.save(&ctx.run_id, &result)?;
        Ok(result)
    }

    /// Build and test without persisting.
    pub async fn build_and_test(&self, ctx: &RunContext) -> RunResult {
        let ctx = ctx.absolutized();

        if let Err(e) = prepare_output_dirs(&ctx) {
            tracing::warn!("Failed to prepare build directories for {}: {}", ctx.run_id, e);
            return RunResult::compile_failure(format!("workspace error: {}", e));
        }

        if let Err(compile_error) = self.compile(&ctx).await {
            tracing::debug!("Compilation failed for {}", ctx.run_id);
            return RunResult::compile_failure(truncate_output(
                &compile_error,
                self.max_error_bytes,
            ));
        }

        match self.run_tests(&ctx).await {
            Ok(test_classes) => {
                let run = RunResult::tested(test_classes);
                tracing::debug!(
                    "Tests finished for {}: {} tests, {} failing",
                    ctx.run_id,
                    run.test_count(),
                    run.failed_tests().len()
                );
                run
            }
            Err(e) => {
                tracing::warn!("Test execution failed for {}: {}", ctx.run_id, e);
                RunResult::execution_failure(truncate_output(&e.to_string(), self.max_error_bytes))
            }
        }
    }

    /// Compile sources and tests into the build directory. Returns the diagnostics on failure.
    async fn compile(&self, ctx: &RunContext) -> Result<(), String> {
        let mut files = self
            .language
            .find_source_files(&ctx.source_dir)
            .map_err(|e| format!("failed to list sources: {}", e))?;
        files.extend(
            self.language
                .find_source_files(&ctx.test_dir)
                .map_err(|e| format!("failed to list tests: {}", e))?,
        );

        // The file list goes through an argument file; large trees overflow argv
        let argfile = ctx.scratch_dir.join("sources.txt");
        let listing: String = files.iter().map(|f| argfile_entry(f) + "\n").collect();
        std::fs::write(&argfile, listing)
            .map_err(|e| format!("failed to write {}: {}", argfile.display(), e))?;

        let jars = language::library_jars(&absolute(&self.toolchain.lib_dir))
            .map_err(|e| format!("failed to list libraries: {}", e))?;

        let mut args = vec!["-d".to_string(), ctx.build_dir.to_string_lossy().into_owned()];
        if !jars.is_empty() {
            args.push("-cp".to_string());
            args.push(language::join_classpath(&jars));
        }
        args.push(format!("@{}", argfile.display()));

        tracing::debug!(
            "Compiling {} files for {} ({} libraries)",
            files.len(),
            ctx.run_id,
            jars.len()
        );

        let result = run_command_with_timeout(
            &self.toolchain.compiler,
            &args,
            &ctx.scratch_dir,
            self.toolchain.compile_timeout_seconds,
        )
        .await
        .map_err(|e| {
            tracing::warn!("Failed to spawn compiler '{}': {}", self.toolchain.compiler, e);
            format!("failed to spawn {}: {}", self.toolchain.compiler, e)
        })?;

        if result.timed_out {
            return Err(format!(
                "compiler timed out after {} seconds",
                self.toolchain.compile_timeout_seconds
            ));
        }
        if !result.success {
            return Err(result.diagnostics());
        }
        Ok(())
    }

    async fn run_tests(&self, ctx: &RunContext) -> Result<Vec<TestClassResult>, PipelineError> {
        let test_classes = self
            .language
            .find_test_classes(&ctx.test_dir)
            .map_err(|e| PipelineError::Discovery(e.to_string()))?;

        if test_classes.is_empty() {
            tracing::warn!("No test classes found under {}", ctx.test_dir.display());
            return Ok(Vec::new());
        }

        let lib_dir = absolute(&self.toolchain.lib_dir);
        let jars = language::library_jars(&lib_dir)
            .map_err(|e| PipelineError::Discovery(e.to_string()))?;

        let mut classpath = vec![ctx.build_dir.clone(), lib_dir];
        classpath.extend(jars);

        let mut args = vec![
            "-cp".to_string(),
            language::join_classpath(&classpath),
            self.toolchain.runner_class.clone(),
        ];
        args.extend(test_classes.iter().cloned());

        let result = run_command_with_timeout(
            &self.toolchain.runtime,
            &args,
            &ctx.scratch_dir,
            self.toolchain.test_timeout_seconds,
        )
        .await
        .map_err(|source| PipelineError::Spawn {
            program: self.toolchain.runtime.clone(),
            source,
        })?;

        tracing::debug!(
            "Test runner for {} finished in {}ms",
            ctx.run_id,
            result.duration_ms
        );

        if result.timed_out {
            return Err(PipelineError::TimedOut(self.toolchain.test_timeout_seconds));
        }
        if !result.success {
            return Err(PipelineError::TestExecution {
                status: result
                    .exit_code
                    .map(|c| format!("status {}", c))
                    .unwrap_or_else(|| "a signal".to_string()),
                output: result.diagnostics(),
            });
        }

        let document = ctx.scratch_dir.join(&self.toolchain.result_file_name);
        let classes = read_result_document(&document)?;
        if classes.is_empty() {
            return Err(PipelineError::MalformedResultDocument {
                path: document,
                reason: format!("no results for {} discovered test classes", test_classes.len()),
            });
        }
        Ok(classes)
    }
}

/// Fresh build and scratch directories; output of an earlier run must not leak in.
fn prepare_output_dirs(ctx: &RunContext) -> std::io::Result<()> {
    for dir in [&ctx.build_dir, &ctx.scratch_dir] {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Parse the runner's document, rejecting class entries whose counters disagree.
fn read_result_document(path: &Path) -> Result<Vec<TestClassResult>, PipelineError> {
    #[derive(serde::Deserialize)]
    struct RunnerDocument {
        #[serde(default)]
        test_classes: Vec<TestClassResult>,
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::MissingResultDocument(path.to_path_buf()))
        }
        Err(e) => {
            return Err(PipelineError::MalformedResultDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let document: RunnerDocument =
        serde_json::from_str(&contents).map_err(|e| PipelineError::MalformedResultDocument {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if let Some(bad) = document.test_classes.iter().find(|c| !c.is_consistent()) {
        return Err(PipelineError::MalformedResultDocument {
            path: path.to_path_buf(),
            reason: format!("inconsistent counts for {}", bad.class_name),
        });
    }

    Ok(document.test_classes)
}

/// Quote a path for a compiler argument file.
fn argfile_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &output[..end])
}
