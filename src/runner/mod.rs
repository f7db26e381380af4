//! Batch orchestration: the baseline run plus a bounded pool of mutant workers.
//!
//! Each worker takes one mutant at a time, materializes its workspace, compiles and
//! tests it, persists the result and (by default) discards the workspace. Per-mutant
//! failures are recorded and the pool moves on; only a result store failure aborts
//! the batch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::Duration;

use crate::mutation::batch::MutantSet;
use crate::mutation::store::StoreError;
use crate::mutation::workspace::WorkspaceError;
use crate::mutation::{Mutant, Pipeline, RunContext, RunResult, WorkspaceManager};

/// Conditions that stop the whole batch.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(
        "workspace for mutant {id} already exists at {}; remove it or re-run with --clean",
        .path.display()
    )]
    WorkspaceExists { id: String, path: PathBuf },
}

/// Handle for stopping a running batch from outside (e.g. a Ctrl-C listener).
/// This is cheap to clone and doesn't require any locks.
#[derive(Clone)]
pub struct RunnerHandle {
    should_stop: Arc<AtomicBool>,
}

impl RunnerHandle {
    /// Signal the batch to stop: in-flight runs are killed and their workspaces removed
    pub fn stop(&self) {
        tracing::info!("Stop requested, cancelling in-flight runs...");
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }
}

/// Tuning for a batch run.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// Number of concurrent mutant runs (at least one)
    pub workers: usize,
    /// Leave workspaces on disk after their result is stored
    pub keep_workspaces: bool,
}

/// What happened to the mutants of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Mutants whose workspace was built and run through the pipeline
    pub executed: usize,
    /// Mutants recorded as stillborn because no workspace could be created
    pub workspace_failures: usize,
    /// Mutants left without a result because the batch was stopped
    pub cancelled: usize,
}

impl BatchReport {
    fn merge(&mut self, other: &BatchReport) {
        self.executed += other.executed;
        self.workspace_failures += other.workspace_failures;
        self.cancelled += other.cancelled;
    }
}

/// Outcome of a mutant taken off the queue
enum MutantOutcome {
    Executed(RunResult),
    WorkspaceFailed,
    Cancelled,
}

/// Drives the baseline and mutant runs of one project.
#[derive(Clone)]
pub struct MutationRunner {
    pipeline: Arc<Pipeline>,
    workspaces: Arc<WorkspaceManager>,
    test_dir: PathBuf,
    options: RunnerOptions,
    should_stop: Arc<AtomicBool>,
}

impl MutationRunner {
    pub fn new(
        pipeline: Pipeline,
        workspaces: WorkspaceManager,
        test_dir: impl Into<PathBuf>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            workspaces: Arc::new(workspaces),
            test_dir: test_dir.into(),
            options,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle for stopping the runner from outside.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            should_stop: Arc::clone(&self.should_stop),
        }
    }

    /// Run the baseline and the mutants concurrently.
    ///
    /// Only classification depends on the baseline, so mutant workspaces are built and
    /// tested while the baseline is still running.
    pub async fn run_all(&self, set: MutantSet) -> anyhow::Result<(RunResult, BatchReport)> {
        let (baseline, report) = tokio::join!(self.run_baseline(), self.run_mutants(set));
        Ok((baseline?, report?))
    }

    /// Compile and test the unmodified tree and persist it under the baseline id.
    pub async fn run_baseline(&self) -> anyhow::Result<RunResult> {
        let ctx = RunContext::baseline(&self.workspaces, &self.test_dir);
        self.pipeline.store().remove(&ctx.run_id)?;

        tracing::info!("Running baseline from {}", ctx.source_dir.display());

        let result = tokio::select! {
            result = self.pipeline.execute(&ctx) => result?,
            _ = wait_for_stop_signal(&self.should_stop) => {
                anyhow::bail!("Baseline run cancelled");
            }
        };

        if !result.compiled {
            tracing::error!(
                "Baseline failed to compile; mutants cannot be classified:\n{}",
                result.compile_error.as_deref().unwrap_or_default()
            );
        } else if let Some(error) = &result.execution_error {
            tracing::error!("Baseline tests could not be executed: {}", error);
        } else {
            tracing::info!(
                "Baseline finished: {} tests, {} failing",
                result.test_count(),
                result.failed_tests().len()
            );
        }

        Ok(result)
    }

    /// Run every mutant of `set` through the worker pool.
    ///
    /// Mutants that could not be placed in the baseline tree are recorded as
    /// stillborn without a workspace.
    pub async fn run_mutants(&self, set: MutantSet) -> anyhow::Result<BatchReport> {
        let mut report = BatchReport::default();
        let total = set.len();

        for unresolved in &set.unresolved {
            record_workspace_failure(&self.pipeline, &unresolved.id, &unresolved.reason)?;
            report.workspace_failures += 1;
        }

        if set.mutants.is_empty() {
            return Ok(report);
        }

        let worker_count = self.options.workers.max(1).min(set.mutants.len());
        tracing::info!(
            "Running {} mutants with {} workers",
            set.mutants.len(),
            worker_count
        );

        let (tx, rx) = mpsc::channel::<Mutant>(set.mutants.len());
        let rx = Arc::new(TokioMutex::new(rx));
        let progress = Arc::new(AtomicUsize::new(report.workspace_failures));

        let mut worker_handles = Vec::new();
        for worker_id in 0..worker_count {
            let runner = self.clone();
            let worker_rx = Arc::clone(&rx);
            let progress = Arc::clone(&progress);
            let handle = tokio::spawn(async move {
                mutant_worker(worker_id, runner, worker_rx, progress, total).await
            });
            worker_handles.push(handle);
        }

        let queued = set.mutants.len();
        for mutant in set.mutants {
            if tx.send(mutant).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut fatal = None;
        for handle in worker_handles {
            match handle.await {
                Ok(Ok(worker_report)) => report.merge(&worker_report),
                Ok(Err(e)) => {
                    tracing::error!("Mutant worker aborted: {}", e);
                    fatal.get_or_insert(anyhow::Error::new(e));
                }
                Err(e) => {
                    tracing::error!("Mutant worker panicked: {}", e);
                    fatal.get_or_insert(anyhow::anyhow!("Mutant worker panicked: {}", e));
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e.context("Batch aborted"));
        }

        // Mutants still queued when the workers stopped never ran
        let finished = report.executed + report.workspace_failures + report.cancelled;
        report.cancelled += (queued + set.unresolved.len()).saturating_sub(finished);

        tracing::info!(
            "Batch finished: {} executed, {} without workspace, {} cancelled",
            report.executed,
            report.workspace_failures,
            report.cancelled
        );
        Ok(report)
    }

    /// Workspace, pipeline and cleanup for a single mutant.
    ///
    /// A leftover workspace for the same id is fatal and leaves the stored result of
    /// the earlier run untouched.
    async fn process_mutant(&self, mutant: Mutant) -> Result<MutantOutcome, RunnerError> {
        let existing = self.workspaces.locate(&mutant.id);
        if existing.root.exists() {
            return Err(RunnerError::WorkspaceExists {
                id: mutant.id,
                path: existing.root,
            });
        }

        // A cancelled re-run must not leave the previous run's document behind
        self.pipeline.store().remove(&mutant.id)?;

        let workspaces = Arc::clone(&self.workspaces);
        let id = mutant.id.clone();
        // Use spawn_blocking since the tree copy is synchronous
        let created =
            tokio::task::spawn_blocking(move || workspaces.create_workspace(&mutant)).await;

        let workspace = match created {
            Ok(Ok(workspace)) => workspace,
            Ok(Err(WorkspaceError::AlreadyExists(path))) => {
                return Err(RunnerError::WorkspaceExists { id, path });
            }
            Ok(Err(e)) => {
                record_workspace_failure(&self.pipeline, &id, &e.to_string())?;
                return Ok(MutantOutcome::WorkspaceFailed);
            }
            Err(e) => {
                record_workspace_failure(&self.pipeline, &id, &e.to_string())?;
                return Ok(MutantOutcome::WorkspaceFailed);
            }
        };

        let ctx = RunContext::for_workspace(&workspace, &self.test_dir);
        let outcome = if self.should_stop.load(Ordering::SeqCst) {
            Ok(MutantOutcome::Cancelled)
        } else {
            tokio::select! {
                result = self.pipeline.execute(&ctx) => result.map(MutantOutcome::Executed),
                _ = wait_for_stop_signal(&self.should_stop) => Ok(MutantOutcome::Cancelled),
            }
        };

        // Cleanup happens before a store failure is propagated
        let keep = self.options.keep_workspaces
            && matches!(outcome, Ok(MutantOutcome::Executed(_)));
        if !keep {
            let workspaces = Arc::clone(&self.workspaces);
            let discarded = tokio::task::spawn_blocking(move || workspaces.discard(&workspace)).await;
            match discarded {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to remove workspace for {}: {}", id, e),
                Err(e) => tracing::warn!("Failed to remove workspace for {}: {}", id, e),
            }
        }

        outcome.map_err(RunnerError::from)
    }
}

/// Persist a stillborn result for a mutant that never got a workspace.
fn record_workspace_failure(pipeline: &Pipeline, id: &str, reason: &str) -> Result<(), StoreError> {
    tracing::warn!("No workspace for mutant {}: {}", id, reason);
    pipeline
        .store()
        .save(id, &RunResult::compile_failure(format!("workspace error: {}", reason)))
}

/// Worker function for mutant runs
async fn mutant_worker(
    worker_id: usize,
    runner: MutationRunner,
    receiver: Arc<TokioMutex<mpsc::Receiver<Mutant>>>,
    progress: Arc<AtomicUsize>,
    total: usize,
) -> Result<BatchReport, RunnerError> {
    let mut report = BatchReport::default();

    loop {
        if runner.should_stop.load(Ordering::SeqCst) {
            tracing::debug!("Mutant worker {} stopping due to stop signal", worker_id);
            break;
        }

        let mutant = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                mutant = rx.recv() => mutant,
                _ = wait_for_stop_signal(&runner.should_stop) => {
                    tracing::debug!("Mutant worker {} stopping due to stop signal", worker_id);
                    break;
                }
            }
        };

        let Some(mutant) = mutant else {
            tracing::debug!("Mutant worker {} finished - no more mutants", worker_id);
            break;
        };

        let id = mutant.id.clone();
        let outcome = match runner.process_mutant(mutant).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Nothing further can be recorded safely
                runner.should_stop.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        match outcome {
            MutantOutcome::Executed(result) => {
                report.executed += 1;
                let done = progress.fetch_add(1, Ordering::SeqCst) + 1;
                if result.compiled {
                    tracing::info!(
                        "[{}/{}] Mutant {} tested ({} failing tests)",
                        done,
                        total,
                        id,
                        result.failed_tests().len()
                    );
                } else {
                    tracing::info!("[{}/{}] Mutant {} did not compile", done, total, id);
                }
            }
            MutantOutcome::WorkspaceFailed => {
                report.workspace_failures += 1;
                progress.fetch_add(1, Ordering::SeqCst);
            }
            MutantOutcome::Cancelled => {
                tracing::debug!("Mutant {} cancelled", id);
                report.cancelled += 1;
            }
        }
    }

    Ok(report)
}

/// Helper function to wait for the stop signal (for use in tokio::select!)
async fn wait_for_stop_signal(should_stop: &AtomicBool) {
    while !should_stop.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
