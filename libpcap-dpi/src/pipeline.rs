//! Run orchestration
//!
//! A `Pipeline` holds what runs share (options, application table, rule and
//! result stores, progress channel). Each run loads the whole file, takes its
//! own rule snapshot and works on private state, so runs on distinct files can
//! execute concurrently.

use crate::analyzer::{AnalyzerOptions, DpiAnalyzer};
use crate::dpi::{AppTable, Inspector};
use crate::error::AnalysisError;
use crate::export::{ExportFilter, ExportStats};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::result::*;
use crate::rules::{RuleSet, RuleStore};
use libpcap_tools::{read_capture_file, CancelToken, PcapEngine};
use std::any::Any;
use std::fs::{self, File};
use std::io::BufWriter;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::Level;

/// Handle on a run executing in the background
pub struct RunHandle {
    pub run_id: RunId,
    cancel: CancelToken,
    join: thread::JoinHandle<RunStatus>,
}

impl RunHandle {
    /// Ask the run to stop before its next packet. A cancelled run ends `failed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end and return its final status
    pub fn join(self) -> RunStatus {
        self.join.join().unwrap_or(RunStatus::Failed)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    options: AnalyzerOptions,
    table: Arc<AppTable>,
    rules: Arc<dyn RuleStore>,
    results: Arc<dyn ResultStore>,
    progress: ProgressSender,
}

impl Pipeline {
    pub fn new(rules: Arc<dyn RuleStore>, results: Arc<dyn ResultStore>) -> Self {
        Pipeline {
            options: AnalyzerOptions::default(),
            table: Arc::new(AppTable::default()),
            rules,
            results,
            progress: ProgressSender::disabled(),
        }
    }

    pub fn with_options(self, options: AnalyzerOptions) -> Self {
        Pipeline { options, ..self }
    }

    pub fn with_app_table(self, table: Arc<AppTable>) -> Self {
        Pipeline { table, ..self }
    }

    pub fn with_progress(self, progress: ProgressSender) -> Self {
        Pipeline { progress, ..self }
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    /// Create a pending result for `path` and analyze it on a new thread
    ///
    /// Returns as soon as the thread is started.
    pub fn submit<P: AsRef<Path>>(&self, path: P) -> Result<RunHandle, AnalysisError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let run_id = self.results.create_pending(RunMetadata::for_path(&path));
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let pipeline = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("run {}", run_id))
            .spawn(move || pipeline.execute(run_id, &path, &token));
        match spawned {
            Ok(join) => Ok(RunHandle {
                run_id,
                cancel,
                join,
            }),
            Err(e) => {
                let msg = format!("could not start run: {}", e);
                self.finish_failed(run_id, &msg);
                Err(AnalysisError::RunFailure(msg))
            }
        }
    }

    /// Analyze `path` on the calling thread
    ///
    /// Returns the completed result, or the error the run failed with.
    pub fn run<P: AsRef<Path>>(
        &self,
        path: P,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let path = path.as_ref();
        let run_id = self.results.create_pending(RunMetadata::for_path(path));
        self.execute(run_id, path, cancel);
        let result = self
            .results
            .get(run_id)
            .ok_or(AnalysisError::UnknownRun(run_id))?;
        match result.status {
            RunStatus::Completed => Ok(result),
            _ => Err(AnalysisError::RunFailure(
                result.error.unwrap_or_else(|| result.status.to_string()),
            )),
        }
    }

    /// Run boundary: every error, and any panic, ends the run `failed`
    fn execute(&self, run_id: RunId, path: &Path, cancel: &CancelToken) -> RunStatus {
        let span = tracing::span!(Level::INFO, "run", id = run_id);
        let _enter = span.enter();

        self.update(run_id, ResultPatch::Processing);
        self.emit(run_id, RunStatus::Processing, 0, "Analysis started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.analyze(run_id, path, cancel)))
            .unwrap_or_else(|payload| Err(AnalysisError::RunFailure(panic_message(payload))));
        match outcome {
            Ok(result) => {
                info!(
                    "run {} completed: {} packets, {} flows, {} dropped",
                    run_id,
                    result.summary.total_packets,
                    result.summary.flow_count,
                    result.summary.dropped
                );
                self.update(run_id, ResultPatch::Completed(Box::new(result)));
                self.emit(run_id, RunStatus::Completed, 100, "Analysis completed");
                RunStatus::Completed
            }
            Err(e) => {
                let msg = e.to_string();
                if e.is_cancelled() {
                    info!("run {} cancelled", run_id);
                } else {
                    error!("run {} failed: {}", run_id, msg);
                }
                self.finish_failed(run_id, &msg);
                RunStatus::Failed
            }
        }
    }

    fn analyze(
        &self,
        run_id: RunId,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let data = read_capture_file(path)?;
        debug!("run {}: loaded {} bytes from {}", run_id, data.len(), path.display());
        let rules = RuleSet::snapshot(self.rules.as_ref());
        let inspector = Inspector::new(self.table.clone());
        let analyzer = DpiAnalyzer::new(run_id, inspector, rules, self.options.clone())
            .with_progress(self.progress.clone())
            .with_result_store(self.results.clone());
        let mut engine = PcapEngine::new(analyzer).with_cancel_token(cancel.clone());
        let run = engine.run(&data)?;
        let mut result = engine
            .into_analyzer()
            .into_result(run_id, RunMetadata::for_path(path));
        result.summary.truncated = run.truncated;
        if run.truncated {
            warn!("run {}: capture truncated after {} records", run_id, run.num_records);
        }
        Ok(result)
    }

    /// Write a copy of `input` without the blocked packets to `output`
    ///
    /// Uses a fresh read of the file and a fresh rule snapshot. The output file is
    /// removed if the export fails.
    pub fn export<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<ExportStats, AnalysisError> {
        let output = output.as_ref();
        let data = read_capture_file(input.as_ref())?;
        let file = File::create(output)?;
        match self.export_to(&data, BufWriter::new(file)) {
            Ok(stats) => {
                info!(
                    "exported {} of {} records to {} ({} dropped, {} unparsed)",
                    stats.forwarded,
                    stats.total,
                    output.display(),
                    stats.dropped,
                    stats.unparsed
                );
                Ok(stats)
            }
            Err(e) => {
                warn!("export to {} failed: {}", output.display(), e);
                if let Err(e) = fs::remove_file(output) {
                    debug!("could not remove {}: {}", output.display(), e);
                }
                Err(e)
            }
        }
    }

    /// Filtered export of an in-memory capture to any writer
    pub fn export_to<W: std::io::Write>(
        &self,
        data: &[u8],
        w: W,
    ) -> Result<ExportStats, AnalysisError> {
        let rules = RuleSet::snapshot(self.rules.as_ref());
        let filter = ExportFilter::new(w, Inspector::new(self.table.clone()), rules);
        let mut engine = PcapEngine::new(filter);
        engine.run(data)?;
        let filter = engine.into_analyzer();
        let stats = filter.stats().clone();
        filter.into_inner()?;
        Ok(stats)
    }

    fn finish_failed(&self, run_id: RunId, msg: &str) {
        self.update(run_id, ResultPatch::Failed(msg.to_owned()));
        self.emit(run_id, RunStatus::Failed, 0, msg);
    }

    fn update(&self, run_id: RunId, patch: ResultPatch) {
        if let Err(e) = self.results.update(run_id, patch) {
            warn!("could not update result of run {}: {}", run_id, e);
        }
    }

    fn emit(&self, run_id: RunId, status: RunStatus, progress: u8, message: &str) {
        self.progress
            .emit(ProgressEvent::new(run_id, status, progress, message));
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic during analysis".to_owned()
    }
}
