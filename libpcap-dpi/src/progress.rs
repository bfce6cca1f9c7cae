//! Progress notifications
//!
//! Runs report progress on a bounded channel. Sending never blocks: when the
//! channel is full or nobody listens, the event is dropped.

use crate::result::{RunId, RunStatus};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

/// Name of the progress event, for transports that need one
pub const PROGRESS_EVENT: &str = "analysis:progress";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub status: RunStatus,
    /// 0 to 100
    pub progress: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(run_id: RunId, status: RunStatus, progress: u8, message: S) -> Self {
        ProgressEvent {
            run_id,
            status,
            progress: progress.min(100),
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        PROGRESS_EVENT
    }
}

/// Sending side of the progress channel. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct ProgressSender {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender dropping every event
    pub fn disabled() -> Self {
        ProgressSender::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return,
        };
        match tx.try_send(event) {
            Ok(()) => (),
            Err(TrySendError::Full(ev)) => {
                trace!("progress channel full, dropping {}% event", ev.progress)
            }
            Err(TrySendError::Disconnected(_)) => trace!("no progress listener"),
        }
    }
}

/// Create a bounded progress channel
pub fn progress_channel(capacity: usize) -> (ProgressSender, Receiver<ProgressEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (ProgressSender { tx: Some(tx) }, rx)
}

/// Decide when a run has made enough progress to notify
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    total: usize,
    step: u8,
    next: u8,
}

impl ProgressTracker {
    pub fn new(total: usize, step_percent: u8) -> Self {
        let step = step_percent.clamp(1, 100);
        ProgressTracker {
            total,
            step,
            next: step,
        }
    }

    /// Percentage to report after `done` records, if a step was crossed
    ///
    /// 100% is never reported here: completion has its own notification.
    pub fn update(&mut self, done: usize) -> Option<u8> {
        if self.total == 0 || self.next >= 100 {
            return None;
        }
        let percent = (done.saturating_mul(100) / self.total).min(100) as u8;
        if percent < self.next || percent >= 100 {
            return None;
        }
        self.next = (percent / self.step + 1).saturating_mul(self.step);
        Some(percent)
    }
}
