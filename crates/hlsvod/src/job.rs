//! Job identity, results and handles for spawned jobs.

use std::path::PathBuf;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ErrorKind;
use crate::hls::events::{JobState, SegmentProgress};

/// One playlist URL to download into one output file.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub playlist_url: String,
    pub output_path: PathBuf,
}

impl DownloadJob {
    pub fn new(playlist_url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            playlist_url: playlist_url.into(),
            output_path: output_path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Output written from the segments that did download
    PartiallySucceeded,
    Failed,
}

/// Single reported outcome of a job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: Uuid,
    /// True for both full and partial success
    pub success: bool,
    pub outcome: JobOutcome,
    pub total_segments: usize,
    pub failed_segments: usize,
    pub error_kind: Option<ErrorKind>,
    /// Human readable summary or diagnostic
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub cleanup_warning: Option<String>,
}

impl JobResult {
    pub fn failed(job_id: Uuid, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            job_id,
            success: false,
            outcome: JobOutcome::Failed,
            total_segments: 0,
            failed_segments: 0,
            error_kind: Some(kind),
            message: message.into(),
            output_path: None,
            cleanup_warning: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.outcome == JobOutcome::PartiallySucceeded
    }
}

/// Latest observable state of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub progress: SegmentProgress,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            state: JobState::Fetching,
            progress: SegmentProgress::default(),
        }
    }
}

/// A job running on the tokio runtime.
pub struct JobHandle {
    id: Uuid,
    token: CancellationToken,
    status: watch::Receiver<JobSnapshot>,
    task: JoinHandle<JobResult>,
}

impl JobHandle {
    pub(crate) fn new(
        id: Uuid,
        token: CancellationToken,
        status: watch::Receiver<JobSnapshot>,
        task: JoinHandle<JobResult>,
    ) -> Self {
        Self {
            id,
            token,
            status,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobSnapshot {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.status.clone()
    }

    /// Request cancellation. Cleanup still runs; `wait` reports `Cancelled`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn wait(self) -> JobResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                JobResult::failed(self.id, ErrorKind::Cancelled, "job task was aborted")
            }
            Err(e) => JobResult::failed(
                self.id,
                ErrorKind::Internal,
                format!("job task panicked: {e}"),
            ),
        }
    }
}
