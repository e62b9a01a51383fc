use std::fmt;
use std::sync::Arc;

use crate::ErrorKind;

/// Lifecycle of one download job.
///
/// `Fetching → Resolving → Downloading → Assembling → Cleaning → Done`; a failing
/// job passes through `Cleaning` before settling in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Fetching,
    Resolving,
    Downloading,
    Assembling,
    Cleaning,
    Done,
    Failed(ErrorKind),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Fetching => "fetching",
            JobState::Resolving => "resolving",
            JobState::Downloading => "downloading",
            JobState::Assembling => "assembling",
            JobState::Cleaning => "cleaning",
            JobState::Done => "done",
            JobState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(kind) => write!(f, "failed ({kind})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentProgress {
    /// Finished segments, successful or not
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// Bytes written to the staging area so far
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub enum JobEvent {
    StateChanged(JobState),
    PlaylistResolved {
        media_url: String,
        segments: usize,
        /// URI of the selected variant when the input was a master playlist
        variant: Option<String>,
    },
    SegmentFinished {
        index: usize,
        ok: bool,
    },
    Progress(SegmentProgress),
}

/// A callback for job events. Called inline from the job task, keep it cheap.
pub type OnJobEvent = Arc<dyn Fn(JobEvent) + Send + Sync>;

pub(crate) fn emit(on_event: Option<&OnJobEvent>, event: JobEvent) {
    if let Some(callback) = on_event {
        callback(event);
    }
}
