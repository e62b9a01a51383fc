// Job coordinator: drives one job through fetch, resolve, download, assemble and cleanup.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::hls::assembler::{Assembler, Concatenator, partial_path, remove_partial};
use crate::hls::config::VodConfig;
use crate::hls::events::{JobEvent, JobState, OnJobEvent, emit};
use crate::hls::fetcher::HttpTransport;
use crate::hls::playlist::{PlaylistRef, PlaylistResolver};
use crate::hls::scheduler::{DownloadReport, SegmentJob, SegmentScheduler};
use crate::hls::staging::StagingArea;
use crate::job::{DownloadJob, JobOutcome, JobResult};
use crate::{ErrorKind, VodError};

/// Runs jobs against shared, read-only components. Cheap to clone.
#[derive(Clone)]
pub struct JobCoordinator {
    config: Arc<VodConfig>,
    transport: Arc<dyn HttpTransport>,
    concatenator: Arc<dyn Concatenator>,
}

/// Per-run bookkeeping the failure path needs
struct RunState<'a> {
    state: JobState,
    total: usize,
    failed: usize,
    on_event: Option<&'a OnJobEvent>,
}

impl RunState<'_> {
    fn enter(&mut self, state: JobState) {
        debug!(from = %self.state, to = %state, "Job state change");
        self.state = state;
        emit(self.on_event, JobEvent::StateChanged(state));
    }
}

impl JobCoordinator {
    pub fn new(
        config: Arc<VodConfig>,
        transport: Arc<dyn HttpTransport>,
        concatenator: Arc<dyn Concatenator>,
    ) -> Self {
        Self {
            config,
            transport,
            concatenator,
        }
    }

    /// Run `job` to a terminal state. Never panics on bad input; every failure
    /// is reported through the returned result.
    pub async fn run(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        on_event: Option<OnJobEvent>,
    ) -> JobResult {
        let span = info_span!("job", id = %job.id);
        self.execute(job, token, on_event.as_ref())
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        on_event: Option<&OnJobEvent>,
    ) -> JobResult {
        let mut run = RunState {
            state: JobState::Fetching,
            total: 0,
            failed: 0,
            on_event,
        };
        info!(url = %job.playlist_url, output = %job.output_path.display(), "Starting download job");
        emit(on_event, JobEvent::StateChanged(JobState::Fetching));

        let staging = match StagingArea::for_output(&self.config.assembler.temp_root, &job.output_path)
        {
            Ok(staging) => staging,
            Err(e) => {
                // Nothing was created yet, cleanup is a no-op
                run.enter(JobState::Cleaning);
                return self.finish_failed(job, &mut run, e, None);
            }
        };

        let outcome = self.pipeline(job, &staging, token, &mut run).await;

        if outcome.is_err() && run.state == JobState::Assembling {
            remove_partial(&partial_path(&job.output_path)).await;
        }

        run.enter(JobState::Cleaning);
        let cleanup_warning = self.cleanup(&staging, run.total).await;

        match outcome {
            Ok(report) => self.finish_done(job, &mut run, report, cleanup_warning),
            Err(e) => self.finish_failed(job, &mut run, e, cleanup_warning),
        }
    }

    async fn pipeline(
        &self,
        job: &DownloadJob,
        staging: &StagingArea,
        token: &CancellationToken,
        run: &mut RunState<'_>,
    ) -> Result<DownloadReport, VodError> {
        let playlist = PlaylistRef::parse(&job.playlist_url)?;
        staging.create().await?;

        let resolver = PlaylistResolver::new(self.transport.clone(), self.config.playlist.clone());
        let fetched = cancellable(token, resolver.fetch(&playlist)).await?;

        run.enter(JobState::Resolving);
        let resolved = cancellable(token, resolver.resolve(&playlist, fetched)).await?;
        run.total = resolved.segments.len();
        emit(
            run.on_event,
            JobEvent::PlaylistResolved {
                media_url: resolved.media_url.to_string(),
                segments: run.total,
                variant: resolved.variant.as_ref().map(|v| v.uri.clone()),
            },
        );

        run.enter(JobState::Downloading);
        let jobs: Vec<SegmentJob> = resolved
            .segments
            .into_iter()
            .map(|segment| SegmentJob {
                index: segment.index,
                destination: staging.segment_path(segment.index, run.total),
                url: segment.url.into(),
                byte_range: segment.byte_range,
            })
            .collect();
        let scheduler = SegmentScheduler::new(
            self.transport.clone(),
            self.config.scheduler.clone(),
            playlist.as_str(),
        );
        let report = match scheduler.run(jobs, token, run.on_event).await {
            Ok(report) => report,
            Err(e) => {
                if let VodError::AllSegmentsFailed { total } = &e {
                    run.failed = *total;
                }
                return Err(e);
            }
        };
        run.failed = report.failed.len();

        run.enter(JobState::Assembling);
        let assembler = Assembler::new(self.concatenator.clone());
        cancellable(
            token,
            assembler.assemble(staging, &report.staged, &job.output_path),
        )
        .await?;

        Ok(report)
    }

    async fn cleanup(&self, staging: &StagingArea, total: usize) -> Option<String> {
        if self.config.assembler.keep_staging {
            info!(dir = %staging.dir().display(), "Keeping staging directory as configured");
            return None;
        }
        match staging.cleanup(total).await {
            Ok(()) => None,
            Err(warning) => {
                warn!(dir = %warning.path.display(), reason = %warning.reason, "Staging cleanup incomplete");
                Some(warning.to_string())
            }
        }
    }

    fn finish_done(
        &self,
        job: &DownloadJob,
        run: &mut RunState<'_>,
        report: DownloadReport,
        cleanup_warning: Option<String>,
    ) -> JobResult {
        run.enter(JobState::Done);
        let failed = report.failed.len();
        let (outcome, message) = if failed == 0 {
            info!(segments = report.total, bytes = report.bytes, "Job finished");
            (
                JobOutcome::Succeeded,
                format!("downloaded and assembled {} segments", report.total),
            )
        } else {
            warn!(
                failed,
                total = report.total,
                "Job finished with missing segments, output is incomplete"
            );
            (
                JobOutcome::PartiallySucceeded,
                format!(
                    "assembled {} of {} segments, {failed} failed to download",
                    report.staged.len(),
                    report.total
                ),
            )
        };

        JobResult {
            job_id: job.id,
            success: true,
            outcome,
            total_segments: report.total,
            failed_segments: failed,
            error_kind: None,
            message,
            output_path: Some(job.output_path.clone()),
            cleanup_warning,
        }
    }

    fn finish_failed(
        &self,
        job: &DownloadJob,
        run: &mut RunState<'_>,
        err: VodError,
        cleanup_warning: Option<String>,
    ) -> JobResult {
        let kind = err.kind();
        run.enter(JobState::Failed(kind));
        if kind == ErrorKind::Cancelled {
            warn!("Job cancelled");
        } else {
            error!(kind = %kind, error = %err, "Job failed");
        }

        JobResult {
            total_segments: run.total,
            failed_segments: run.failed,
            cleanup_warning,
            ..JobResult::failed(job.id, kind, err.diagnostic())
        }
    }
}

/// Race `fut` against cancellation of `token`.
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, VodError>>,
) -> Result<T, VodError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(VodError::Cancelled),
        result = fut => result,
    }
}
