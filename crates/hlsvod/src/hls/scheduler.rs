// Segment scheduler: bounded concurrent download of segments into the staging area.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hls::config::SchedulerConfig;
use crate::hls::events::{JobEvent, OnJobEvent, SegmentProgress, emit};
use crate::hls::fetcher::{ByteRange, HttpTransport};
use crate::{SegmentError, VodError};

#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub index: usize,
    pub url: String,
    pub byte_range: Option<ByteRange>,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StagedSegment {
    pub index: usize,
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct DownloadReport {
    /// Successful segments, ascending by index
    pub staged: Vec<StagedSegment>,
    pub failed: Vec<(usize, SegmentError)>,
    pub total: usize,
    pub bytes: u64,
}

pub struct SegmentScheduler {
    transport: Arc<dyn HttpTransport>,
    config: SchedulerConfig,
    referer: String,
}

impl SegmentScheduler {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: SchedulerConfig,
        referer: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            referer: referer.into(),
        }
    }

    /// Download every job, at most `download_concurrency` at a time.
    ///
    /// Individual failures are collected in the report. Only cancellation or
    /// the failure of every segment is an error.
    pub async fn run(
        &self,
        jobs: Vec<SegmentJob>,
        token: &CancellationToken,
        on_event: Option<&OnJobEvent>,
    ) -> Result<DownloadReport, VodError> {
        let total = jobs.len();
        let concurrency = self.config.download_concurrency.max(1);
        info!(total, concurrency, "Downloading segments");

        let mut pending = jobs.into_iter();
        // Completion order is irrelevant, assembly sorts by index
        let mut in_flight = FuturesUnordered::new();
        let mut progress = SegmentProgress {
            total,
            ..Default::default()
        };
        let mut staged = Vec::with_capacity(total);
        let mut failed = Vec::new();

        loop {
            while in_flight.len() < concurrency {
                match pending.next() {
                    Some(job) => in_flight.push(self.download(job)),
                    None => break,
                }
            }
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    info!(
                        completed = progress.completed,
                        in_flight = in_flight.len(),
                        "Cancellation requested, abandoning segment downloads"
                    );
                    return Err(VodError::Cancelled);
                }

                Some((job, result)) = in_flight.next() => {
                    progress.completed += 1;
                    let ok = result.is_ok();
                    match result {
                        Ok(bytes) => {
                            debug!(index = job.index, bytes, "Segment downloaded");
                            progress.bytes += bytes;
                            staged.push(StagedSegment {
                                index: job.index,
                                path: job.destination,
                                bytes,
                            });
                        }
                        Err(e) => {
                            warn!(index = job.index, url = %job.url, error = %e, "Segment download failed, skipping it");
                            progress.failed += 1;
                            failed.push((job.index, e));
                        }
                    }
                    emit(on_event, JobEvent::SegmentFinished { index: job.index, ok });
                    emit(on_event, JobEvent::Progress(progress));
                }
            }
        }

        if staged.is_empty() {
            error!(total, "Every segment failed to download");
            return Err(VodError::AllSegmentsFailed { total });
        }

        staged.sort_by_key(|segment| segment.index);
        failed.sort_by_key(|(index, _)| *index);
        info!(
            downloaded = staged.len(),
            failed = failed.len(),
            bytes = progress.bytes,
            "Segment downloads finished"
        );

        Ok(DownloadReport {
            staged,
            failed,
            total,
            bytes: progress.bytes,
        })
    }

    async fn download(&self, job: SegmentJob) -> (SegmentJob, Result<u64, SegmentError>) {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_to_file(&job).await {
                Ok(bytes) => return (job, Ok(bytes)),
                Err(e) if attempt < self.config.max_segment_retries && e.is_retryable() => {
                    let delay = self
                        .config
                        .segment_retry_delay_base
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    attempt += 1;
                    debug!(index = job.index, attempt, delay = ?delay, error = %e, "Retrying segment");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    // Never hand a truncated file to the assembler
                    match tokio::fs::remove_file(&job.destination).await {
                        Err(remove_err) if remove_err.kind() != std::io::ErrorKind::NotFound => {
                            debug!(path = %job.destination.display(), error = %remove_err, "Could not remove partial segment");
                        }
                        _ => {}
                    }
                    return (job, Err(e));
                }
            }
        }
    }

    async fn fetch_to_file(&self, job: &SegmentJob) -> Result<u64, SegmentError> {
        let mut stream = self
            .transport
            .open_stream(
                &job.url,
                Some(&self.referer),
                job.byte_range,
                self.config.segment_timeout,
            )
            .await?;

        let write_error = |source| SegmentError::Write {
            path: job.destination.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&job.destination)
            .await
            .map_err(write_error)?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_error)?;

        Ok(written)
    }
}
