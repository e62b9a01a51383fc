use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::hls::assembler::{Concatenator, FfmpegConcatenator};
use crate::hls::coordinator::JobCoordinator;
use crate::hls::events::{JobEvent, OnJobEvent};
use crate::hls::fetcher::{HttpTransport, ReqwestTransport};
use crate::job::{DownloadJob, JobHandle, JobResult, JobSnapshot};
use crate::{VodConfig, VodError, create_client};

/// Entry point: downloads a VOD playlist into a single file.
///
/// One instance shares its HTTP client across all jobs it runs; jobs running
/// concurrently only need distinct output file names.
pub struct VodDownloader {
    config: Arc<VodConfig>,
    transport: Arc<dyn HttpTransport>,
    concatenator: Arc<dyn Concatenator>,
}

impl VodDownloader {
    pub fn new(config: VodConfig) -> Result<Self, VodError> {
        let client = create_client(&config.base)?;
        let concatenator = FfmpegConcatenator::from_config(&config.assembler);
        Ok(Self::with_components(
            config,
            Arc::new(ReqwestTransport::new(client)),
            Arc::new(concatenator),
        ))
    }

    /// Use caller supplied transport and concatenation tool
    pub fn with_components(
        config: VodConfig,
        transport: Arc<dyn HttpTransport>,
        concatenator: Arc<dyn Concatenator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            concatenator,
        }
    }

    pub fn config(&self) -> &VodConfig {
        &self.config
    }

    fn coordinator(&self) -> JobCoordinator {
        JobCoordinator::new(
            self.config.clone(),
            self.transport.clone(),
            self.concatenator.clone(),
        )
    }

    pub async fn run(&self, playlist_url: &str, output_path: impl Into<PathBuf>) -> JobResult {
        let job = DownloadJob::new(playlist_url, output_path);
        self.run_with(&job, &CancellationToken::new(), None).await
    }

    pub async fn run_with(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        on_event: Option<OnJobEvent>,
    ) -> JobResult {
        self.coordinator().run(job, token, on_event).await
    }

    /// Run the job on the current tokio runtime and return a handle to it.
    pub fn spawn(
        &self,
        playlist_url: &str,
        output_path: impl Into<PathBuf>,
        on_event: Option<OnJobEvent>,
    ) -> JobHandle {
        let job = DownloadJob::new(playlist_url, output_path);
        let id = job.id;
        let token = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobSnapshot::default());

        let forward: OnJobEvent = Arc::new(move |event: JobEvent| {
            match &event {
                JobEvent::StateChanged(state) => {
                    status_tx.send_modify(|snapshot| snapshot.state = *state)
                }
                JobEvent::Progress(progress) => {
                    status_tx.send_modify(|snapshot| snapshot.progress = *progress)
                }
                _ => {}
            }
            if let Some(callback) = &on_event {
                callback(event);
            }
        });

        let coordinator = self.coordinator();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            coordinator.run(&job, &task_token, Some(forward)).await
        });

        JobHandle::new(id, token, status_rx, task)
    }
}
