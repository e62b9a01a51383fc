//! # hlsvod engine
//!
//! Downloads a static (VOD) HLS playlist into a single media file.
//!
//! A job fetches the playlist, follows a master playlist to one variant,
//! downloads every segment concurrently into a job-scoped staging directory,
//! tolerates individual segment failures, and joins the segments in playlist
//! order with `ffmpeg -f concat -c copy`. The staging directory is removed on
//! every exit path.
//!
//! ```no_run
//! use hlsvod_engine::{VodConfig, VodDownloader};
//!
//! # async fn demo() -> Result<(), hlsvod_engine::VodError> {
//! let downloader = VodDownloader::new(VodConfig::default())?;
//! let result = downloader
//!     .run("https://example.com/vod/master.m3u8", "video.mp4")
//!     .await;
//! if !result.success {
//!     eprintln!("{}: {}", result.error_kind.map(|k| k.as_str()).unwrap_or("error"), result.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod job;
pub mod protocol_builder;
pub mod proxy;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use downloader::create_client;
pub use error::{CleanupWarning, ErrorKind, FetchError, SegmentError, VodError};
pub use hls::{
    JobEvent, JobState, OnJobEvent, SegmentProgress, VariantSelectionPolicy, VodConfig,
    VodDownloader,
};
pub use job::{DownloadJob, JobHandle, JobOutcome, JobResult, JobSnapshot};
pub use protocol_builder::VodConfigBuilder;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
