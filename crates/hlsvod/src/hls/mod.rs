// HLS VOD pipeline: resolve a playlist, download its segments, join them into one file.

pub mod assembler;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod fetcher;
pub mod playlist;
pub mod scheduler;
pub mod staging;
pub mod vod_downloader;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for easier access
pub use assembler::{Concatenator, FfmpegConcatenator, ToolOutput};
pub use config::{AssemblerConfig, PlaylistConfig, SchedulerConfig, VariantSelectionPolicy, VodConfig};
pub use coordinator::JobCoordinator;
pub use events::{JobEvent, JobState, OnJobEvent, SegmentProgress};
pub use fetcher::{ByteRange, ByteStream, FetchedText, HttpTransport, ReqwestTransport};
pub use playlist::{PlaylistRef, PlaylistResolver, ResolvedPlaylist, Segment, VariantStream};
pub use vod_downloader::VodDownloader;
