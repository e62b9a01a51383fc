use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{DownloaderConfig, VodError};

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct VodConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist: PlaylistConfig,
    pub scheduler: SchedulerConfig,
    pub assembler: AssemblerConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    /// Applies to the master and the media playlist fetch separately
    pub fetch_timeout: Duration,
    pub variant_selection_policy: VariantSelectionPolicy,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            variant_selection_policy: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VariantSelectionPolicy {
    /// First variant in playlist order
    #[default]
    First,
    HighestBandwidth,
    LowestBandwidth,
    ClosestToBandwidth(u64),
    MatchingResolution {
        width: u64,
        height: u64,
    },
    /// First variant whose URI contains the text, e.g. "720p"
    UriContains(String),
}

impl FromStr for VariantSelectionPolicy {
    type Err = VodError;

    /// Accepts `first`, `highest`, `lowest`, `WxH`, `bw:<n>` and `contains:<text>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let invalid = || {
            VodError::Configuration(format!(
                "invalid variant policy '{value}' (expected first, highest, lowest, WxH, bw:<n> or contains:<text>)"
            ))
        };

        match value.to_ascii_lowercase().as_str() {
            "first" => return Ok(VariantSelectionPolicy::First),
            "highest" => return Ok(VariantSelectionPolicy::HighestBandwidth),
            "lowest" => return Ok(VariantSelectionPolicy::LowestBandwidth),
            _ => {}
        }

        if let Some(text) = value.strip_prefix("contains:") {
            if text.is_empty() {
                return Err(invalid());
            }
            return Ok(VariantSelectionPolicy::UriContains(text.to_string()));
        }

        if let Some(bandwidth) = value.strip_prefix("bw:") {
            return bandwidth
                .parse()
                .map(VariantSelectionPolicy::ClosestToBandwidth)
                .map_err(|_| invalid());
        }

        if let Some((width, height)) = value.split_once(['x', 'X']) {
            let width = width.parse().map_err(|_| invalid())?;
            let height = height.parse().map_err(|_| invalid())?;
            return Ok(VariantSelectionPolicy::MatchingResolution { width, height });
        }

        Err(invalid())
    }
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub download_concurrency: usize, // Max concurrent segment downloads
    pub segment_timeout: Duration,
    /// Extra attempts after the first failure. 0 disables retrying.
    pub max_segment_retries: u32,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 10,
            segment_timeout: Duration::from_secs(20),
            max_segment_retries: 0,
            segment_retry_delay_base: Duration::from_millis(500),
        }
    }
}

// --- Assembler Configuration ---
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Program name resolved through PATH, or an explicit path
    pub ffmpeg_path: PathBuf,
    /// Inserted before `-c copy`
    pub extra_args: Vec<String>,
    /// Parent of the per-job staging directories
    pub temp_root: PathBuf,
    /// Leave the staging directory in place after the job (debugging)
    pub keep_staging: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            extra_args: Vec::new(),
            temp_root: std::env::temp_dir(),
            keep_staging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VodConfig::default();
        assert_eq!(config.playlist.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.scheduler.segment_timeout, Duration::from_secs(20));
        assert_eq!(config.scheduler.download_concurrency, 10);
        assert_eq!(config.scheduler.max_segment_retries, 0);
        assert_eq!(
            config.playlist.variant_selection_policy,
            VariantSelectionPolicy::First
        );
        assert_eq!(config.assembler.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "Highest".parse::<VariantSelectionPolicy>().unwrap(),
            VariantSelectionPolicy::HighestBandwidth
        );
        assert_eq!(
            "1280x720".parse::<VariantSelectionPolicy>().unwrap(),
            VariantSelectionPolicy::MatchingResolution {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(
            "bw:800000".parse::<VariantSelectionPolicy>().unwrap(),
            VariantSelectionPolicy::ClosestToBandwidth(800_000)
        );
        assert_eq!(
            "contains:240p".parse::<VariantSelectionPolicy>().unwrap(),
            VariantSelectionPolicy::UriContains("240p".to_string())
        );
        assert!("contains:".parse::<VariantSelectionPolicy>().is_err());
        assert!("bw:lots".parse::<VariantSelectionPolicy>().is_err());
        assert!("best".parse::<VariantSelectionPolicy>().is_err());
    }
}
