//! # VOD downloader builder
//!
//! Fluent API over [`VodConfig`], ending in a ready [`VodDownloader`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::hls::config::{VariantSelectionPolicy, VodConfig};
use crate::{DownloaderConfig, VodDownloader, VodError, proxy::ProxyConfig};

pub struct VodConfigBuilder {
    config: VodConfig,
}

impl VodConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: VodConfig::default(),
        }
    }

    pub fn with_base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    // --- Base DownloaderConfig methods ---

    /// Set user agent for HTTP requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.base.connect_timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.config.base.follow_redirects = follow;
        self
    }

    /// Replace HTTP headers
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.headers = headers;
        self
    }

    /// Add a single HTTP header. Invalid names or values are ignored.
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.config.base.headers.insert(name, value);
        }
        self
    }

    /// Explicit proxy; disables the system proxy
    pub fn proxy(mut self, proxy_config: ProxyConfig) -> Self {
        self.config.base.proxy = Some(proxy_config);
        self.config.base.use_system_proxy = false;
        self
    }

    pub fn use_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.config.base.use_system_proxy = use_system_proxy;
        self
    }

    /// Set whether to accept invalid TLS certificates (use with caution)
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.base.danger_accept_invalid_certs = accept;
        self
    }

    // --- PlaylistConfig methods ---

    /// Timeout for each playlist fetch
    pub fn playlist_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist.fetch_timeout = timeout;
        self
    }

    pub fn variant_selection_policy(mut self, policy: VariantSelectionPolicy) -> Self {
        self.config.playlist.variant_selection_policy = policy;
        self
    }

    // --- SchedulerConfig methods ---

    /// Set maximum concurrent segment downloads.
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.config.scheduler.download_concurrency = concurrency;
        self
    }

    /// Set timeout for downloading a single segment.
    pub fn segment_timeout(mut self, timeout: Duration) -> Self {
        self.config.scheduler.segment_timeout = timeout;
        self
    }

    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.scheduler.max_segment_retries = retries;
        self
    }

    /// Base delay for exponential backoff between segment attempts
    pub fn segment_retry_delay(mut self, delay: Duration) -> Self {
        self.config.scheduler.segment_retry_delay_base = delay;
        self
    }

    // --- AssemblerConfig methods ---

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.assembler.ffmpeg_path = path.into();
        self
    }

    pub fn ffmpeg_args(mut self, args: Vec<String>) -> Self {
        self.config.assembler.extra_args = args;
        self
    }

    /// Parent directory for staging directories
    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.assembler.temp_root = dir.into();
        self
    }

    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.config.assembler.keep_staging = keep;
        self
    }

    /// Access the raw configuration for more advanced customization
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut VodConfig),
    {
        f(&mut self.config);
        self
    }

    /// Get a copy of the current configuration
    pub fn get_config(&self) -> VodConfig {
        self.config.clone()
    }

    pub fn build_config(self) -> Result<VodConfig, VodError> {
        if self.config.scheduler.download_concurrency == 0 {
            return Err(VodError::Configuration(
                "download concurrency must be at least 1".to_string(),
            ));
        }
        if self.config.assembler.ffmpeg_path.as_os_str().is_empty() {
            return Err(VodError::Configuration(
                "ffmpeg path must not be empty".to_string(),
            ));
        }
        Ok(self.config)
    }

    pub fn build(self) -> Result<VodDownloader, VodError> {
        VodDownloader::new(self.build_config()?)
    }
}

impl Default for VodConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
