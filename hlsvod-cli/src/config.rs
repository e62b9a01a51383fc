use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hlsvod_engine::{
    DownloaderConfig, ProxyAuth, ProxyConfig, ProxyType, VariantSelectionPolicy, VodConfig,
    VodConfigBuilder,
};
use serde::Deserialize;
use tracing::info;

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::utils::{parse_and_add_header, parse_headers};

/// Defaults loaded from `--config`. Every field is optional; command-line
/// flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub segment_retries: Option<u32>,
    /// Base backoff between segment attempts, in milliseconds
    pub segment_retry_delay_ms: Option<u64>,
    pub playlist_timeout: Option<u64>,
    pub segment_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub variant: Option<String>,
    pub ffmpeg: Option<PathBuf>,
    pub ffmpeg_args: Vec<String>,
    pub temp_dir: Option<PathBuf>,
    pub keep_temp: bool,
    pub proxy: Option<String>,
    pub proxy_type: Option<String>,
    pub proxy_user: Option<String>,
    pub proxy_pass: Option<String>,
    pub no_proxy: bool,
    pub insecure: bool,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| AppError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Merge command-line arguments over file defaults into the engine configuration.
pub fn build_vod_config(args: &CliArgs, file: &FileConfig) -> Result<VodConfig, AppError> {
    let mut builder = VodConfigBuilder::new().with_base_config(build_downloader_config(args, file)?);

    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        builder = builder.download_concurrency(concurrency);
    }
    if let Some(retries) = args.segment_retries.or(file.segment_retries) {
        builder = builder.segment_retry_count(retries);
    }
    if let Some(delay) = file.segment_retry_delay_ms {
        builder = builder.segment_retry_delay(Duration::from_millis(delay));
    }
    if let Some(secs) = args.playlist_timeout.or(file.playlist_timeout) {
        builder = builder.playlist_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.segment_timeout.or(file.segment_timeout) {
        builder = builder.segment_timeout(Duration::from_secs(secs));
    }
    if let Some(policy) = args.variant.as_deref().or(file.variant.as_deref()) {
        builder = builder.variant_selection_policy(VariantSelectionPolicy::from_str(policy)?);
    }
    if let Some(ffmpeg) = args.ffmpeg.as_ref().or(file.ffmpeg.as_ref()) {
        builder = builder.ffmpeg_path(ffmpeg.clone());
    }
    if !file.ffmpeg_args.is_empty() {
        builder = builder.ffmpeg_args(file.ffmpeg_args.clone());
    }
    if let Some(dir) = args.temp_dir.as_ref().or(file.temp_dir.as_ref()) {
        builder = builder.temp_root(dir.clone());
    }

    Ok(builder
        .keep_staging(args.keep_temp || file.keep_temp)
        .build_config()?)
}

fn build_downloader_config(args: &CliArgs, file: &FileConfig) -> Result<DownloaderConfig, AppError> {
    let mut headers = DownloaderConfig::get_default_headers();
    for (name, value) in &file.headers {
        parse_and_add_header(&mut headers, &format!("{name}: {value}"));
    }
    headers.extend(parse_headers(&args.headers));

    let mut builder = DownloaderConfig::builder()
        .with_headers(headers)
        .danger_accept_invalid_certs(args.insecure || file.insecure);

    if let Some(secs) = args.connect_timeout.or(file.connect_timeout) {
        builder = builder.with_connect_timeout(Duration::from_secs(secs));
    }
    if let Some(user_agent) = args.user_agent.as_ref().or(file.user_agent.as_ref()) {
        builder = builder.with_user_agent(user_agent.clone());
    }

    // Handle proxy configuration
    if args.no_proxy || file.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        builder = builder.with_system_proxy(false);
    } else if let Some(proxy_url) = args.proxy.as_ref().or(file.proxy.as_ref()) {
        let proxy_type = match args.proxy_type.as_deref().or(file.proxy_type.as_deref()) {
            Some(value) => ProxyType::from_str(value)?,
            None => ProxyType::Http,
        };

        // Authentication only when both username and password are provided
        let username = args.proxy_user.as_ref().or(file.proxy_user.as_ref());
        let password = args.proxy_pass.as_ref().or(file.proxy_pass.as_ref());
        let auth = if let (Some(username), Some(password)) = (username, password) {
            Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            })
        } else {
            None
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = %proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration for downloads"
        );

        builder = builder.with_proxy(ProxyConfig {
            url: proxy_url.clone(),
            proxy_type,
            auth,
        });
    } else {
        builder = builder.with_system_proxy(true);
    }

    Ok(builder.build())
}
