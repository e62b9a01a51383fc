use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
///
/// Settings left unset fall back to the `--config` file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HLS (M3U8) VOD downloader",
    long_about = "Downloads every segment of a static HLS playlist concurrently and joins them\n\
                  into a single file with ffmpeg (stream copy, no re-encoding).\n\
                  \n\
                  Master playlists are resolved to one variant (see --variant). Segments that\n\
                  fail to download are skipped and reported; the job only fails when none succeed."
)]
pub struct CliArgs {
    /// Playlist URL (http or https)
    #[arg(required = true, help = "URL of the master or media playlist")]
    pub url: String,

    #[arg(
        short,
        long,
        help = "Output file path (overrides --output-dir and --name)"
    )]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Directory for the output file (default: current directory)")]
    pub output_dir: Option<PathBuf>,

    #[arg(
        short = 'n',
        long = "name",
        help = "Output file name; '.mp4' is appended when it has no extension (default: derived from the URL)"
    )]
    pub name: Option<String>,

    /// Number of concurrent segment downloads
    #[arg(long, help = "Maximum number of concurrent segment downloads (default: 10)")]
    pub concurrency: Option<usize>,

    #[arg(
        long,
        help = "Retry attempts for failed segment downloads; 4xx responses are not retried (default: 0)"
    )]
    pub segment_retries: Option<u32>,

    #[arg(long, help = "Timeout for each playlist request in seconds (default: 15)")]
    pub playlist_timeout: Option<u64>,

    #[arg(long, help = "Timeout for each segment download in seconds (default: 20)")]
    pub segment_timeout: Option<u64>,

    #[arg(long, help = "Connection timeout in seconds (default: 10)")]
    pub connect_timeout: Option<u64>,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(long, help = "User-Agent sent with every request")]
    pub user_agent: Option<String>,

    #[arg(
        long,
        help = "Variant selection for master playlists: first, highest, lowest, <W>x<H>, bw:<bits/s> or contains:<text> (default: first)",
        value_name = "POLICY"
    )]
    pub variant: Option<String>,

    #[arg(long = "ffmpeg", help = "Path to the ffmpeg executable (default: ffmpeg on PATH)", value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    #[arg(long, help = "Parent directory for segment staging directories (default: system temp dir)", value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    #[arg(long, help = "Keep the staging directory after the job finishes (debugging aid)")]
    pub keep_temp: bool,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        help = "Proxy type (default: http)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: Option<String>,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,

    #[arg(long, help = "Accept invalid TLS certificates")]
    pub insecure: bool,

    /// Show progress bars for operations
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show a segment progress bar"
    )]
    pub show_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[arg(short, long, help = "TOML file with default settings", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = CliArgs::try_parse_from([
            "hlsvod",
            "https://host/vod/index.m3u8",
            "-o",
            "out/video.mp4",
            "--concurrency",
            "4",
            "-H",
            "Cookie: a=b",
            "-H",
            "X-Token: t",
            "--variant",
            "highest",
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--proxy-type",
            "socks5",
            "-P",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.url, "https://host/vod/index.m3u8");
        assert_eq!(args.output, Some(PathBuf::from("out/video.mp4")));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.variant.as_deref(), Some("highest"));
        assert_eq!(args.proxy_type.as_deref(), Some("socks5"));
        assert!(args.show_progress);
        assert!(args.verbose);
        assert!(!args.keep_temp);
        assert!(args.segment_retries.is_none());
    }

    #[test]
    fn test_url_is_required() {
        assert!(CliArgs::try_parse_from(["hlsvod"]).is_err());
    }

    #[test]
    fn test_unknown_proxy_type_is_rejected() {
        let parsed = CliArgs::try_parse_from([
            "hlsvod",
            "https://host/a.m3u8",
            "--proxy-type",
            "ftp",
        ]);
        assert!(parsed.is_err());
    }
}
