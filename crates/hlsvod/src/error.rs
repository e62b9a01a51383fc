use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Stable classification of a fatal job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Parse,
    PlaylistEmpty,
    AllSegmentsFailed,
    Concatenation,
    ToolNotFound,
    InvalidInput,
    Io,
    Cancelled,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::PlaylistEmpty => "playlist_empty",
            ErrorKind::AllSegmentsFailed => "all_segments_failed",
            ErrorKind::Concatenation => "concatenation_error",
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Io => "io_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors. Any of these aborts the job.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VodError {
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Playlist parse error: {0}")]
    Parse(String),

    #[error("Playlist is empty: {0}")]
    PlaylistEmpty(String),

    #[error("All {total} segments failed to download")]
    AllSegmentsFailed { total: usize },

    #[error("Concatenation tool failed ({}): {}", describe_exit(.code), last_line(.stderr))]
    Concatenation {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error(
        "Concatenation tool '{}' was not found. Install ffmpeg and make sure it is on PATH, or configure the path to the executable",
        .program.display()
    )]
    ToolNotFound { program: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        source: Arc<std::io::Error>,
    },

    #[error("Download cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VodError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        VodError::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VodError::Network { .. } => ErrorKind::Network,
            VodError::Parse(_) => ErrorKind::Parse,
            VodError::PlaylistEmpty(_) => ErrorKind::PlaylistEmpty,
            VodError::AllSegmentsFailed { .. } => ErrorKind::AllSegmentsFailed,
            VodError::Concatenation { .. } => ErrorKind::Concatenation,
            VodError::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            VodError::InvalidInput(_) => ErrorKind::InvalidInput,
            VodError::Io { .. } => ErrorKind::Io,
            VodError::Cancelled => ErrorKind::Cancelled,
            VodError::Configuration(_) => ErrorKind::Configuration,
            VodError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Full diagnostic text, including captured tool output where available.
    pub fn diagnostic(&self) -> String {
        match self {
            VodError::Concatenation { stdout, stderr, .. } => {
                let mut text = self.to_string();
                if !stdout.trim().is_empty() {
                    text.push_str("\n--- stdout ---\n");
                    text.push_str(stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    text.push_str("\n--- stderr ---\n");
                    text.push_str(stderr.trim_end());
                }
                text
            }
            _ => self.to_string(),
        }
    }
}

impl From<FetchError> for VodError {
    fn from(err: FetchError) -> Self {
        VodError::Network {
            url: err.url().to_string(),
            reason: err.to_string(),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output captured")
}

/// A failed HTTP exchange, as reported by an [`HttpTransport`](crate::hls::fetcher::HttpTransport).
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("error reading response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Connect { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::Request { url, .. } => url,
        }
    }

    /// Client errors (4xx other than 408/429) are permanent, everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::Timeout { .. } | FetchError::Connect { .. } | FetchError::Body { .. } => {
                true
            }
            FetchError::Request { .. } => false,
        }
    }

    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Connect {
                url,
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url,
                reason: err.to_string(),
            }
        } else {
            FetchError::Request {
                url,
                reason: err.to_string(),
            }
        }
    }
}

/// Per-segment failure. Recorded and counted, never fatal on its own.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SegmentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SegmentError::Fetch(err) => err.is_retryable(),
            SegmentError::Write { .. } => false,
        }
    }
}

/// Cleanup could not fully remove the staging area. Logged, never raised.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cleanup of {} incomplete: {reason}", .path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VodError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            VodError::AllSegmentsFailed { total: 3 }.kind(),
            ErrorKind::AllSegmentsFailed
        );
        assert_eq!(
            VodError::ToolNotFound {
                program: PathBuf::from("ffmpeg")
            }
            .kind()
            .as_str(),
            "tool_not_found"
        );
    }

    #[test]
    fn test_tool_not_found_message_tells_operator_to_install() {
        let err = VodError::ToolNotFound {
            program: PathBuf::from("ffmpeg"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'ffmpeg'"));
        assert!(msg.contains("Install ffmpeg"));
    }

    #[test]
    fn test_concatenation_diagnostic_carries_output() {
        let err = VodError::Concatenation {
            code: Some(1),
            stdout: String::new(),
            stderr: "frame=1\nconcat_list.txt: Invalid data found\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Concatenation tool failed (exit code 1): concat_list.txt: Invalid data found"
        );
        let diagnostic = err.diagnostic();
        assert!(diagnostic.contains("--- stderr ---"));
        assert!(diagnostic.contains("frame=1"));
        assert!(!diagnostic.contains("--- stdout ---"));
    }

    #[test]
    fn test_fetch_error_retry_classification() {
        let status = |status| FetchError::Status {
            url: "http://a/b".to_string(),
            status,
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(
            FetchError::Timeout {
                url: "http://a/b".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_fetch_error_becomes_network_error() {
        let err: VodError = FetchError::Status {
            url: "http://host/master.m3u8".to_string(),
            status: 403,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("HTTP 403"));
    }
}
