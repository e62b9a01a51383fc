use std::path::{Path, PathBuf};

use crate::error::AppError;

const DEFAULT_EXTENSION: &str = "mp4";
const MAX_NAME_LEN: usize = 30;

/// Derives an output name from the last path segment of a playlist URL.
///
/// The extension is dropped, characters outside `[A-Za-z0-9_-]` become `_`
/// and the result is truncated to 30 characters.
///
/// ```ignore
/// let name = name_from_url("https://example.com/vod/episode-1.m3u8")?;
/// assert_eq!(name, "episode-1");
/// ```
pub fn name_from_url(url_str: &str) -> Result<String, AppError> {
    let url = url_str
        .parse::<url::Url>()
        .map_err(|e| AppError::InvalidInput(format!("{url_str}: {e}")))?;

    let file_name = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default();

    let stem = match file_name.rfind('.') {
        Some(pos) => &file_name[..pos],
        None => file_name,
    };

    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    name.truncate(MAX_NAME_LEN);

    if name.is_empty() {
        name.push_str("video");
    }
    Ok(name)
}

/// `output` wins when given; otherwise `<output_dir>/<name>.mp4`, with the
/// name taken from the URL when not supplied.
pub fn resolve_output_path(
    output: Option<&Path>,
    output_dir: Option<&Path>,
    name: Option<&str>,
    url_str: &str,
) -> Result<PathBuf, AppError> {
    if let Some(output) = output {
        return Ok(output.to_path_buf());
    }

    let name = match name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        Some(_) => {
            return Err(AppError::InvalidInput(
                "output name must not be empty".to_string(),
            ));
        }
        None => name_from_url(url_str)?,
    };

    let mut file_name = PathBuf::from(name);
    if file_name.extension().is_none() {
        file_name.set_extension(DEFAULT_EXTENSION);
    }

    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    Ok(dir.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url_drops_extension_and_query() {
        assert_eq!(
            name_from_url("https://cdn.example.com/vod/episode-1.m3u8?token=abc").unwrap(),
            "episode-1"
        );
    }

    #[test]
    fn test_name_from_url_sanitizes_and_truncates() {
        assert_eq!(
            name_from_url("https://h/a%20b.c.m3u8").unwrap(),
            "a_20b_c"
        );
        let long = format!("https://h/{}.m3u8", "x".repeat(50));
        assert_eq!(name_from_url(&long).unwrap().len(), 30);
    }

    #[test]
    fn test_name_from_url_falls_back_when_path_is_empty() {
        assert_eq!(name_from_url("https://h/").unwrap(), "video");
    }

    #[test]
    fn test_name_from_url_rejects_garbage() {
        assert!(matches!(
            name_from_url("not a url"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_explicit_output_wins() {
        let path = resolve_output_path(
            Some(Path::new("/tmp/x.ts")),
            Some(Path::new("/ignored")),
            Some("ignored"),
            "https://h/a.m3u8",
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.ts"));
    }

    #[test]
    fn test_derived_output_path() {
        let path =
            resolve_output_path(None, Some(Path::new("videos")), None, "https://h/show/index.m3u8")
                .unwrap();
        assert_eq!(path, PathBuf::from("videos/index.mp4"));

        let named = resolve_output_path(None, None, Some("lecture"), "https://h/a.m3u8").unwrap();
        assert_eq!(named, PathBuf::from("./lecture.mp4"));

        let with_ext =
            resolve_output_path(None, None, Some("lecture.mkv"), "https://h/a.m3u8").unwrap();
        assert_eq!(with_ext, PathBuf::from("./lecture.mkv"));
    }

    #[test]
    fn test_blank_name_is_rejected() {
        assert!(resolve_output_path(None, None, Some("  "), "https://h/a.m3u8").is_err());
    }
}
