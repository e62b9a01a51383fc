use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{CleanupWarning, VodError};

pub const MANIFEST_FILE_NAME: &str = "concat_list.txt";
const MIN_INDEX_WIDTH: usize = 5;

/// Job-scoped directory holding segment files and the concat manifest.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// `temp_root/temp_segments_<sanitized output file name>`
    pub fn for_output(temp_root: &Path, output: &Path) -> Result<Self, VodError> {
        let file_name = output
            .file_name()
            .map(|name| name.to_string_lossy())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                VodError::InvalidInput(format!(
                    "output path {} has no file name",
                    output.display()
                ))
            })?;
        Ok(Self {
            dir: temp_root.join(format!("temp_segments_{}", sanitize_component(&file_name))),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    /// Zero padded so that lexical order equals playlist order.
    pub fn segment_path(&self, index: usize, total: usize) -> PathBuf {
        let width = index_width(total);
        self.dir.join(format!("segment_{index:0width$}.ts"))
    }

    pub async fn create(&self) -> Result<(), VodError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            VodError::io(format!("creating staging directory {}", self.dir.display()), e)
        })?;
        debug!(dir = %self.dir.display(), "Created staging directory");
        Ok(())
    }

    /// Remove everything this job may have written, then the directory if it is empty.
    ///
    /// Any `segment_<digits>.ts` file counts as ours, including ones from an
    /// interrupted earlier run for the same output.
    ///
    /// A directory holding anything else is left in place and reported.
    pub async fn cleanup(&self, total: usize) -> Result<(), CleanupWarning> {
        let mut first_error: Option<String> = None;
        let paths = (0..total)
            .map(|index| self.segment_path(index, total))
            .chain(std::iter::once(self.manifest_path()));

        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    first_error
                        .get_or_insert_with(|| format!("could not remove {}: {e}", path.display()));
                }
            }
        }

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return self.warning(first_error),
            Err(e) => {
                return Err(self.warn_with(format!("could not list directory: {e}")));
            }
        };

        let mut leftover = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(self.warn_with(format!("could not list directory: {e}"))),
            };
            if !is_segment_file_name(&entry.file_name().to_string_lossy()) {
                leftover += 1;
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => debug!(path = %entry.path().display(), "Removed stale segment"),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    leftover += 1;
                    first_error.get_or_insert_with(|| {
                        format!("could not remove {}: {e}", entry.path().display())
                    });
                }
            }
        }

        if leftover > 0 {
            let reason = match first_error {
                Some(error) => format!("{error}; {leftover} entries left, directory kept"),
                None => format!("directory not empty ({leftover} foreign entries), kept"),
            };
            return Err(self.warn_with(reason));
        }

        match tokio::fs::remove_dir(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(self.warn_with(format!("could not remove directory: {e}"))),
        }

        debug!(dir = %self.dir.display(), "Removed staging directory");
        self.warning(first_error)
    }

    fn warn_with(&self, reason: String) -> CleanupWarning {
        CleanupWarning {
            path: self.dir.clone(),
            reason,
        }
    }

    fn warning(&self, error: Option<String>) -> Result<(), CleanupWarning> {
        match error {
            Some(reason) => Err(self.warn_with(reason)),
            None => Ok(()),
        }
    }
}

/// Replace `.` and anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `segment_<digits>.ts`
fn is_segment_file_name(name: &str) -> bool {
    name.strip_prefix("segment_")
        .and_then(|rest| rest.strip_suffix(".ts"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn index_width(total: usize) -> usize {
    let largest = total.saturating_sub(1);
    let digits = largest.checked_ilog10().map_or(1, |log| log as usize + 1);
    digits.max(MIN_INDEX_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_dir_name_is_sanitized() {
        let staging =
            StagingArea::for_output(Path::new("/tmp"), Path::new("/out/my movie.v2.mp4")).unwrap();
        assert_eq!(
            staging.dir(),
            Path::new("/tmp/temp_segments_my_movie_v2_mp4")
        );
        assert_eq!(
            staging.manifest_path(),
            Path::new("/tmp/temp_segments_my_movie_v2_mp4/concat_list.txt")
        );
    }

    #[test]
    fn test_output_without_file_name_is_rejected() {
        let err = StagingArea::for_output(Path::new("/tmp"), Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_segment_names_sort_in_playlist_order() {
        let staging = StagingArea::for_output(Path::new("/t"), Path::new("a.mp4")).unwrap();
        assert_eq!(
            staging.segment_path(7, 12).file_name().unwrap(),
            "segment_00007.ts"
        );
        assert_eq!(
            staging.segment_path(99_999, 100_000).file_name().unwrap(),
            "segment_99999.ts"
        );
        assert_eq!(
            staging.segment_path(42, 100_001).file_name().unwrap(),
            "segment_000042.ts"
        );

        let mut names: Vec<String> = [10usize, 2, 100, 1]
            .iter()
            .map(|i| {
                staging
                    .segment_path(*i, 101)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "segment_00001.ts",
                "segment_00002.ts",
                "segment_00010.ts",
                "segment_00100.ts"
            ]
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_segments_manifest_and_dir() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_output(root.path(), Path::new("out.mp4")).unwrap();
        staging.create().await.unwrap();
        tokio::fs::write(staging.segment_path(0, 3), b"a").await.unwrap();
        tokio::fs::write(staging.segment_path(2, 3), b"c").await.unwrap();
        tokio::fs::write(staging.manifest_path(), b"file 'x'\n")
            .await
            .unwrap();

        staging.cleanup(3).await.unwrap();
        assert!(!staging.dir().exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_non_empty_dir_and_warns() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_output(root.path(), Path::new("out.mp4")).unwrap();
        staging.create().await.unwrap();
        tokio::fs::write(staging.segment_path(0, 1), b"a").await.unwrap();
        tokio::fs::write(staging.dir().join("notes.txt"), b"mine")
            .await
            .unwrap();

        let warning = staging.cleanup(1).await.unwrap_err();
        assert!(warning.reason.contains("not empty"));
        assert!(staging.dir().join("notes.txt").exists());
        assert!(!staging.segment_path(0, 1).exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_segments_left_by_longer_run() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_output(root.path(), Path::new("out.mp4")).unwrap();
        staging.create().await.unwrap();
        for index in 0..6 {
            tokio::fs::write(staging.segment_path(index, 6), b"old")
                .await
                .unwrap();
        }
        tokio::fs::write(staging.dir().join("segment_000123.ts"), b"old")
            .await
            .unwrap();

        staging.cleanup(2).await.unwrap();
        assert!(!staging.dir().exists());
    }

    #[test]
    fn test_segment_file_name_matching() {
        assert!(is_segment_file_name("segment_00003.ts"));
        assert!(is_segment_file_name("segment_1234567.ts"));
        assert!(!is_segment_file_name("segment_.ts"));
        assert!(!is_segment_file_name("segment_0001a.ts"));
        assert!(!is_segment_file_name("segment_00001.mp4"));
        assert!(!is_segment_file_name("notes.txt"));
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_dir_is_ok() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::for_output(root.path(), Path::new("never.mp4")).unwrap();
        assert!(staging.cleanup(4).await.is_ok());
    }
}
