// Assembler: order staged segments, write the concat manifest and run the concatenation tool.

use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::VodError;
use crate::hls::config::AssemblerConfig;
use crate::hls::scheduler::StagedSegment;
use crate::hls::staging::StagingArea;

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Losslessly join the files listed in `manifest` into `output`.
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<ToolOutput, VodError>;
}

/// `ffmpeg -y -f concat -safe 0 -i <manifest> [extra args] -c copy <output>`
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl FfmpegConcatenator {
    pub fn new(program: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    pub fn from_config(config: &AssemblerConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.extra_args.clone())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command_args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(manifest.as_os_str().to_owned());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.extend(["-c", "copy"].iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<ToolOutput, VodError> {
        let args = self.command_args(manifest, output);
        debug!(program = %self.program.display(), args = ?args, "Running concatenation tool");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == IoErrorKind::NotFound {
                    VodError::ToolNotFound {
                        program: self.program.clone(),
                    }
                } else {
                    VodError::io(format!("launching {}", self.program.display()), e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();

        if !result.status.success() {
            return Err(VodError::Concatenation {
                code: result.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Sibling file the tool writes before it is renamed onto `output`.
///
/// `movie.mp4` becomes `movie.part.mp4`, keeping the extension the tool
/// infers the container from. Without an extension the partial is written
/// as MPEG-TS (`name.part.ts`).
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = output
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ts".to_string());
    output.with_file_name(format!("{stem}.part.{extension}"))
}

/// One `file '<path>'` line. Separators become `/`, single quotes are escaped for the concat demuxer.
pub fn manifest_entry(path: &Path) -> Result<String, VodError> {
    let absolute = std::path::absolute(path)
        .map_err(|e| VodError::io(format!("resolving {}", path.display()), e))?;
    let normalized = absolute.to_string_lossy().replace('\\', "/");
    Ok(format!("file '{}'", normalized.replace('\'', "'\\''")))
}

pub struct Assembler {
    concatenator: Arc<dyn Concatenator>,
}

impl Assembler {
    pub fn new(concatenator: Arc<dyn Concatenator>) -> Self {
        Self { concatenator }
    }

    /// Lexical file-name order, which equals playlist order for staged names.
    pub fn order_segments(staged: &[StagedSegment]) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = staged.iter().map(|segment| segment.path.clone()).collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        paths
    }

    pub async fn write_manifest(manifest: &Path, segments: &[PathBuf]) -> Result<(), VodError> {
        let mut listing = String::new();
        for path in segments {
            listing.push_str(&manifest_entry(path)?);
            listing.push('\n');
        }
        tokio::fs::write(manifest, listing)
            .await
            .map_err(|e| VodError::io(format!("writing manifest {}", manifest.display()), e))
    }

    /// Join `staged` into `output`. A failure leaves any previous `output` untouched.
    pub async fn assemble(
        &self,
        staging: &StagingArea,
        staged: &[StagedSegment],
        output: &Path,
    ) -> Result<(), VodError> {
        let ordered = Self::order_segments(staged);
        let manifest = staging.manifest_path();
        Self::write_manifest(&manifest, &ordered).await?;
        info!(segments = ordered.len(), manifest = %manifest.display(), "Wrote concat manifest");

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VodError::io(format!("creating output directory {}", parent.display()), e)
            })?;
        }

        let partial = partial_path(output);
        remove_partial(&partial).await;

        match self.concatenator.concat(&manifest, &partial).await {
            Ok(tool_output) => {
                if !tool_output.stderr.trim().is_empty() {
                    debug!(stderr = %tool_output.stderr.trim_end(), "Concatenation tool output");
                }
            }
            Err(e) => {
                remove_partial(&partial).await;
                return Err(e);
            }
        }

        if let Err(e) = tokio::fs::rename(&partial, output).await {
            remove_partial(&partial).await;
            return Err(VodError::io(
                format!("moving {} to {}", partial.display(), output.display()),
                e,
            ));
        }

        info!(output = %output.display(), "Assembled output file");
        Ok(())
    }
}

pub(crate) async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "Removed partial output"),
        Err(e) if e.kind() == IoErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Could not remove partial output"),
    }
}
