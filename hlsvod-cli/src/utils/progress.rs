use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hlsvod_engine::{JobEvent, JobState};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Renders job events as a segment progress bar.
#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    bar: Arc<Mutex<Option<ProgressBar>>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bar: Arc::new(Mutex::new(None)),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bar: Arc::new(Mutex::new(None)),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: JobEvent) {
        if self.disabled {
            return;
        }

        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            JobEvent::PlaylistResolved { segments, .. } => {
                let bar = self.multi.add(ProgressBar::new(segments as u64));
                bar.set_style(segment_style());
                bar.set_message("Downloading segments");
                bar.enable_steady_tick(Duration::from_millis(500));
                *slot = Some(bar);
            }
            JobEvent::Progress(progress) => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_position(progress.completed as u64);
                    if progress.failed > 0 {
                        bar.set_message(format!(
                            "Downloading segments, {} received, {} failed",
                            HumanBytes(progress.bytes),
                            progress.failed
                        ));
                    } else {
                        bar.set_message(format!(
                            "Downloading segments, {} received",
                            HumanBytes(progress.bytes)
                        ));
                    }
                }
            }
            JobEvent::StateChanged(JobState::Assembling) => {
                if let Some(bar) = slot.as_ref() {
                    bar.set_message("Joining segments");
                }
            }
            JobEvent::StateChanged(JobState::Done) => {
                if let Some(bar) = slot.take() {
                    bar.finish_with_message("Finished");
                }
            }
            JobEvent::StateChanged(JobState::Failed(kind)) => {
                if let Some(bar) = slot.take() {
                    bar.abandon_with_message(format!("Failed ({kind})"));
                }
            }
            _ => {}
        }
    }

    #[inline]
    #[allow(unused)]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

/// Stdout log writer that clears the bars while a line is printed.
#[derive(Clone)]
pub struct SuspendingStdout {
    multi: MultiProgress,
}

impl SuspendingStdout {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl Write for SuspendingStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stdout().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.multi.suspend(|| io::stdout().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.multi.suspend(|| io::stdout().flush())
    }
}

impl<'a> MakeWriter<'a> for SuspendingStdout {
    type Writer = SuspendingStdout;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlsvod_engine::{ErrorKind, SegmentProgress};
    use indicatif::ProgressDrawTarget;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn current_bar(manager: &ProgressManager) -> Option<ProgressBar> {
        manager.bar.lock().unwrap().clone()
    }

    fn resolved(segments: usize) -> JobEvent {
        JobEvent::PlaylistResolved {
            media_url: "https://h/index.m3u8".to_string(),
            segments,
            variant: None,
        }
    }

    #[test]
    fn test_bar_tracks_progress_events() {
        let manager = ProgressManager::new(hidden());
        manager.handle_event(resolved(4));
        manager.handle_event(JobEvent::Progress(SegmentProgress {
            completed: 3,
            failed: 1,
            total: 4,
            bytes: 2048,
        }));

        let bar = current_bar(&manager).unwrap();
        assert_eq!(bar.length(), Some(4));
        assert_eq!(bar.position(), 3);
        assert!(bar.message().contains("1 failed"));
    }

    #[test]
    fn test_terminal_state_finishes_bar() {
        let manager = ProgressManager::new(hidden());
        manager.handle_event(resolved(2));
        let bar = current_bar(&manager).unwrap();

        manager.handle_event(JobEvent::StateChanged(JobState::Failed(ErrorKind::Network)));
        assert!(bar.is_finished());
        assert!(current_bar(&manager).is_none());
    }

    #[test]
    fn test_log_writer_keeps_bar_state() {
        let multi = hidden();
        let manager = ProgressManager::new(multi.clone());
        manager.handle_event(resolved(5));

        let mut writer = SuspendingStdout::new(multi).make_writer();
        writer.write_all(b"log line\n").unwrap();
        writer.flush().unwrap();

        let bar = current_bar(&manager).unwrap();
        assert_eq!(bar.length(), Some(5));
        assert!(!bar.is_finished());
    }

    #[test]
    fn test_disabled_manager_ignores_events() {
        let manager = ProgressManager::new_disabled(hidden());
        manager.handle_event(resolved(2));
        assert!(manager.is_disabled());
        assert!(current_bar(&manager).is_none());
    }
}
