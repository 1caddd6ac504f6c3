//! Per-file upload progress
//!
//! Pure bookkeeping plus a single in-place terminal line, shared by all
//! concurrent uploaders. One mutex guards both the snapshot map and the
//! render path so updates never interleave mid-line. Rendering is
//! presentation only and must never block or fail an upload; write errors
//! are swallowed.

use super::FileUploadTask;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Width of the progress bar in cells.
const BAR_WIDTH: usize = 20;

/// Display names are truncated so the redrawn line stays short.
const DISPLAY_NAME_LEN: usize = 20;

#[derive(Debug)]
struct FileProgress {
    display_name: String,
    size_bytes: u64,
    fraction: f64,
    last_bytes: u64,
    halted: bool,
}

struct Inner {
    /// Input order; the rendered line tracks the first incomplete file.
    order: Vec<PathBuf>,
    files: HashMap<PathBuf, FileProgress>,
    out: Box<dyn Write + Send>,
    /// Whether the last rendered line is still awaiting its newline.
    line_open: bool,
}

/// Thread-safe progress state for one upload invocation, keyed by file path.
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl ProgressTracker {
    /// Track the given tasks, rendering to stdout.
    pub fn new(tasks: &[FileUploadTask]) -> Self {
        Self::with_output(tasks, Box::new(std::io::stdout()))
    }

    /// Track the given tasks, rendering to an arbitrary sink.
    pub fn with_output(tasks: &[FileUploadTask], out: Box<dyn Write + Send>) -> Self {
        let order: Vec<PathBuf> = tasks.iter().map(|t| t.path().to_path_buf()).collect();
        let files = tasks
            .iter()
            .map(|task| {
                (
                    task.path().to_path_buf(),
                    FileProgress {
                        display_name: task.filename().chars().take(DISPLAY_NAME_LEN).collect(),
                        size_bytes: task.size_bytes(),
                        fraction: 0.0,
                        last_bytes: 0,
                        halted: false,
                    },
                )
            })
            .collect();
        Self {
            inner: Mutex::new(Inner {
                order,
                files,
                out,
                line_open: false,
            }),
        }
    }

    /// Record cumulative bytes sent for a file and redraw the progress line.
    ///
    /// An update equal to the last recorded count is a no-op (no redundant
    /// redraw). A count lower than the last one is a halt: the fraction is
    /// clamped to 0 and rendered as `Halt...` rather than ever going
    /// negative. Forward updates clamp the fraction to [0, 1].
    pub fn update(&self, path: &Path, bytes_read: u64) {
        let mut inner = self.inner.lock();
        let Some(progress) = inner.files.get_mut(path) else {
            return;
        };

        if bytes_read == progress.last_bytes {
            return;
        }

        let was_complete = progress.fraction >= 1.0;
        if bytes_read < progress.last_bytes {
            progress.halted = true;
            progress.fraction = 0.0;
        } else {
            progress.halted = false;
            progress.fraction = if progress.size_bytes == 0 {
                1.0
            } else {
                (bytes_read as f64 / progress.size_bytes as f64).min(1.0)
            };
        }
        progress.last_bytes = bytes_read;

        // A file crossing 100% gets its own persisted Done line before the
        // next file's bar starts redrawing.
        let just_completed = (!was_complete && progress.fraction >= 1.0).then_some(path);
        Self::render(&mut inner, just_completed);
    }

    /// Current fraction complete for a file, in [0, 1].
    pub fn fraction(&self, path: &Path) -> Option<f64> {
        self.inner.lock().files.get(path).map(|p| p.fraction)
    }

    /// Terminate a still-open redrawn line once the invocation is over.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        if inner.line_open {
            inner.line_open = false;
            let _ = inner.out.write_all(b"\n");
            let _ = inner.out.flush();
        }
    }

    fn render(inner: &mut Inner, just_completed: Option<&Path>) {
        let total = inner.order.len();

        // The file that just crossed 100% if any, otherwise the first file
        // that is not yet complete, or the last one once all are done.
        let (file_n, path) = if let Some(done) = just_completed {
            match inner.order.iter().position(|p| p == done) {
                Some(ix) => (ix + 1, done),
                None => return,
            }
        } else {
            let mut file_n = total;
            let mut path = match inner.order.last() {
                Some(path) => path.as_path(),
                None => return,
            };
            for (ix, candidate) in inner.order.iter().enumerate() {
                let incomplete = inner
                    .files
                    .get(candidate)
                    .map(|p| p.fraction < 1.0)
                    .unwrap_or(false);
                if incomplete {
                    file_n = ix + 1;
                    path = candidate.as_path();
                    break;
                }
            }
            (file_n, path)
        };

        let Some(progress) = inner.files.get(path) else {
            return;
        };

        let status = if progress.halted {
            "Halt..."
        } else if progress.fraction >= 1.0 {
            "Done."
        } else {
            ""
        };

        let filled = (BAR_WIDTH as f64 * progress.fraction).round() as usize;
        let line = format!(
            "\r{}: [{}{}] {:.2}% {} {}/{} files",
            progress.display_name,
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled),
            progress.fraction * 100.0,
            status,
            file_n,
            total,
        );

        let _ = inner.out.write_all(line.as_bytes());
        // Terminal states keep their line on screen; the next file's bar
        // starts fresh below it.
        if status.is_empty() {
            inner.line_open = true;
        } else {
            inner.line_open = false;
            let _ = inner.out.write_all(b"\n");
        }
        let _ = inner.out.flush();
    }
}
