//! Scan observer that writes each completed image to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};
use twain_core::transfer::{Continuation, ScanObserver, TransferEvent};
use twain_core::TwainError;

/// What the scan produced, shared with the caller.
#[derive(Debug, Default)]
pub struct Outcome {
    pub files: Vec<PathBuf>,
    pub error: Option<String>,
    pub completed: bool,
}

pub type SharedOutcome = Arc<Mutex<Outcome>>;

pub fn lock(outcome: &SharedOutcome) -> std::sync::MutexGuard<'_, Outcome> {
    outcome.lock().unwrap_or_else(|e| e.into_inner())
}

/// Writes raster rows of every finished image to `page-NNN.raw`.
pub struct RawWriter {
    dir: PathBuf,
    outcome: SharedOutcome,
}

impl RawWriter {
    pub fn new(dir: &Path, outcome: SharedOutcome) -> Self {
        Self {
            dir: dir.to_path_buf(),
            outcome,
        }
    }
}

impl ScanObserver for RawWriter {
    fn on_transfer(&mut self, event: &TransferEvent<'_>) -> Continuation {
        if !event.is_final_for_image {
            debug!(
                rows = ?event.rows,
                progress = %format!("{:.0}%", event.completion * 100.0),
                "Chunk received"
            );
            return Continuation::Continue;
        }

        let mut outcome = lock(&self.outcome);
        let path = self.dir.join(format!("page-{:03}.raw", outcome.files.len() + 1));
        let raster = event.raster;
        if let Err(e) = fs::write(&path, &raster.data) {
            error!(path = %path.display(), error = %e, "Failed to write image");
            outcome.error = Some(format!("{}: {e}", path.display()));
            return Continuation::Stop;
        }
        info!(
            path = %path.display(),
            width = raster.width,
            height = raster.height,
            bpp = raster.bits_per_pixel,
            stride = raster.stride,
            pending = event.pending,
            "Image saved"
        );
        outcome.files.push(path);
        Continuation::Continue
    }

    fn on_complete(&mut self, error: Option<&TwainError>) {
        let mut outcome = lock(&self.outcome);
        outcome.completed = true;
        if let Some(e) = error {
            outcome.error.get_or_insert_with(|| e.to_string());
        }
    }
}
