//! Checkpoint flushes of the run buffer to the spreadsheet.
//!
//! A flush takes the checkpointer's own mutex first, then copies the guarded
//! state out under the `RunState` lock and does the I/O with only the
//! checkpointer's mutex held. Two flushes (pause listener vs. scraping task)
//! are serialized and each writes a buffer at least as new as the last.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::run::default_filename;
use crate::models::RunConfiguration;
use crate::output::workbook::{self, EXTENSION};
use crate::state::{RunPhase, RunState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub path: PathBuf,
    pub written: usize,
    pub qualified: u64,
    pub processed: u64,
}

#[derive(Debug)]
pub struct Checkpointer {
    data_dir: PathBuf,
    default_stem: Option<String>,
    /// Where the sheet currently lives. Guarded so flushes are serialized.
    current: Mutex<PathBuf>,
}

impl Checkpointer {
    pub fn new(data_dir: &Path, config: &RunConfiguration) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            default_stem: config.default_stem.clone(),
            current: Mutex::new(data_dir.join(&config.output_filename)),
        }
    }

    #[cfg(test)]
    pub fn current_path(&self) -> PathBuf {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rewrites the sheet from the current buffer. With a default file name
    /// the sheet is renamed after the positions searched so far: the new
    /// file is written first, then the old one removed.
    /// Returns `None` when there is nothing to write yet.
    pub fn flush(&self, state: &RunState) -> Result<Option<FlushReport>, AppError> {
        // Snapshot under `current` so a flush that waited never writes an
        // older buffer over a newer one.
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = state.snapshot();

        if snapshot.records.is_empty() {
            debug!("Checkpoint skipped: no accepted candidates yet");
            return Ok(None);
        }

        let target = match &self.default_stem {
            Some(stem) if !snapshot.searched_positions.is_empty() => self.data_dir.join(
                default_filename(stem, &snapshot.searched_positions, EXTENSION),
            ),
            _ => current.clone(),
        };

        workbook::write_records(&target, &snapshot.records)?;

        if target != *current {
            if current.exists() {
                match std::fs::remove_file(&*current) {
                    Ok(()) => debug!("Removed superseded sheet {}", current.display()),
                    Err(e) => warn!("Could not remove old sheet {}: {e}", current.display()),
                }
            }
            *current = target.clone();
        }

        info!(
            "Saved {} records to {} ({}/{} qualified/processed)",
            snapshot.records.len(),
            target.display(),
            snapshot.qualified,
            snapshot.processed
        );
        Ok(Some(FlushReport {
            path: target,
            written: snapshot.records.len(),
            qualified: snapshot.qualified,
            processed: snapshot.processed,
        }))
    }
}

/// Guarantees a final flush however the run ends. Call `finish` on the
/// normal path; dropping the guard unfinished flushes and logs any error.
pub struct FlushGuard<'a> {
    checkpointer: &'a Checkpointer,
    state: &'a RunState,
    armed: bool,
}

impl<'a> FlushGuard<'a> {
    pub fn new(checkpointer: &'a Checkpointer, state: &'a RunState) -> Self {
        Self {
            checkpointer,
            state,
            armed: true,
        }
    }

    pub fn finish(mut self) -> Result<Option<FlushReport>, AppError> {
        self.armed = false;
        final_flush(self.checkpointer, self.state)
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Run ended abnormally; flushing collected candidates");
            if let Err(e) = final_flush(self.checkpointer, self.state) {
                error!("Final flush failed: {e}");
            }
        }
    }
}

fn final_flush(checkpointer: &Checkpointer, state: &RunState) -> Result<Option<FlushReport>, AppError> {
    state.set_phase(RunPhase::Flushing);
    let report = checkpointer.flush(state);
    state.set_phase(RunPhase::Completed);
    report
}

/// Handle given to the pause listener.
#[derive(Clone)]
pub struct RunControl {
    state: Arc<RunState>,
    checkpointer: Arc<Checkpointer>,
}

impl RunControl {
    pub fn new(state: Arc<RunState>, checkpointer: Arc<Checkpointer>) -> Self {
        Self {
            state,
            checkpointer,
        }
    }

    /// Flips the pause latch. Pausing flushes immediately.
    /// Returns true when the run is now paused.
    pub fn toggle_pause(&self) -> bool {
        let running = self.state.toggle_running();
        if running {
            info!(phase = ?self.state.phase(), "Resumed");
        } else {
            let (qualified, processed) = self.state.counts();
            info!(
                phase = ?self.state.phase(),
                "Paused at {qualified}/{processed} qualified/processed; saving"
            );
            if let Err(e) = self.checkpointer.flush(&self.state) {
                error!("Checkpoint on pause failed: {e}");
            }
        }
        !running
    }

    pub fn cancel(&self) {
        self.state.cancel();
    }

    #[cfg(test)]
    pub fn state(&self) -> &RunState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use crate::qualification::filters::tests::config;
    use crate::qualification::signature::{CandidateSignature, DedupIndex};

    fn commit(state: &RunState, name: &str) {
        state.commit(
            CandidateRecord {
                display_name: name.to_string(),
                ..Default::default()
            },
            CandidateSignature::new(name, "t", "20/1-Present"),
        );
    }

    #[test]
    fn test_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunState::new(DedupIndex::new());
        let checkpointer = Checkpointer::new(dir.path(), &config());
        assert_eq!(checkpointer.flush(&state).unwrap(), None);
        assert!(!checkpointer.current_path().exists());
    }

    #[test]
    fn test_flush_rewrites_whole_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunState::new(DedupIndex::new());
        let checkpointer = Checkpointer::new(dir.path(), &config());

        commit(&state, "a");
        checkpointer.flush(&state).unwrap();
        commit(&state, "b");
        let report = checkpointer.flush(&state).unwrap().unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.path, dir.path().join("run.csv"));
        assert_eq!(workbook::read_sheet(&report.path).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_default_name_follows_searched_positions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.default_stem = Some("上游-Acme".to_string());
        config.output_filename = "上游-Acme-PM-QA.csv".to_string();
        let state = RunState::new(DedupIndex::new());
        let checkpointer = Checkpointer::new(dir.path(), &config);

        commit(&state, "a");
        state.note_position("PM");
        let first = checkpointer.flush(&state).unwrap().unwrap();
        assert_eq!(first.path, dir.path().join("上游-Acme-PM.csv"));

        state.note_position("QA");
        let second = checkpointer.flush(&state).unwrap().unwrap();
        assert_eq!(second.path, dir.path().join("上游-Acme-PM-QA.csv"));
        assert!(!first.path.exists());
        assert_eq!(checkpointer.current_path(), second.path);
    }

    #[test]
    fn test_guard_flushes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunState::new(DedupIndex::new());
        let checkpointer = Checkpointer::new(dir.path(), &config());
        commit(&state, "a");
        {
            let _guard = FlushGuard::new(&checkpointer, &state);
        }
        assert!(checkpointer.current_path().exists());
        assert_eq!(state.phase(), RunPhase::Completed);
    }

    #[test]
    fn test_waiting_flush_writes_latest_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RunState::new(DedupIndex::new()));
        let checkpointer = Arc::new(Checkpointer::new(dir.path(), &config()));
        commit(&state, "a");

        // Another flush is in flight while the listener asks for one.
        let held = checkpointer.current.lock().unwrap();
        let listener = {
            let state = Arc::clone(&state);
            let checkpointer = Arc::clone(&checkpointer);
            std::thread::spawn(move || checkpointer.flush(&state).unwrap())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        commit(&state, "b");
        workbook::write_records(&held, &state.snapshot().records).unwrap();
        drop(held);

        let report = listener.join().unwrap().unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(
            workbook::read_sheet(&checkpointer.current_path()).unwrap().rows.len(),
            2
        );
    }

    #[test]
    fn test_pause_toggle_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RunState::new(DedupIndex::new()));
        let checkpointer = Arc::new(Checkpointer::new(dir.path(), &config()));
        let control = RunControl::new(Arc::clone(&state), Arc::clone(&checkpointer));
        commit(&state, "a");

        assert!(control.toggle_pause());
        assert!(!state.is_running());
        assert_eq!(
            workbook::read_sheet(&checkpointer.current_path()).unwrap().rows.len(),
            1
        );
        assert!(!control.toggle_pause());
        assert!(state.is_running());
    }
}
