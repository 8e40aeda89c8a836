use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::models::CandidateRecord;
use crate::qualification::signature::{CandidateSignature, DedupIndex};

/// How often a paused run re-checks the latch.
pub const PAUSE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Configuring,
    Searching { employer: String, position: String },
    Paused,
    Flushing,
    Completed,
}

/// Copy of the guarded state taken for a flush.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<CandidateRecord>,
    pub processed: u64,
    pub qualified: u64,
    pub searched_positions: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    records: Vec<CandidateRecord>,
    processed: u64,
    qualified: u64,
    dedup: DedupIndex,
    searched_positions: Vec<String>,
    phase: RunPhase,
}

/// Mutable state of one run.
///
/// Records, both counters, and the dedup index sit behind one lock. The
/// scraping task writes; the pause listener thread reads through
/// `snapshot` to flush. The pause latch and cancel flag are atomics so the
/// listener never waits on the lock to flip them.
#[derive(Debug)]
pub struct RunState {
    run_id: Uuid,
    inner: Mutex<Inner>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl RunState {
    pub fn new(dedup: DedupIndex) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            inner: Mutex::new(Inner {
                records: Vec::new(),
                processed: 0,
                qualified: 0,
                dedup,
                searched_positions: Vec::new(),
                phase: RunPhase::Idle,
            }),
            running: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning is ignored: the buffer stays flushable after a panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── counters and buffer ──────────────────────────────────────────────

    pub fn mark_processed(&self) -> u64 {
        let mut inner = self.lock();
        inner.processed += 1;
        inner.processed
    }

    pub fn is_duplicate(&self, signature: &CandidateSignature) -> bool {
        self.lock().dedup.contains(signature)
    }

    /// Appends an accepted record and remembers its signature.
    /// Returns the new qualified count.
    pub fn commit(&self, record: CandidateRecord, signature: CandidateSignature) -> u64 {
        let mut inner = self.lock();
        inner.dedup.add(signature);
        inner.records.push(record);
        inner.qualified += 1;
        inner.qualified
    }

    /// Sequence number the next accepted candidate will get.
    pub fn next_sequence(&self) -> u64 {
        self.lock().qualified + 1
    }

    /// (qualified, processed)
    pub fn counts(&self) -> (u64, u64) {
        let inner = self.lock();
        (inner.qualified, inner.processed)
    }

    pub fn note_position(&self, position: &str) {
        let mut inner = self.lock();
        if !inner.searched_positions.iter().any(|p| p == position) {
            inner.searched_positions.push(position.to_string());
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            records: inner.records.clone(),
            processed: inner.processed,
            qualified: inner.qualified,
            searched_positions: inner.searched_positions.clone(),
        }
    }

    // ── phase ────────────────────────────────────────────────────────────

    pub fn set_phase(&self, phase: RunPhase) {
        self.lock().phase = phase;
    }

    /// A searching run whose latch is open reports `Paused`.
    pub fn phase(&self) -> RunPhase {
        let phase = self.lock().phase.clone();
        match phase {
            RunPhase::Searching { .. } if !self.is_running() => RunPhase::Paused,
            other => other,
        }
    }

    // ── pause latch and cancellation ─────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Flips the latch and returns whether the run is now running.
    pub fn toggle_running(&self) -> bool {
        !self.running.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Suspends until the latch is closed again or the run is cancelled.
    pub async fn wait_while_paused(&self) {
        while !self.is_running() && !self.is_cancelled() {
            tokio::time::sleep(PAUSE_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(name: &str) -> CandidateRecord {
        CandidateRecord {
            display_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_updates_buffer_counter_and_index() {
        let state = RunState::new(DedupIndex::new());
        let sig = CandidateSignature::new("张三", "PM", "20/1-Present");
        assert!(!state.is_duplicate(&sig));
        assert_eq!(state.next_sequence(), 1);

        assert_eq!(state.commit(record("张三"), sig.clone()), 1);
        assert!(state.is_duplicate(&sig));
        assert_eq!(state.next_sequence(), 2);

        let snap = state.snapshot();
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.qualified, 1);
    }

    #[test]
    fn test_counters_and_positions() {
        let state = RunState::new(DedupIndex::new());
        state.mark_processed();
        assert_eq!(state.mark_processed(), 2);
        state.note_position("PM");
        state.note_position("");
        state.note_position("PM");
        assert_eq!(state.counts(), (0, 2));
        assert_eq!(state.snapshot().searched_positions, vec!["PM".to_string(), String::new()]);
    }

    #[test]
    fn test_toggle_and_phase() {
        let state = RunState::new(DedupIndex::new());
        assert_eq!(state.phase(), RunPhase::Idle);
        state.set_phase(RunPhase::Searching {
            employer: "Acme".to_string(),
            position: String::new(),
        });
        assert!(!state.toggle_running());
        assert_eq!(state.phase(), RunPhase::Paused);
        assert!(state.toggle_running());
        assert!(matches!(state.phase(), RunPhase::Searching { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_while_paused_resumes_on_toggle() {
        let state = Arc::new(RunState::new(DedupIndex::new()));
        state.set_running(false);

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        state.set_running(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter resumes within one poll")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_paused_waiter() {
        let state = RunState::new(DedupIndex::new());
        state.set_running(false);
        state.cancel();
        tokio::time::timeout(Duration::from_secs(1), state.wait_while_paused())
            .await
            .unwrap();
    }
}
