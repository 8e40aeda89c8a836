//! Stdin shared between the interactive prompts and the pause listener.
//!
//! One thread owns stdin and forwards lines over a channel. Prompts read
//! from it between runs; during a run the pause listener does, and every
//! line it sees toggles the pause latch.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};

use crate::output::checkpoint::RunControl;

const LISTENER_POLL: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<Receiver<String>>>,
}

impl ConsoleInput {
    /// Starts the stdin reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Input fed from a fixed script instead of stdin.
    #[cfg(test)]
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            // The receiver is alive in `rx`; send cannot fail here.
            let _ = tx.send(line.into());
        }
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Blocks for the next line; `None` once input is closed.
    pub fn read_line(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()
            .ok()
    }

    fn read_line_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_timeout(timeout)
    }
}

/// Line-oriented operator I/O used by the prompts.
pub trait PromptIo {
    fn say(&mut self, text: &str);
    /// `None` when no more input will ever arrive.
    fn read_line(&mut self) -> Option<String>;
}

pub struct Terminal {
    input: ConsoleInput,
}

impl Terminal {
    pub fn new(input: ConsoleInput) -> Self {
        Self { input }
    }
}

impl PromptIo for Terminal {
    fn say(&mut self, text: &str) {
        println!("{text}");
    }

    fn read_line(&mut self) -> Option<String> {
        print!(">> ");
        let _ = io::stdout().flush();
        self.input.read_line()
    }
}

/// Toggles the pause latch on every line typed while a run is active.
pub struct PauseListener {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PauseListener {
    pub fn start(input: ConsoleInput, control: RunControl) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = std::thread::spawn(move || {
            while flag.load(Ordering::SeqCst) {
                match input.read_line_timeout(LISTENER_POLL) {
                    Ok(_) => {
                        if control.toggle_pause() {
                            info!("Paused. Press Enter to resume.");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        info!("Press Enter at any time to pause and save");
        Self {
            active,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PauseListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}
