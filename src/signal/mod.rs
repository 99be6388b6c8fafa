//! Signal handling for the reconcile watch loop (SIGINT/SIGTERM)
//!
//! The first signal asks the loop to stop after the current sweep. A second
//! signal exits the process right away; the snapshot written after the last
//! finished sweep stays on disk.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code used when a second signal forces an immediate exit
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown state
#[derive(Debug, Default)]
pub struct ShutdownState {
    stop_requested: AtomicBool,
    signal_count: AtomicU8,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop flag polled by the reconcile loop
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop_requested
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record one signal and return what to do about it
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);
        match count {
            0 => {
                self.stop_requested.store(true, Ordering::SeqCst);
                SignalAction::Stop
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Finish the current sweep, then stop
    Stop,
    /// Exit without waiting
    ImmediateExit,
    Ignore,
}

/// Installs the process signal handler over a shared [`ShutdownState`]
pub struct SignalHandler {
    state: Arc<ShutdownState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ShutdownState::new()),
        }
    }

    pub fn state(&self) -> Arc<ShutdownState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Stop => {
                tracing::warn!("interrupt received, stopping after the current sweep");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately...");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ShutdownState::new();
        assert!(!state.is_stop_requested());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_requests_stop() {
        let state = ShutdownState::new();
        assert_eq!(state.handle_signal(), SignalAction::Stop);
        assert!(state.is_stop_requested());
        assert!(state.stop_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_second_signal_exits_and_third_is_ignored() {
        let state = ShutdownState::new();
        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::ImmediateExit);
        assert_eq!(state.handle_signal(), SignalAction::Ignore);
        assert_eq!(state.signal_count(), 3);
    }

    #[test]
    fn test_handler_shares_state() {
        let handler = SignalHandler::new();
        let state = handler.state();
        state.handle_signal();
        assert!(handler.state().is_stop_requested());
    }
}
