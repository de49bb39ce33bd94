//! Signal handling for interrupted runs (SIGINT/SIGTERM)
//!
//! A signal does not kill the process. It sets a cancellation flag that the
//! pipeline checks between steps, so the run unwinds normally and every temp
//! file is removed by its guard. A running engine apply is never interrupted;
//! the pipeline waits for it and then stops at the next step boundary.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received (cancellation initiated)
    cancel_requested: AtomicBool,
    /// Number of signals received
    signal_count: AtomicU8,
}

impl SignalState {
    /// Create a new signal state
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Get the number of signals received
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Handle a signal (SIGINT/SIGTERM)
    ///
    /// Returns the appropriate action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);
        self.cancel_requested.store(true, Ordering::SeqCst);

        if count == 0 {
            SignalAction::InitiateCancellation
        } else {
            SignalAction::AlreadyCancelling
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop at the next step boundary
    InitiateCancellation,
    /// Later signals: cancellation is already under way
    AlreadyCancelling,
}

/// Signal handler that manages the signal state
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    /// Get a reference to the signal state
    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the SIGINT/SIGTERM handler.
    ///
    /// Must be called once at program startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                warn!("interrupt received; stopping after the current step");
            }
            SignalAction::AlreadyCancelling => {
                warn!("interrupt received again; still waiting for the current step to finish");
            }
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
    fn test_signal_state_initial() {
        let state = SignalState::new();
        assert!(!state.is_cancel_requested());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_initiates_cancellation() {
        let state = SignalState::new();
        let action = state.handle_signal();

        assert_eq!(action, SignalAction::InitiateCancellation);
        assert!(state.is_cancel_requested());
        assert_eq!(state.signal_count(), 1);
    }

    #[test]
    fn test_repeated_signals_do_not_escalate() {
        let state = SignalState::new();

        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::AlreadyCancelling);
        assert_eq!(state.handle_signal(), SignalAction::AlreadyCancelling);
        assert!(state.is_cancel_requested());
        assert_eq!(state.signal_count(), 3);
    }

    #[test]
    fn test_handler_shares_state() {
        let handler = SignalHandler::new();
        let state = handler.state();
        handler.state().handle_signal();
        assert!(state.is_cancel_requested());
    }
}
