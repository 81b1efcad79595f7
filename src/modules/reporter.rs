//! Operator-facing progress messages.

use log::info;

/// Receives the messages an operator should see while a mount is attempted.
pub trait Reporter {
    fn info(&self, message: &str);
}

/// Forwards every message to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn info(&self, message: &str) {
        info!(target: "revmount", "{}", message);
    }
}
