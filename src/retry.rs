use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{GcliError, Result};

const SERVICE_UNAVAILABLE: u16 = 503;

/// Whole-request retry for transient server overload.
///
/// Only HTTP 503 is retried. Every attempt starts from scratch, so callers
/// build their stream state inside the closure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub announce: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            announce: true,
        }
    }
}

impl RetryPolicy {
    pub fn quiet(self) -> Self {
        Self {
            announce: false,
            ..self
        }
    }

    pub fn run<T, F>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.attempts.max(1);
        let mut number = 1;
        loop {
            match attempt(number) {
                Err(error) if is_retryable(&error) => {
                    if self.announce {
                        crate::notice!(
                            "\nAPI returned 503 (Service Unavailable), retrying... ({number}/{attempts})"
                        );
                    }
                    if number >= attempts {
                        return Err(GcliError::RetriesExhausted {
                            attempts,
                            status: SERVICE_UNAVAILABLE,
                        });
                    }
                    debug!(attempt = number, delay = ?self.delay, "waiting before retry");
                    thread::sleep(self.delay);
                    number += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

fn is_retryable(error: &GcliError) -> bool {
    matches!(error, GcliError::Status { status, .. } if *status == SERVICE_UNAVAILABLE)
}
