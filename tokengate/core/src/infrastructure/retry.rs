// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded exponential backoff for collaborator calls.
//!
//! Only [`CollaboratorError::Transient`] is retried. Once the attempt ceiling
//! is reached the last error is surfaced as [`CollaboratorError::Fatal`] so the
//! caller fails that one batch item instead of hanging.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::collaborators::CollaboratorError;
use crate::domain::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Used by tests and one-shot CLI runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails non-transiently or exhausts `policy`.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(CollaboratorError::Transient(reason)) => {
                if attempt >= policy.max_attempts {
                    warn!(operation, attempts = attempt, "Giving up after transient failures");
                    return Err(CollaboratorError::Fatal(format!(
                        "{operation} failed after {attempt} attempts: {reason}"
                    )));
                }
                let delay = policy.backoff_for(attempt);
                debug!(operation, attempt, delay_ms = delay.as_millis() as u64, %reason, "Retrying transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}
