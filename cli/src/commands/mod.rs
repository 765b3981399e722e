// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the tokengate CLI

pub mod config;
pub mod submission;
pub mod token;
pub mod trust;

pub use self::config::ConfigCommand;
pub use self::submission::SubmissionCommand;
pub use self::token::TokenCommand;
pub use self::trust::TrustCommand;

/// Wall clock in epoch milliseconds unless a fixed instant was given.
pub(crate) fn now_or(fixed: Option<i64>) -> i64 {
    fixed.unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

pub(crate) fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
