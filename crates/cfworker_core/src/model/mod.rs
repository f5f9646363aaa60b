//! Domain model for accounts and worker deployments.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep secrets out of `Debug` output.
//!
//! # Invariants
//! - Every account is identified by a stable `AccountId`.
//! - Timestamps are Unix epoch milliseconds.

pub mod account;
pub mod deploy;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Renders epoch milliseconds as `YYYY-MM-DD HH:MM:SS` in UTC; `-` when out of range.
pub fn format_timestamp(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
