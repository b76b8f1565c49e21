//! Wall-clock helpers

/// Milliseconds since the Unix epoch.
///
/// Expiration timestamps stored in values are absolute and compared
/// against this clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
