/// Current wall-clock time in milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a millisecond duration as `m:ss`. Minutes don't roll over into hours.
pub fn format_duration_ms(millis: u64) -> String {
    let total_seconds = millis / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
