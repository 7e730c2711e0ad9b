//! Centralized constants used across the pipeline, sources, and reports.

/// Annualized-failure-rate scale factors.
pub mod afr {
    /// Days used to annualize cumulative drive-day counts.
    pub const DAYS_PER_YEAR: f64 = 365.0;
    /// Converts an annualized rate fraction into percent.
    pub const PERCENT: f64 = 100.0;
}

/// Bounded-channel tuning shared by producers and the aggregator drain loop.
pub mod channel {
    use std::time::Duration;

    /// Poll interval while a producer waits for channel capacity.
    pub const SEND_POLL_INTERVAL: Duration = Duration::from_millis(5);
    /// Poll interval for the aggregator's cancellable receive loop.
    pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(25);
}

/// Snapshot-directory source settings.
#[cfg(feature = "parquet")]
pub mod snapshot {
    /// Shard file extensions accepted during directory discovery.
    pub const SHARD_EXTENSIONS: [&str; 2] = ["parquet", "jsonl"];
}

/// Canonical raw model strings exercised across unit tests.
#[cfg(test)]
pub mod test_models {
    pub const SEAGATE_BARE: &str = "ST4000DM000";
    pub const HGST_BARE: &str = "WUH721816ALE6L4";
    pub const HGST_PREFIXED: &str = "WDC  WUH721816ALE6L4";
    pub const TOSHIBA_UPPER: &str = "TOSHIBA MG07ACA14TA";
}
