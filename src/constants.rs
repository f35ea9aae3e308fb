//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Badass rank stat limits
pub mod limits {
    /// Nominal in-game maximum for a single badass rank stat
    pub const BASE_MAX: f64 = 9_975_731.0;

    /// Hard ceiling enforced on commit (twice the nominal maximum)
    pub const OVERDRIVE_MAX: f64 = BASE_MAX * 2.0;
}

/// Known profile layout
pub mod schema {
    /// Section whose every key is a bounded numeric stat
    pub const BOUNDED_SECTION: &str = "BarStats";

    /// Plain fields shown by the front end, as (section, key) pairs
    pub const PLAIN_FIELDS: [(&str, &str); 4] = [
        ("GoldenKeys", "count"),
        ("FOV", "value"),
        ("BarTokens", "count"),
        ("BarRank", "value"),
    ];
}

/// Default file locations (relative to the working directory)
pub mod paths {
    /// Backing profile configuration
    pub const CONFIG_FILE: &str = "config.ini";

    /// Binary artifact the transformer patches
    pub const PAYLOAD_FILE: &str = "PAYLOAD";
}

/// External payload transformer invocation
pub mod transformer {
    /// Program launched for the sync step
    pub const PROGRAM: &str = "python";

    /// Arguments placed before the config/payload parameters
    pub const LEADING_ARGS: [&str; 1] = ["update_payload.py"];

    /// Flag preceding the config path
    pub const CONFIG_FLAG: &str = "-c";

    /// Flag preceding the payload path
    pub const PAYLOAD_FLAG: &str = "-p";

    /// Poll interval while waiting on a transformer with a timeout
    pub const POLL_INTERVAL_MS: u64 = 50;
}

/// Environment variables consulted by the CLI
pub mod env {
    pub const CONFIG: &str = "BL2_CONFIG";
    pub const PAYLOAD: &str = "BL2_PAYLOAD";
    pub const TRANSFORMER: &str = "BL2_TRANSFORMER";
    pub const SYNC_TIMEOUT_SECS: &str = "BL2_SYNC_TIMEOUT_SECS";

    /// Log level (trace, debug, info, warn, error)
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}
