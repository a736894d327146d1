//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default number of notifications kept before the oldest is evicted.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Default window in which identical non-error notifications collapse into one.
pub const DEFAULT_DEDUPE_WINDOW_MS: u64 = 500;

/// Same as [`DEFAULT_DEDUPE_WINDOW_MS`], as a `Duration`.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_millis(DEFAULT_DEDUPE_WINDOW_MS);

/// Broadcast capacity for store change events. Slow subscribers that fall
/// this far behind see `RecvError::Lagged` and should re-read the store.
pub const STORE_CHANGE_CAPACITY: usize = 1024;

/// Broadcast capacity for the notification feed.
pub const NOTIFICATION_FEED_CAPACITY: usize = 256;

/// Directory under the platform config dir holding client config.
pub const CONFIG_DIR_NAME: &str = "quire";

/// Client config file name.
pub const CONFIG_FILE_NAME: &str = "client.toml";
