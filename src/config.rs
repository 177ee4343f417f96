//! Serializable cache settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache settings as they appear in a configuration file.
///
/// Durations use the humantime format (`"90s"`, `"1h 30m"`).  Missing fields
/// take their default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of tracked keys.  Zero is raised to one.
    pub capacity: usize,
    /// How long a successful lookup is served before it is repeated.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}
