//! Daemon configuration

use std::time::Duration;

pub const DEFAULT_CALENDAR_URL: &str = "https://alice.btc.calendar.opentimestamps.org";
pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";
pub const DEFAULT_TOPIC: &str = "prediction";
pub const DEFAULT_DATA_DIR: &str = "data";

pub const DEFAULT_RELAYS: [&str; 4] = [
    "wss://nostr.mom",
    "wss://nostr.wine",
    "wss://public.relaying.io",
    "wss://nostr-pub.wellorder.net",
];

/// Fully-resolved runtime configuration, passed explicitly to each component
#[derive(Debug, Clone)]
pub struct Config {
    /// Hex-encoded secret key used to sign completion events
    pub secret_key: String,
    /// Calendar server base URL
    pub calendar_url: String,
    /// Esplora API base URL
    pub esplora_url: String,
    /// Relay endpoints to subscribe and publish to
    pub relays: Vec<String>,
    /// Topic tag the subscription filters on
    pub topic: String,
    /// Directory holding record artifacts
    pub data_dir: String,
    /// Number of backlog events requested per relay on subscribe
    pub backlog_limit: u32,
    /// Pause between maturation cycles
    pub mature_interval: Duration,
    /// Delay before the first maturation cycle
    pub warmup_delay: Duration,
    /// Bound on each network attempt within a cycle
    pub attempt_timeout: Duration,
    /// Pause before resubscribing after losing all relay connections
    pub resubscribe_delay: Duration,
    /// HTTP client timeout for calendar and chain requests
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            calendar_url: DEFAULT_CALENDAR_URL.to_string(),
            esplora_url: DEFAULT_ESPLORA_URL.to_string(),
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            topic: DEFAULT_TOPIC.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            backlog_limit: 1,
            mature_interval: Duration::from_secs(3600),
            warmup_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(60),
            resubscribe_delay: Duration::from_secs(300),
            http_timeout: Duration::from_secs(60),
        }
    }
}
