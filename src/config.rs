//! Build-time node configuration
//!
//! Every value can be overridden through an environment variable at build
//! time (`AIRNODE_*`); anything unset or malformed falls back to the default.

use embassy_time::Duration;

const DEFAULT_SAMPLE_MS: u64 = 5_000;
const DEFAULT_PUBLISH_MS: u64 = 60_000;
const DEFAULT_MQTT_PORT: u64 = 1883;
const OPT_IN_DECISION_MS: u64 = 10_000;
const OPT_IN_POLL_MS: u64 = 50;
const RECONNECT_POLL_MS: u64 = 1_000;
const KEEP_ALIVE_SECS: u16 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
    pub hostname: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Dotted IPv4 address of the broker.
    pub host: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    pub topic: &'static str,
    pub keep_alive_secs: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub sample_interval: Duration,
    pub publish_interval: Duration,
}

impl Timing {
    /// Sampling sub-cycles per publish cycle. Integer division, so a publish
    /// interval that is not a multiple of three sample intervals truncates.
    pub fn sub_cycles(&self) -> u32 {
        let per_cycle = self.sample_interval.as_millis() * 3;
        if per_cycle == 0 {
            return 0;
        }
        (self.publish_interval.as_millis() / per_cycle) as u32
    }
}

/// Startup window during which the button enables wireless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptInWindow {
    pub decision: Duration,
    pub poll: Duration,
}

impl OptInWindow {
    pub fn polls(&self) -> u32 {
        let poll = self.poll.as_millis().max(1);
        (self.decision.as_millis() / poll) as u32
    }

    /// Countdown shown after `polls` poll waits have elapsed. A window that is
    /// not a whole number of polls ends on the leftover, not on zero.
    pub fn remaining_after(&self, polls: u32) -> Duration {
        let spent = self.poll.as_millis() * polls as u64;
        Duration::from_millis(self.decision.as_millis().saturating_sub(spent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    pub timing: Timing,
    pub opt_in: OptInWindow,
    /// Poll period of the blocking link (re)connect loop.
    pub reconnect_poll: Duration,
}

impl NodeConfig {
    pub const fn from_build_env() -> Self {
        Self {
            wifi: WifiConfig {
                ssid: env_or(option_env!("AIRNODE_WIFI_SSID"), ""),
                password: env_or(option_env!("AIRNODE_WIFI_PASSWORD"), ""),
                hostname: env_or(option_env!("AIRNODE_HOSTNAME"), "airnode"),
            },
            broker: BrokerConfig {
                host: env_or(option_env!("AIRNODE_MQTT_HOST"), "192.168.1.10"),
                port: parse_u64(option_env!("AIRNODE_MQTT_PORT"), DEFAULT_MQTT_PORT, 65_535) as u16,
                client_id: env_or(option_env!("AIRNODE_CLIENT_ID"), "airnode"),
                topic: env_or(option_env!("AIRNODE_TOPIC"), "/airnode/bme280"),
                keep_alive_secs: KEEP_ALIVE_SECS,
            },
            timing: Timing {
                sample_interval: Duration::from_millis(parse_u64(
                    option_env!("AIRNODE_SAMPLE_MS"),
                    DEFAULT_SAMPLE_MS,
                    u32::MAX as u64,
                )),
                publish_interval: Duration::from_millis(parse_u64(
                    option_env!("AIRNODE_PUBLISH_MS"),
                    DEFAULT_PUBLISH_MS,
                    u32::MAX as u64,
                )),
            },
            opt_in: OptInWindow {
                decision: Duration::from_millis(OPT_IN_DECISION_MS),
                poll: Duration::from_millis(OPT_IN_POLL_MS),
            },
            reconnect_poll: Duration::from_millis(RECONNECT_POLL_MS),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_build_env()
    }
}

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

/// Decimal parse usable in const context. Empty, non-numeric, zero or
/// out-of-range input yields `default`.
const fn parse_u64(value: Option<&str>, default: u64, max: u64) -> u64 {
    let bytes = match value {
        Some(v) => v.as_bytes(),
        None => return default,
    };
    if bytes.is_empty() {
        return default;
    }
    let mut acc: u64 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < b'0' || b > b'9' {
            return default;
        }
        acc = match acc.checked_mul(10) {
            Some(v) => v,
            None => return default,
        };
        acc = match acc.checked_add((b - b'0') as u64) {
            Some(v) => v,
            None => return default,
        };
        i += 1;
    }
    if acc == 0 || acc > max { default } else { acc }
}
