use serde::{Deserialize, Serialize};

use crate::{forecast::ForecastConfig, notify::NotifierConfig};

/// What to do when the forecast cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchFailurePolicy {
    /// Remember the failure until the window is next closed.
    #[default]
    CacheUntilReset,
    /// Leave the cache empty so the next tick fetches again.
    RetryNextTick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub cutoff_hour: u8,
    pub minimum_safe_temp: i32,
    pub max_notifications_per_day: u8,
    pub fetch_failure_policy: FetchFailurePolicy,
    pub poll_interval_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cutoff_hour: 18,
            minimum_safe_temp: 15,
            max_notifications_per_day: 3,
            fetch_failure_policy: FetchFailurePolicy::CacheUntilReset,
            poll_interval_ms: 900_000,
            http_timeout_ms: 10_000,
        }
    }
}

impl MonitorConfig {
    pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;

    pub fn sanitize(&mut self) {
        self.cutoff_hour = self.cutoff_hour.min(23);
        self.poll_interval_ms = self.poll_interval_ms.max(Self::MIN_POLL_INTERVAL_MS);
        self.http_timeout_ms = self.http_timeout_ms.clamp(1_000, 60_000);
    }

    /// Problems worth a warning at startup that [`sanitize`](Self::sanitize) cannot repair.
    pub fn validate(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if self.max_notifications_per_day == 0 {
            problems.push("max_notifications_per_day is 0; no notification will ever be sent");
        }
        if self.http_timeout_ms >= self.poll_interval_ms {
            problems.push("http_timeout_ms is not shorter than poll_interval_ms");
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub use_static_ip: bool,
    pub static_ip: Option<[u8; 4]>,
    pub gateway: Option<[u8; 4]>,
    pub subnet: Option<[u8; 4]>,
    pub dns: Option<[u8; 4]>,
    pub secondary_dns: Option<[u8; 4]>,
    pub ntp_server: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            use_static_ip: false,
            static_ip: None,
            gateway: None,
            subnet: None,
            dns: None,
            secondary_dns: None,
            ntp_server: DEFAULT_NTP_SERVER.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn has_station_credentials(&self) -> bool {
        let ssid = self.wifi_ssid.trim();
        !ssid.is_empty() && ssid != "CHANGE_ME"
    }

    pub fn sanitize(&mut self) {
        let server = self.ntp_server.trim();
        if server.is_empty() {
            self.ntp_server = DEFAULT_NTP_SERVER.to_string();
        } else if server.len() != self.ntp_server.len() {
            self.ntp_server = server.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub window_pin: i32,
    pub led_pin: i32,
    /// The reed switch pulls the input low while the window is open.
    pub window_open_level_low: bool,
    pub led_active_low: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            window_pin: 12,
            led_pin: 2,
            window_open_level_low: true,
            led_active_low: true,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        if self.window_pin < 0 {
            self.window_pin = 12;
        }
        if self.led_pin < 0 {
            self.led_pin = 2;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub monitor: MonitorConfig,
    pub forecast: ForecastConfig,
    pub notifier: NotifierConfig,
    pub timezone: String,
    pub network: NetworkConfig,
    pub hardware: HardwareConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            forecast: ForecastConfig::default(),
            notifier: NotifierConfig::default(),
            timezone: "UTC".to_string(),
            network: NetworkConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a stored document. Missing fields take their defaults.
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut runtime: Self = serde_json::from_slice(raw)?;
        runtime.sanitize();
        Ok(runtime)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        self.network.sanitize();
        self.hardware.sanitize();
        if self.timezone.trim().is_empty() {
            self.timezone = "UTC".to_string();
        }
    }

    /// Copy of the config that is safe to hand out over HTTP.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.network.wifi_pass = redact(&copy.network.wifi_pass);
        copy.forecast.api_key = redact(&copy.forecast.api_key);
        copy.notifier.key = redact(&copy.notifier.key);
        copy
    }

    /// Merges an update coming back from the status API. Redacted secrets keep the current value.
    pub fn merge_update(&mut self, mut update: RuntimeConfig) {
        if update.network.wifi_pass == REDACTED || update.network.wifi_pass.is_empty() {
            update.network.wifi_pass = self.network.wifi_pass.clone();
        }
        if update.forecast.api_key == REDACTED || update.forecast.api_key.is_empty() {
            update.forecast.api_key = self.forecast.api_key.clone();
        }
        if update.notifier.key == REDACTED || update.notifier.key.is_empty() {
            update.notifier.key = self.notifier.key.clone();
        }
        update.sanitize();
        *self = update;
    }

    /// Everything is read once at boot, so any persisted change needs a restart.
    pub fn restart_required(&self, previous: &RuntimeConfig) -> bool {
        self != previous
    }
}

pub const REDACTED: &str = "********";

pub const DEFAULT_NTP_SERVER: &str = "europe.pool.ntp.org";

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}
