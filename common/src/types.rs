use serde::{Deserialize, Serialize};

use crate::engine::{CachedForecast, TickOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WindowState {
    Open,
    Closed,
}

impl WindowState {
    pub fn from_open(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    #[serde(rename = "notificationsSentToday")]
    pub notifications_sent_today: u8,
    #[serde(rename = "maxNotificationsPerDay")]
    pub max_notifications_per_day: u8,
    #[serde(rename = "cachedForecast")]
    pub cached_forecast: Option<CachedForecast>,
    #[serde(rename = "tonightLow")]
    pub tonight_low: Option<i32>,
    #[serde(rename = "cutoffHour")]
    pub cutoff_hour: u8,
    #[serde(rename = "minimumSafeTemp")]
    pub minimum_safe_temp: i32,
    #[serde(rename = "quotaExhausted")]
    pub quota_exhausted: bool,
}

/// Snapshot published by the poll loop for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub window: Option<WindowState>,
    #[serde(rename = "currentHour")]
    pub current_hour: Option<u8>,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    pub timezone: String,
    pub engine: EngineStatus,
    #[serde(rename = "lastOutcome")]
    pub last_outcome: Option<TickOutcome>,
    #[serde(rename = "lastTickEpoch")]
    pub last_tick_epoch: Option<i64>,
    pub ticks: u64,
}

impl MonitorStatus {
    pub fn new(engine: EngineStatus, timezone: &str) -> Self {
        Self {
            window: None,
            current_hour: None,
            time_synced: false,
            timezone: timezone.to_string(),
            engine,
            last_outcome: None,
            last_tick_epoch: None,
            ticks: 0,
        }
    }
}
