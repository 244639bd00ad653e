use core::fmt;

use serde::Serialize;

use crate::{
    collaborators::{ClockSource, Notifier, TemperatureProvider, WindowSensor},
    config::{FetchFailurePolicy, MonitorConfig},
    types::EngineStatus,
};

/// What the engine knows about tonight's forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "UPPERCASE")]
pub enum CachedForecast {
    Low(i32),
    /// The fetch failed and the failure is remembered until the next reset.
    Unavailable,
}

impl CachedForecast {
    pub fn low(self) -> Option<i32> {
        match self {
            Self::Low(low) => Some(low),
            Self::Unavailable => None,
        }
    }
}

/// Per-evening bookkeeping. Lives only in RAM; a reboot starts from empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyState {
    #[serde(rename = "notificationsSentToday")]
    pub notifications_sent_today: u8,
    #[serde(rename = "cachedForecast")]
    pub cached_forecast: Option<CachedForecast>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickOutcome {
    ClockUnavailable,
    Quiet {
        hour: u8,
    },
    Reset,
    QuotaExhausted {
        #[serde(rename = "sentToday")]
        sent_today: u8,
    },
    ForecastUnavailable {
        #[serde(rename = "retryNextTick")]
        retry_next_tick: bool,
    },
    WarmEnough {
        low: i32,
    },
    Notified {
        low: i32,
        #[serde(rename = "sentToday")]
        sent_today: u8,
    },
    NotifyFailed {
        low: i32,
        reason: String,
    },
}

impl TickOutcome {
    /// Ticks where nothing was evaluated, usually logged at debug level.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::ClockUnavailable | Self::Quiet { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ForecastUnavailable { .. } | Self::NotifyFailed { .. }
        )
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClockUnavailable => write!(f, "clock not synchronised yet, skipping"),
            Self::Quiet { hour } => write!(f, "hour {hour} is before cutoff, nothing to do"),
            Self::Reset => write!(f, "window closed, daily state reset"),
            Self::QuotaExhausted { sent_today } => {
                write!(f, "max messages already sent ({sent_today})")
            }
            Self::ForecastUnavailable { retry_next_tick } => {
                if *retry_next_tick {
                    write!(f, "forecast unavailable, retrying next tick")
                } else {
                    write!(f, "forecast unavailable until the window is closed")
                }
            }
            Self::WarmEnough { low } => write!(f, "tonight's low of {low} is warm enough"),
            Self::Notified { low, sent_today } => {
                write!(f, "sent open-window notification for {low} ({sent_today} today)")
            }
            Self::NotifyFailed { low, reason } => {
                write!(f, "notification for {low} not delivered: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: MonitorConfig,
    state: DailyState,
}

impl DecisionEngine {
    pub fn new(mut config: MonitorConfig) -> Self {
        config.sanitize();
        Self {
            config,
            state: DailyState::default(),
        }
    }

    pub fn with_state(config: MonitorConfig, mut state: DailyState) -> Self {
        let mut engine = Self::new(config);
        state.notifications_sent_today = state
            .notifications_sent_today
            .min(engine.config.max_notifications_per_day);
        engine.state = state;
        engine
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &DailyState {
        &self.state
    }

    pub fn is_active_hour(&self, hour: u8) -> bool {
        hour >= self.config.cutoff_hour
    }

    pub fn quota_exhausted(&self) -> bool {
        self.state.notifications_sent_today >= self.config.max_notifications_per_day
    }

    pub fn reset(&mut self) {
        self.state = DailyState::default();
    }

    pub fn evaluate<C, W, F, N>(
        &mut self,
        clock: &C,
        window: &mut W,
        forecast: &mut F,
        notifier: &mut N,
    ) -> TickOutcome
    where
        C: ClockSource + ?Sized,
        W: WindowSensor + ?Sized,
        F: TemperatureProvider + ?Sized,
        N: Notifier + ?Sized,
    {
        let Some(hour) = clock.current_hour() else {
            return TickOutcome::ClockUnavailable;
        };

        if !self.is_active_hour(hour) {
            return TickOutcome::Quiet { hour };
        }

        if !window.is_open() {
            self.reset();
            return TickOutcome::Reset;
        }

        self.evaluate_open_window(forecast, notifier)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            notifications_sent_today: self.state.notifications_sent_today,
            max_notifications_per_day: self.config.max_notifications_per_day,
            cached_forecast: self.state.cached_forecast,
            tonight_low: self.state.cached_forecast.and_then(CachedForecast::low),
            cutoff_hour: self.config.cutoff_hour,
            minimum_safe_temp: self.config.minimum_safe_temp,
            quota_exhausted: self.quota_exhausted(),
        }
    }

    fn evaluate_open_window<F, N>(&mut self, forecast: &mut F, notifier: &mut N) -> TickOutcome
    where
        F: TemperatureProvider + ?Sized,
        N: Notifier + ?Sized,
    {
        if self.quota_exhausted() {
            return TickOutcome::QuotaExhausted {
                sent_today: self.state.notifications_sent_today,
            };
        }

        let cached = match self.state.cached_forecast {
            Some(cached) => cached,
            None => match self.fetch_forecast(forecast) {
                Some(cached) => cached,
                None => {
                    return TickOutcome::ForecastUnavailable {
                        retry_next_tick: true,
                    }
                }
            },
        };

        let low = match cached {
            CachedForecast::Low(low) => low,
            CachedForecast::Unavailable => {
                return TickOutcome::ForecastUnavailable {
                    retry_next_tick: false,
                }
            }
        };

        if low >= self.config.minimum_safe_temp {
            return TickOutcome::WarmEnough { low };
        }

        match notifier.send(low) {
            Ok(()) => {
                self.state.notifications_sent_today =
                    self.state.notifications_sent_today.saturating_add(1);
                TickOutcome::Notified {
                    low,
                    sent_today: self.state.notifications_sent_today,
                }
            }
            Err(err) => TickOutcome::NotifyFailed {
                low,
                reason: err.to_string(),
            },
        }
    }

    // Returns `None` when nothing was cached and the next tick should fetch again.
    fn fetch_forecast<F>(&mut self, forecast: &mut F) -> Option<CachedForecast>
    where
        F: TemperatureProvider + ?Sized,
    {
        let cached = match forecast.fetch_tonight_low() {
            Ok(low) => CachedForecast::Low(low),
            Err(_) => match self.config.fetch_failure_policy {
                FetchFailurePolicy::CacheUntilReset => CachedForecast::Unavailable,
                FetchFailurePolicy::RetryNextTick => return None,
            },
        };

        self.state.cached_forecast = Some(cached);
        Some(cached)
    }
}

#[cfg(test)]
mod tests {
    use crate::{forecast::ForecastError, notify::NotifyError};

    use super::*;

    struct FixedHour(Option<u8>);

    impl ClockSource for FixedHour {
        fn current_hour(&self) -> Option<u8> {
            self.0
        }
    }

    struct Switch(bool);

    impl WindowSensor for Switch {
        fn is_open(&mut self) -> bool {
            self.0
        }
    }

    struct Forecast(Result<i32, ForecastError>);

    impl TemperatureProvider for Forecast {
        fn fetch_tonight_low(&mut self) -> Result<i32, ForecastError> {
            self.0.clone()
        }
    }

    struct Phone(bool);

    impl Notifier for Phone {
        fn send(&mut self, _temperature: i32) -> Result<(), NotifyError> {
            if self.0 {
                Ok(())
            } else {
                Err(NotifyError::HttpStatus(500))
            }
        }
    }

    #[test]
    fn unsynced_clock_does_nothing() {
        let mut engine = DecisionEngine::new(MonitorConfig::default());

        let outcome = engine.evaluate(
            &FixedHour(None),
            &mut Switch(true),
            &mut Forecast(Ok(5)),
            &mut Phone(true),
        );

        assert_eq!(outcome, TickOutcome::ClockUnavailable);
        assert_eq!(engine.state(), &DailyState::default());
    }

    #[test]
    fn cutoff_hour_is_active() {
        let engine = DecisionEngine::new(MonitorConfig::default());

        assert!(!engine.is_active_hour(17));
        assert!(engine.is_active_hour(18));
        assert!(engine.is_active_hour(23));
    }

    #[test]
    fn notifies_and_counts_on_delivery() {
        let mut engine = DecisionEngine::new(MonitorConfig::default());

        let outcome = engine.evaluate(
            &FixedHour(Some(20)),
            &mut Switch(true),
            &mut Forecast(Ok(10)),
            &mut Phone(true),
        );

        assert_eq!(
            outcome,
            TickOutcome::Notified {
                low: 10,
                sent_today: 1
            }
        );
        assert_eq!(engine.state().cached_forecast, Some(CachedForecast::Low(10)));
    }

    #[test]
    fn failed_delivery_keeps_count() {
        let mut engine = DecisionEngine::new(MonitorConfig::default());

        let outcome = engine.evaluate(
            &FixedHour(Some(20)),
            &mut Switch(true),
            &mut Forecast(Ok(10)),
            &mut Phone(false),
        );

        assert_eq!(
            outcome,
            TickOutcome::NotifyFailed {
                low: 10,
                reason: "notification request returned HTTP 500".to_string(),
            }
        );
        assert_eq!(engine.state().notifications_sent_today, 0);
    }

    #[test]
    fn retry_policy_leaves_cache_empty() {
        let config = MonitorConfig {
            fetch_failure_policy: FetchFailurePolicy::RetryNextTick,
            ..MonitorConfig::default()
        };
        let mut engine = DecisionEngine::new(config);

        let outcome = engine.evaluate(
            &FixedHour(Some(21)),
            &mut Switch(true),
            &mut Forecast(Err(ForecastError::HttpStatus(500))),
            &mut Phone(true),
        );

        assert_eq!(
            outcome,
            TickOutcome::ForecastUnavailable {
                retry_next_tick: true
            }
        );
        assert_eq!(engine.state().cached_forecast, None);
    }

    #[test]
    fn restored_count_is_clamped_to_quota() {
        let engine = DecisionEngine::with_state(
            MonitorConfig::default(),
            DailyState {
                notifications_sent_today: 9,
                cached_forecast: Some(CachedForecast::Low(3)),
            },
        );

        assert_eq!(engine.state().notifications_sent_today, 3);
        assert!(engine.quota_exhausted());
    }

    #[test]
    fn status_reports_cached_low() {
        let engine = DecisionEngine::with_state(
            MonitorConfig::default(),
            DailyState {
                notifications_sent_today: 1,
                cached_forecast: Some(CachedForecast::Low(12)),
            },
        );

        let status = engine.status();

        assert_eq!(status.tonight_low, Some(12));
        assert_eq!(status.notifications_sent_today, 1);
        assert_eq!(status.max_notifications_per_day, 3);
        assert!(!status.quota_exhausted);
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(TickOutcome::Notified {
            low: 9,
            sent_today: 2,
        })
        .unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "kind": "NOTIFIED", "low": 9, "sentToday": 2 })
        );
    }

    #[test]
    fn failed_delivery_reports_reason() {
        let mut engine = DecisionEngine::new(MonitorConfig::default());

        let outcome = engine.evaluate(
            &FixedHour(Some(19)),
            &mut Switch(true),
            &mut Forecast(Ok(4)),
            &mut Phone(false),
        );

        assert!(outcome.is_failure());
        assert_eq!(
            outcome.to_string(),
            "notification for 4 not delivered: notification request returned HTTP 500"
        );
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "kind": "NOTIFY_FAILED",
                "low": 4,
                "reason": "notification request returned HTTP 500"
            })
        );
    }
}
