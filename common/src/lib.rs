pub mod collaborators;
pub mod config;
pub mod engine;
pub mod forecast;
pub mod notify;
pub mod types;

pub use collaborators::{ClockSource, Notifier, TemperatureProvider, WindowSensor};
pub use config::{FetchFailurePolicy, HardwareConfig, MonitorConfig, NetworkConfig, RuntimeConfig};
pub use engine::{CachedForecast, DailyState, DecisionEngine, TickOutcome};
pub use forecast::{read_tonight_low, ForecastConfig, ForecastError, GuardedReader};
pub use notify::{NotifierConfig, NotifyError};
pub use types::{EngineStatus, MonitorStatus, WindowState};
