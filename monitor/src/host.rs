use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use closewindow_common::{
    forecast, notify, read_tonight_low, ClockSource, DecisionEngine, ForecastConfig, ForecastError,
    MonitorStatus, Notifier, NotifierConfig, NotifyError, RuntimeConfig, TemperatureProvider,
    TickOutcome, WindowSensor, WindowState,
};

#[derive(Clone)]
struct AppState {
    status: Arc<Mutex<MonitorStatus>>,
    window_open: Arc<AtomicBool>,
    hour_override: Arc<Mutex<Option<u8>>>,
    reset_requested: Arc<AtomicBool>,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ConfigUpdateResponse {
    #[serde(rename = "restartRequired")]
    restart_required: bool,
    config: RuntimeConfig,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    #[serde(rename = "resetRequested")]
    reset_requested: bool,
}

/// Wall clock in the configured timezone. The status API can pin the hour to
/// exercise evening behaviour during the day.
struct SimulatedClock {
    timezone: Tz,
    hour_override: Arc<Mutex<Option<u8>>>,
}

/// Stands in for the reed switch; the "LED" is a log line on every change.
struct SimulatedWindow {
    open: Arc<AtomicBool>,
    indicated: Option<WindowState>,
}

struct HttpForecast {
    client: reqwest::blocking::Client,
    config: ForecastConfig,
}

struct HttpNotifier {
    client: reqwest::blocking::Client,
    config: NotifierConfig,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);
    runtime.sanitize();

    for problem in runtime.monitor.validate() {
        warn!("monitor config: {problem}");
    }
    if !runtime.forecast.is_configured() {
        warn!("forecast source not configured; set FORECAST_API_KEY and FORECAST_LOCATION");
    }
    if !runtime.notifier.is_configured() {
        warn!("notifier not configured; set IFTTT_KEY");
    }

    let timezone: Tz = runtime
        .timezone
        .parse()
        .map_err(|_| anyhow!("invalid timezone `{}`", runtime.timezone))?;

    let window_open = std::env::var("WINDOW_OPEN")
        .ok()
        .and_then(|value| parse_window_value(&value))
        .unwrap_or(false);

    let engine = DecisionEngine::new(runtime.monitor.clone());
    let app_state = AppState {
        status: Arc::new(Mutex::new(MonitorStatus::new(
            engine.status(),
            &runtime.timezone,
        ))),
        window_open: Arc::new(AtomicBool::new(window_open)),
        hour_override: Arc::new(Mutex::new(None)),
        reset_requested: Arc::new(AtomicBool::new(false)),
        store,
    };

    spawn_poll_loop(app_state.clone(), engine, &runtime, timezone)?;

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route(
            "/api/config",
            get(handle_get_config).put(handle_put_config),
        )
        .route("/api/window", put(handle_put_window))
        .route("/api/clock", put(handle_put_clock))
        .route("/api/reset", post(handle_post_reset))
        .with_state(app_state);

    let port = std::env::var("MONITOR_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind monitor server at {addr}"))?;

    info!("monitor listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_poll_loop(
    app_state: AppState,
    mut engine: DecisionEngine,
    runtime: &RuntimeConfig,
    timezone: Tz,
) -> anyhow::Result<()> {
    let forecast_config = runtime.forecast.clone();
    let notifier_config = runtime.notifier.clone();
    let http_timeout = Duration::from_millis(runtime.monitor.http_timeout_ms);
    let poll_interval = Duration::from_millis(runtime.monitor.poll_interval_ms);

    thread::Builder::new()
        .name("poll-loop".into())
        .spawn(move || {
            // The blocking client runs its own runtime, so it is built off the tokio workers.
            let client = match reqwest::blocking::Client::builder()
                .timeout(http_timeout)
                .build()
            {
                Ok(client) => client,
                Err(err) => {
                    warn!("failed to build http client, poll loop stopped: {err}");
                    return;
                }
            };

            let clock = SimulatedClock {
                timezone,
                hour_override: app_state.hour_override.clone(),
            };
            let mut window = SimulatedWindow {
                open: app_state.window_open.clone(),
                indicated: None,
            };
            let mut forecast = HttpForecast {
                client: client.clone(),
                config: forecast_config,
            };
            let mut notifier = HttpNotifier {
                client,
                config: notifier_config,
            };

            info!(
                "poll loop started (every {}s, cutoff {}:00, threshold {})",
                poll_interval.as_secs(),
                engine.config().cutoff_hour,
                engine.config().minimum_safe_temp,
            );

            loop {
                if app_state.reset_requested.swap(false, Ordering::Relaxed) {
                    engine.reset();
                    info!("daily state reset on request");
                }

                let window_state = window.refresh_indicator();
                let outcome = engine.evaluate(&clock, &mut window, &mut forecast, &mut notifier);
                log_outcome(&outcome);

                {
                    let mut status = app_state.status.blocking_lock();
                    status.window = Some(window_state);
                    status.current_hour = clock.current_hour();
                    status.time_synced = true;
                    status.engine = engine.status();
                    status.last_outcome = Some(outcome);
                    status.last_tick_epoch = Some(Utc::now().timestamp());
                    status.ticks = status.ticks.saturating_add(1);
                }

                thread::sleep(poll_interval);
            }
        })
        .context("failed to spawn poll loop thread")?;

    Ok(())
}

fn log_outcome(outcome: &TickOutcome) {
    if outcome.is_idle() {
        debug!("tick: {outcome}");
    } else if outcome.is_failure() {
        warn!("tick: {outcome}");
    } else {
        info!("tick: {outcome}");
    }
}

impl ClockSource for SimulatedClock {
    fn current_hour(&self) -> Option<u8> {
        if let Some(hour) = *self.hour_override.blocking_lock() {
            return Some(hour);
        }
        let local = Utc::now().with_timezone(&self.timezone);
        Some(local.hour() as u8)
    }
}

impl SimulatedWindow {
    fn refresh_indicator(&mut self) -> WindowState {
        let state = WindowState::from_open(self.open.load(Ordering::Relaxed));
        if self.indicated != Some(state) {
            info!(
                "window switch is {}, indicator LED {}",
                state.as_str(),
                if state.is_open() { "on" } else { "off" }
            );
            self.indicated = Some(state);
        }
        state
    }
}

impl WindowSensor for SimulatedWindow {
    fn is_open(&mut self) -> bool {
        self.refresh_indicator().is_open()
    }
}

impl HttpForecast {
    fn fetch(&self) -> Result<i32, ForecastError> {
        let url = self.config.request_url()?;
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ForecastError::Transport(err.to_string()))?;
        forecast::check_status(response.status().as_u16())?;
        read_tonight_low(response)
    }
}

impl TemperatureProvider for HttpForecast {
    fn fetch_tonight_low(&mut self) -> Result<i32, ForecastError> {
        let result = self.fetch();
        match &result {
            Ok(low) => info!("low temperature for tonight is {low}"),
            Err(err) => warn!("forecast fetch failed: {err}"),
        }
        result
    }
}

impl HttpNotifier {
    fn deliver(&self, temperature: i32) -> Result<(), NotifyError> {
        let url = self.config.request_url(temperature)?;
        let (header, content_type) = notify::CONTENT_TYPE_HEADER;
        let response = self
            .client
            .post(url)
            .header(header, content_type)
            .body("")
            .send()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        notify::check_status(response.status().as_u16())
    }
}

impl Notifier for HttpNotifier {
    fn send(&mut self, temperature: i32) -> Result<(), NotifyError> {
        let result = self.deliver(temperature);
        match &result {
            Ok(()) => info!("open-window notification delivered ({temperature})"),
            Err(err) => warn!("open-window notification failed: {err}"),
        }
        result
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.lock().await.clone();
    Json(status)
}

async fn handle_put_window(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(open) = parse_window_value(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid window value. Use 'open' or 'closed'",
        );
    };

    let window = WindowState::from_open(open);
    state.window_open.store(open, Ordering::Relaxed);
    state.status.lock().await.window = Some(window);
    info!("simulated window switch set to {}", window.as_str());

    handle_get_status(State(state)).await.into_response()
}

async fn handle_put_clock(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("hour") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'hour' parameter");
    };
    let Some(hour_override) = parse_hour_value(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid hour. Use 0-23 or 'auto'",
        );
    };

    *state.hour_override.lock().await = hour_override;
    match hour_override {
        Some(hour) => info!("simulated clock pinned to hour {hour}"),
        None => info!("simulated clock follows wall time"),
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_post_reset(State(state): State<AppState>) -> impl IntoResponse {
    // Applied by the poll loop before its next evaluation.
    state.reset_requested.store(true, Ordering::Relaxed);
    Json(ResetResponse {
        reset_requested: true,
    })
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.load_runtime_config().await {
        Ok(runtime) => Json(runtime.redacted()).into_response(),
        Err(err) => {
            warn!("failed to load runtime config: {err:#}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load runtime config",
            )
        }
    }
}

async fn handle_put_config(
    State(state): State<AppState>,
    Json(update): Json<RuntimeConfig>,
) -> impl IntoResponse {
    if update.timezone.parse::<Tz>().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Unknown timezone");
    }

    let mut runtime = match state.store.load_runtime_config().await {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!("failed to load runtime config for update: {err:#}");
            RuntimeConfig::default()
        }
    };
    let previous = runtime.clone();
    runtime.merge_update(update);

    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist runtime config: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime config",
        );
    }

    Json(ConfigUpdateResponse {
        restart_required: runtime.restart_required(&previous),
        config: runtime.redacted(),
    })
    .into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLOSEWINDOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.closewindow"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(RuntimeConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, runtime.to_json()?).await?;
        Ok(())
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    let env = |key: &str| {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    };

    if let Some(api_key) = env("FORECAST_API_KEY") {
        runtime.forecast.api_key = api_key;
    }
    if let Some(location) = env("FORECAST_LOCATION") {
        runtime.forecast.location = location;
    }
    if let Some(event) = env("IFTTT_EVENT") {
        runtime.notifier.event = event;
    }
    if let Some(key) = env("IFTTT_KEY") {
        runtime.notifier.key = key;
    }
    if let Some(timezone) = env("MONITOR_TIMEZONE") {
        runtime.timezone = timezone;
    }
    if let Some(interval) = env("MONITOR_POLL_INTERVAL_MS").and_then(|value| value.parse().ok()) {
        runtime.monitor.poll_interval_ms = interval;
    }
}

fn parse_window_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "open" | "1" | "true" => Some(true),
        "closed" | "close" | "0" | "false" => Some(false),
        _ => None,
    }
}

// `Some(None)` clears the override.
fn parse_hour_value(value: &str) -> Option<Option<u8>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("auto") {
        return Some(None);
    }
    value
        .parse::<u8>()
        .ok()
        .filter(|hour| *hour < 24)
        .map(Some)
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
