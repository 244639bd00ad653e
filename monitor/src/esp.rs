use core::convert::TryInto;
use std::{
    cell::Cell,
    fmt::Debug,
    io,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::{Datelike, Timelike, Utc};
use chrono_tz::Tz;
use embedded_svc::{
    http::{client::Client as HttpClient, Headers, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    ipv4::{
        ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
        Configuration as IpConfiguration, Mask, Subnet,
    },
    log::EspLogger,
    netif::{EspNetif, NetifConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::{EspSntp, SntpConf, SyncStatus},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use serde::Serialize;

use closewindow_common::{
    forecast, notify, read_tonight_low, ClockSource, DecisionEngine, ForecastConfig, ForecastError,
    GuardedReader, HardwareConfig, MonitorStatus, NetworkConfig, Notifier, NotifierConfig,
    NotifyError, RuntimeConfig, TemperatureProvider, TickOutcome, WindowSensor, WindowState,
};

const NVS_NAMESPACE: &str = "closewindow";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const MAX_HTTP_BODY: usize = 4096;
// Fed between HTTP steps and before every body read. A single step (connect
// plus response headers) is bounded by twice the client timeout, at most 120 s.
const WATCHDOG_TIMEOUT_SEC: u32 = 150;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const WIFI_RESTART_GRACE_MS: u64 = 1_800_000;
// The RTC boots in 1970; anything this recent came from SNTP.
const MIN_SYNCED_YEAR: i32 = 2024;

struct StatusLed {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    lit: bool,
}

/// Reed switch on a pulled-up input, with the LED mirroring what it reads.
struct GpioWindowSensor {
    input: PinDriver<'static, AnyIOPin, Input>,
    open_level_low: bool,
    led: Option<StatusLed>,
    led_active_low: bool,
}

struct SntpClock {
    sntp: EspSntp<'static>,
    timezone: Tz,
    synced: Cell<bool>,
}

struct EspForecast {
    config: ForecastConfig,
    timeout: Duration,
}

struct EspNotifier {
    config: NotifierConfig,
    timeout: Duration,
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ConfigUpdateResponse {
    #[serde(rename = "restartRequired")]
    restart_required: bool,
    config: RuntimeConfig,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
        lock: Arc::new(Mutex::new(())),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_compile_time_defaults(&mut runtime);
    runtime.sanitize();

    info!(
        "NVS config loaded: ssid=`{}`, static_ip={}, window=GPIO{}, led=GPIO{}, tz=`{}`",
        runtime.network.wifi_ssid,
        runtime.network.use_static_ip,
        runtime.hardware.window_pin,
        runtime.hardware.led_pin,
        runtime.timezone,
    );
    for problem in runtime.monitor.validate() {
        warn!("monitor config: {problem}");
    }
    if !runtime.forecast.is_configured() {
        warn!("forecast source not configured; low temperature will be unavailable");
    }
    if !runtime.notifier.is_configured() {
        warn!("notifier not configured; notifications will fail");
    }
    if !runtime.network.has_station_credentials() {
        return Err(anyhow!(
            "wifi credentials missing; build with WIFI_SSID/WIFI_PASS or store them in NVS"
        ));
    }

    let timezone: Tz = runtime.timezone.parse().unwrap_or_else(|_| {
        warn!("unknown timezone `{}`, using UTC", runtime.timezone);
        Tz::UTC
    });

    let Peripherals { modem, .. } = Peripherals::take()?;

    let mut window = GpioWindowSensor::new(&runtime.hardware)?;
    window.refresh_indicator();

    let mut wifi = start_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    if let Err(err) = connect_with_retries(&mut wifi, &runtime.network) {
        warn!("{err:#}; continuing offline and retrying on each tick");
    }
    disable_wifi_power_save();

    let mut sntp_conf = SntpConf::default();
    sntp_conf.servers[0] = runtime.network.ntp_server.as_str();
    let sntp = EspSntp::new(&sntp_conf).context("failed to start SNTP")?;
    info!("SNTP initialized with {}", runtime.network.ntp_server);
    let clock = SntpClock {
        sntp,
        timezone,
        synced: Cell::new(false),
    };

    let http_timeout = Duration::from_millis(runtime.monitor.http_timeout_ms);
    let mut forecast = EspForecast {
        config: runtime.forecast.clone(),
        timeout: http_timeout,
    };
    let mut notifier = EspNotifier {
        config: runtime.notifier.clone(),
        timeout: http_timeout,
    };

    let mut engine = DecisionEngine::new(runtime.monitor.clone());
    let status = Arc::new(Mutex::new(MonitorStatus::new(
        engine.status(),
        &runtime.timezone,
    )));
    let server = create_http_server(status.clone(), nvs_store)?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    // Keep services alive for the program lifetime.
    let _server = server;
    let poll_secs = (runtime.monitor.poll_interval_ms / 1000).max(1);
    let mut wifi_disconnected_since: Option<Instant> = None;

    info!(
        "poll loop started (every {poll_secs}s, cutoff {}:00, threshold {})",
        engine.config().cutoff_hour,
        engine.config().minimum_safe_temp,
    );

    loop {
        feed_watchdog();
        maintain_wifi(&mut wifi, &mut wifi_disconnected_since);
        feed_watchdog();

        let window_state = window.refresh_indicator();
        let outcome = engine.evaluate(&clock, &mut window, &mut forecast, &mut notifier);
        log_outcome(&outcome);

        if let Ok(mut status) = status.lock() {
            let synced = clock.is_synced();
            status.window = Some(window_state);
            status.current_hour = clock.current_hour();
            status.time_synced = synced;
            status.engine = engine.status();
            status.last_outcome = Some(outcome);
            status.last_tick_epoch = synced.then(|| Utc::now().timestamp());
            status.ticks = status.ticks.saturating_add(1);
        }

        for _ in 0..poll_secs {
            feed_watchdog();
            window.refresh_indicator();
            thread::sleep(Duration::from_secs(1));
        }
    }
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

fn ensure_compile_time_defaults(runtime: &mut RuntimeConfig) {
    fill_if_empty(&mut runtime.network.wifi_ssid, option_env!("WIFI_SSID"));
    fill_if_empty(&mut runtime.network.wifi_pass, option_env!("WIFI_PASS"));
    fill_if_empty(&mut runtime.forecast.api_key, option_env!("FORECAST_API_KEY"));
    fill_if_empty(&mut runtime.forecast.location, option_env!("FORECAST_LOCATION"));
    fill_if_empty(&mut runtime.notifier.key, option_env!("IFTTT_KEY"));
    // The event name always has a default, so a build-time value replaces that default too.
    if let Some(event) = option_env!("IFTTT_EVENT") {
        if runtime.notifier.event.trim().is_empty()
            || runtime.notifier.event == NotifierConfig::default().event
        {
            runtime.notifier.event = event.to_string();
        }
    }
}

fn fill_if_empty(field: &mut String, fallback: Option<&str>) {
    if field.is_empty() {
        if let Some(value) = fallback {
            *field = value.to_string();
        }
    }
}

impl GpioWindowSensor {
    fn new(hardware: &HardwareConfig) -> anyhow::Result<Self> {
        let mut input = PinDriver::input(unsafe { AnyIOPin::new(hardware.window_pin) })
            .with_context(|| {
                format!("failed to configure window switch on GPIO{}", hardware.window_pin)
            })?;
        input.set_pull(Pull::Up)?;

        Ok(Self {
            input,
            open_level_low: hardware.window_open_level_low,
            led: init_status_led(hardware.led_pin, hardware.led_active_low),
            led_active_low: hardware.led_active_low,
        })
    }

    fn refresh_indicator(&mut self) -> WindowState {
        let state = WindowState::from_open(self.input.is_low() == self.open_level_low);
        self.set_led(state);
        state
    }

    fn set_led(&mut self, state: WindowState) {
        let Some(led) = self.led.as_mut() else {
            return;
        };

        let desired_on = state.is_open();
        if desired_on == led.lit {
            return;
        }

        let result = if desired_on == self.led_active_low {
            led.pin.set_low()
        } else {
            led.pin.set_high()
        };

        match result {
            Ok(()) => {
                led.lit = desired_on;
                info!("window {}", state.as_str());
            }
            Err(err) => warn!("failed to drive window LED: {err}"),
        }
    }
}

impl WindowSensor for GpioWindowSensor {
    fn is_open(&mut self) -> bool {
        self.refresh_indicator().is_open()
    }
}

fn init_status_led(pin: i32, active_low: bool) -> Option<StatusLed> {
    let driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) };
    match driver {
        Ok(mut pin) => {
            let _ = if active_low { pin.set_high() } else { pin.set_low() };
            Some(StatusLed { pin, lit: false })
        }
        Err(err) => {
            warn!("window LED unavailable on GPIO{pin}: {err}");
            None
        }
    }
}

impl SntpClock {
    /// Sync is latched: SNTP reports completion once, and the wall clock stays valid afterwards.
    fn is_synced(&self) -> bool {
        if !self.synced.get()
            && (self.sntp.get_sync_status() == SyncStatus::Completed
                || Utc::now().year() >= MIN_SYNCED_YEAR)
        {
            self.synced.set(true);
            info!("time synchronised via SNTP");
        }
        self.synced.get()
    }
}

impl ClockSource for SntpClock {
    fn current_hour(&self) -> Option<u8> {
        if !self.is_synced() {
            return None;
        }
        let local = Utc::now().with_timezone(&self.timezone);
        Some(local.hour() as u8)
    }
}

fn http_client(timeout: Duration) -> Result<HttpClient<EspHttpConnection>, String> {
    let http_conf = HttpClientConfiguration {
        timeout: Some(timeout),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    let connection = EspHttpConnection::new(&http_conf).map_err(|err| format!("{err:?}"))?;
    Ok(HttpClient::wrap(connection))
}

/// Exposes an ESP-IDF response body as a `std::io::Read`.
struct EspBody<R>(R);

impl<R> io::Read for EspBody<R>
where
    R: Read,
    R::Error: Debug,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .read(buf)
            .map_err(|err| io::Error::other(format!("{err:?}")))
    }
}

impl EspForecast {
    fn fetch(&self) -> Result<i32, ForecastError> {
        let url = self.config.request_url()?;
        let mut client = http_client(self.timeout).map_err(ForecastError::Transport)?;
        feed_watchdog();
        let request = client
            .request(Method::Get, &url, &[])
            .map_err(|err| ForecastError::Transport(format!("{err:?}")))?;
        let response = request
            .submit()
            .map_err(|err| ForecastError::Transport(format!("{err:?}")))?;
        feed_watchdog();
        forecast::check_status(response.status())?;

        let deadline = Instant::now() + self.timeout * 2;
        let body = GuardedReader::new(EspBody(response), move || {
            feed_watchdog();
            if Instant::now() > deadline {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "forecast download took too long",
                ))
            } else {
                Ok(())
            }
        });
        read_tonight_low(body)
    }
}

impl TemperatureProvider for EspForecast {
    fn fetch_tonight_low(&mut self) -> Result<i32, ForecastError> {
        let result = self.fetch();
        match &result {
            Ok(low) => info!("low temperature for tonight is {low}"),
            Err(err) => warn!("forecast fetch failed: {err}"),
        }
        result
    }
}

impl EspNotifier {
    fn deliver(&self, temperature: i32) -> Result<(), NotifyError> {
        let url = self.config.request_url(temperature)?;
        let mut client = http_client(self.timeout).map_err(NotifyError::Transport)?;
        let headers = [notify::CONTENT_TYPE_HEADER, ("Content-Length", "0")];
        feed_watchdog();
        let request = client
            .request(Method::Post, &url, &headers)
            .map_err(|err| NotifyError::Transport(format!("{err:?}")))?;
        let response = request
            .submit()
            .map_err(|err| NotifyError::Transport(format!("{err:?}")))?;
        feed_watchdog();
        notify::check_status(response.status())
    }
}

impl Notifier for EspNotifier {
    fn send(&mut self, temperature: i32) -> Result<(), NotifyError> {
        let result = self.deliver(temperature);
        match &result {
            Ok(()) => info!("open-window notification delivered ({temperature})"),
            Err(err) => warn!("open-window notification failed: {err}"),
        }
        result
    }
}

fn create_http_server(
    status: Arc<Mutex<MonitorStatus>>,
    nvs_store: NvsStore,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/api/status", Method::Get, move |req| {
        let payload = status
            .lock()
            .map_err(|_| anyhow!("status lock poisoned"))?
            .clone();
        write_json(req, &payload)
    })?;

    {
        let nvs_store = nvs_store.clone();
        server.fn_handler::<anyhow::Error, _>("/api/config", Method::Get, move |req| {
            match nvs_store.load_runtime_config() {
                Ok(runtime) => write_json(req, &runtime.redacted()),
                Err(err) => {
                    warn!("failed to load runtime config: {err:#}");
                    write_error(req, 500, "Failed to load runtime config")
                }
            }
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/api/config", Method::Put, move |mut req| {
        let body = read_request_body(&mut req)?;
        let update: RuntimeConfig = match serde_json::from_slice(&body) {
            Ok(update) => update,
            Err(_) => return write_error(req, 400, "Invalid config payload"),
        };
        if update.timezone.parse::<Tz>().is_err() {
            return write_error(req, 400, "Unknown timezone");
        }

        let mut runtime = nvs_store.load_runtime_config().unwrap_or_default();
        let previous = runtime.clone();
        runtime.merge_update(update);

        if let Err(err) = nvs_store.save_runtime_config(&runtime) {
            warn!("failed to persist runtime config: {err:#}");
            return write_error(req, 500, "Failed to persist runtime config");
        }

        let payload = ConfigUpdateResponse {
            restart_required: runtime.restart_required(&previous),
            config: runtime.redacted(),
        };
        write_json(req, &payload)
    })?;

    Ok(server)
}

fn read_request_body(
    req: &mut esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_error(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn ipv4_from_octets(ip: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])
}

fn build_static_ip_config(network: &NetworkConfig) -> anyhow::Result<Option<NetifConfiguration>> {
    if !network.use_static_ip {
        return Ok(None);
    }

    let static_ip = network
        .static_ip
        .ok_or_else(|| anyhow!("static_ip is required when use_static_ip is true"))?;
    let gateway = network
        .gateway
        .ok_or_else(|| anyhow!("gateway is required when use_static_ip is true"))?;
    let subnet = network
        .subnet
        .ok_or_else(|| anyhow!("subnet is required when use_static_ip is true"))?;

    let mask_ip = ipv4_from_octets(subnet);
    let mask = Mask::try_from(mask_ip).map_err(|_| anyhow!("invalid subnet mask: {}", mask_ip))?;

    let mut conf = NetifConfiguration::wifi_default_client();
    conf.key = "WIFI_STA_STATIC"
        .try_into()
        .map_err(|_| anyhow!("netif key too long"))?;
    conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
        IpClientSettings {
            ip: ipv4_from_octets(static_ip),
            subnet: Subnet {
                gateway: ipv4_from_octets(gateway),
                mask,
            },
            dns: network.dns.map(ipv4_from_octets),
            secondary_dns: network.secondary_dns.map(ipv4_from_octets),
        },
    )));

    Ok(Some(conf))
}

fn start_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

    if let Some(conf) = build_static_ip_config(network)? {
        let sta_netif = EspNetif::new_with_conf(&conf).context("failed to create static IP netif")?;
        esp_wifi
            .swap_netif_sta(sta_netif)
            .context("failed to apply static IP netif configuration")?;
        info!("static IP configuration applied");
    }

    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);
    Ok(wifi)
}

fn connect_with_retries(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    network: &NetworkConfig,
) -> anyhow::Result<()> {
    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected to `{}` on attempt {attempt}", network.wifi_ssid);
                return Ok(());
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        Some(err) => Err(anyhow::Error::from(err).context(format!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
        ))),
        None => Ok(()),
    }
}

/// One reconnect attempt per tick; restarts the device once the link has been down too long.
fn maintain_wifi(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    wifi_disconnected_since: &mut Option<Instant>,
) {
    if is_wifi_station_connected() {
        if wifi_disconnected_since.take().is_some() {
            info!("wifi link restored");
        }
        return;
    }

    let disconnected_since = *wifi_disconnected_since.get_or_insert_with(Instant::now);
    if disconnected_since.elapsed() >= Duration::from_millis(WIFI_RESTART_GRACE_MS) {
        warn!(
            "wifi disconnected for {}s; restarting device for recovery",
            WIFI_RESTART_GRACE_MS / 1000
        );
        thread::sleep(Duration::from_millis(100));
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    warn!("wifi disconnected; reconnecting");
    let _ = wifi.disconnect();
    if let Err(err) = wifi.connect().and_then(|()| wifi.wait_netif_up()) {
        warn!("wifi reconnect failed: {err}");
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("NVS lock poisoned"))?;
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; MAX_HTTP_BODY];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(RuntimeConfig::from_json(value.as_bytes())?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("NVS lock poisoned"))?;
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = serde_json::to_string(runtime)?;
        nvs.set_str(NVS_RUNTIME_KEY, &payload)?;
        Ok(())
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}
