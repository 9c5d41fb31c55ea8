use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::watch,
    time::{Interval, MissedTickBehavior},
};
use tracing::{info, warn};

use remote_hvac_common::{ConnectionPhase, RuntimeConfig, SensorSample};

use crate::{
    bus::{Bus, BusOutlets, ChannelStats, Outlet},
    connector::{Connector, ConnectorRequest, InboundRouter},
    control::{ControlLoop, StatusSinks},
    dial::DialInput,
    display::{DisplaySink, DisplaySnapshot},
    ota::{OtaHook, OtaJobEvent},
    peripherals::{
        LogDisplay, RingView, SimulatedWeather, VirtualButtons, VirtualHardware, VirtualRotary,
        BASE_PRESSURE,
    },
    sensor::SensorFeed,
    shadow_applier::ShadowApplier,
    transport::RumqttTransport,
};

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_HUMIDITY: f32 = 40.0;
const MAX_ROTATE_STEPS: i32 = 100;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct AppState {
    hardware: Arc<VirtualHardware>,
    outlets: BusOutlets,
    ota: Arc<OtaHook>,
    connector_phase: watch::Receiver<ConnectionPhase>,
    display: watch::Receiver<DisplaySnapshot>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct AcceptedBody {
    accepted: bool,
}

#[derive(Debug, Serialize)]
struct StatusView {
    display: DisplaySnapshot,
    connector: &'static str,
    ring: RingView,
    #[serde(rename = "framesDrawn")]
    frames_drawn: u64,
    channels: Vec<ChannelStats>,
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
    runtime.validate().context("invalid runtime config")?;

    let Bus {
        outlets,
        control,
        connector,
        display,
        shadow_delta,
        dial_target,
        spi1,
        spi2,
    } = Bus::new(&runtime.bus);
    let hardware = Arc::new(VirtualHardware::default());
    let timing = runtime.timing.clone();

    let sensor = SensorFeed::new(
        SimulatedWeather::new(Arc::clone(&hardware)),
        spi1.clone(),
        outlets.hvac_sensor.clone(),
        outlets.hvac_target.clone(),
        runtime.control.seed_target_from_first_sample,
    );
    spawn_sensor_feed(sensor, Duration::from_millis(timing.sensor_period_ms));

    let control_loop = ControlLoop::new(
        VirtualButtons::new(Arc::clone(&hardware)),
        control,
        StatusSinks {
            display: outlets.display.clone(),
            connector: outlets.connector.clone(),
            dial_target: outlets.dial_target.clone(),
        },
    );
    spawn_control_loop(control_loop, Duration::from_millis(timing.control_period_ms));

    let dial = DialInput::new(
        VirtualRotary::new(Arc::clone(&hardware)),
        spi1,
        Duration::from_millis(timing.dial_lock_wait_ms),
        dial_target,
        outlets.hvac_target.clone(),
    );
    spawn_dial(dial, Duration::from_millis(timing.dial_period_ms));

    let (frames_tx, frames_rx) = watch::channel(DisplaySnapshot::default());
    let sink = DisplaySink::new(
        LogDisplay::new(Arc::clone(&hardware), frames_tx),
        display,
        spi2,
    );
    spawn_display(sink, Duration::from_millis(timing.display_period_ms));

    let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::Init);
    let router = InboundRouter::new(
        outlets.hvac_fan.clone(),
        outlets.hvac_target.clone(),
        outlets.shadow_delta.clone(),
    );
    let cloud = Connector::new(
        RumqttTransport::new(runtime.device.client_id.clone()),
        &runtime,
        router,
        connector,
        outlets.display.connection.clone(),
        phase_tx,
    );
    spawn_connector(cloud, Duration::from_millis(timing.connector_period_ms));

    let applier = ShadowApplier::new(
        shadow_delta,
        outlets.hvac_fan.clone(),
        outlets.hvac_target.clone(),
        Duration::from_millis(timing.shadow_pacing_ms),
    );
    tokio::spawn(applier.run());

    let app_state = AppState {
        hardware,
        outlets: outlets.clone(),
        ota: Arc::new(OtaHook::new(outlets.connector_requests.clone())),
        connector_phase: phase_rx.clone(),
        display: frames_rx,
    };

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/buttons/hvac", post(handle_power_button))
        .route("/api/buttons/fan", post(handle_fan_button))
        .route("/api/dial/press", post(handle_dial_press))
        .route("/api/dial/rotate", post(handle_dial_rotate))
        .route("/api/sensor", post(handle_sensor_override))
        .route("/api/connector/disconnect", post(handle_connector_disconnect))
        .route("/api/ota/event", post(handle_ota_event))
        .with_state(app_state);

    let port = std::env::var("HVAC_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        thing = %runtime.device.thing_name,
        sync_mode = ?runtime.connector.sync_mode,
        "remote hvac controller listening on http://{addr}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(outlets.connector_requests, phase_rx))
        .await?;
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Ok(thing) = std::env::var("HVAC_THING_NAME") {
        runtime.device.thing_name = thing;
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_sensor_feed(mut feed: SensorFeed<SimulatedWeather>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            feed.tick();
        }
    });
}

fn spawn_control_loop(mut control: ControlLoop<VirtualButtons>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            control.tick();
        }
    });
}

fn spawn_dial(mut dial: DialInput<VirtualRotary>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            dial.tick().await;
        }
    });
}

fn spawn_display(mut sink: DisplaySink<LogDisplay>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            sink.tick();
        }
    });
}

fn spawn_connector(mut connector: Connector<RumqttTransport>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            connector.tick().await;
        }
    });
}

async fn shutdown_signal(
    requests: Outlet<ConnectorRequest>,
    mut phase: watch::Receiver<ConnectionPhase>,
) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }

    info!("shutdown requested, closing broker session");
    requests.try_send(ConnectorRequest::Shutdown);
    let closed = tokio::time::timeout(
        SHUTDOWN_GRACE,
        phase.wait_for(|phase| *phase == ConnectionPhase::Inactive),
    )
    .await
    .is_ok_and(|result| result.is_ok());
    if !closed {
        warn!("connector still open after {SHUTDOWN_GRACE:?}");
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let display = *state.display.borrow();
    let connector = state.connector_phase.borrow().as_str();

    Json(StatusView {
        display,
        connector,
        ring: state.hardware.ring(),
        frames_drawn: state.hardware.frames_drawn(),
        channels: state.outlets.stats(),
    })
}

async fn handle_power_button(State(state): State<AppState>) -> impl IntoResponse {
    state.hardware.click_power();
    accepted_response()
}

async fn handle_fan_button(State(state): State<AppState>) -> impl IntoResponse {
    state.hardware.click_fan();
    accepted_response()
}

async fn handle_dial_press(State(state): State<AppState>) -> impl IntoResponse {
    state.hardware.press_stick();
    accepted_response()
}

async fn handle_dial_rotate(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("steps") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'steps' parameter");
    };
    let Ok(steps) = value.parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid step count");
    };
    if steps == 0 || steps.abs() > MAX_ROTATE_STEPS {
        return error_response(StatusCode::BAD_REQUEST, "Step count out of range");
    }

    state.hardware.rotate(steps);
    accepted_response()
}

/// With no `temp` the override is cleared and the simulated readings resume.
async fn handle_sensor_override(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("temp") else {
        state.hardware.set_sensor_override(None);
        return accepted_response();
    };
    let Some(temperature) = value.parse::<f32>().ok().filter(|temp| temp.is_finite()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    let humidity = match params.get("humidity") {
        Some(raw) => match raw.parse::<f32>().ok().filter(|h| (0.0..=100.0).contains(h)) {
            Some(humidity) => humidity,
            None => return error_response(StatusCode::BAD_REQUEST, "Invalid humidity value"),
        },
        None => DEFAULT_HUMIDITY,
    };

    state
        .hardware
        .set_sensor_override(Some(SensorSample::new(temperature, humidity, BASE_PRESSURE)));
    accepted_response()
}

async fn handle_connector_disconnect(State(state): State<AppState>) -> impl IntoResponse {
    if !state
        .outlets
        .connector_requests
        .try_send(ConnectorRequest::Disconnect)
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Connector request queue full");
    }
    accepted_response()
}

async fn handle_ota_event(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(kind) = params.get("kind") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'kind' parameter");
    };
    let event = match kind.parse::<OtaJobEvent>() {
        Ok(event) => event,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    state.ota.on_job_event(event);
    accepted_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.remote-hvac"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn accepted_response() -> axum::response::Response {
    (StatusCode::ACCEPTED, Json(AcceptedBody { accepted: true })).into_response()
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
