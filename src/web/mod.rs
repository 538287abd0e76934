//! HTTP surface: a live city behind JSON routes and an SSE event stream.

use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{info, warn};

use crate::{
    engine::{Engine, EngineBuilder},
    grid::{GridSnapshot, Tile, TileType},
    scenario::Scenario,
    snapshot::{load_or_none, SaveData},
    systems::PowerStatus,
    world::CitySnapshot,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<Engine>>,
    broadcaster: broadcast::Sender<String>,
}

impl AppState {
    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub load: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEnvelope {
    pub scenario: String,
    pub running: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub city: CitySnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileInfo {
    pub x: i32,
    pub y: i32,
    pub tile: Tile,
    pub power: PowerStatus,
}

/// One drag stroke: every listed tile painted with `tile`.
#[derive(Deserialize)]
pub struct PaintRequest {
    pub tile: TileType,
    pub tiles: Vec<(i32, i32)>,
}

#[derive(Serialize)]
pub struct PaintResponse {
    pub painted: usize,
    pub recorded: bool,
}

#[derive(Serialize)]
pub struct ActionResponse {
    pub ok: bool,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        load,
        host,
        port,
    } = config;

    let world = scenario.build_world()?;
    let mut engine = EngineBuilder::new(scenario.engine_settings(), world)
        .with_city_systems(&scenario.config)
        .build();
    if let Some(save) = load.as_deref().and_then(load_or_none) {
        engine.load(save)?;
    }

    let (tx, _) = broadcast::channel::<String>(512);
    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        broadcaster: tx,
    };

    tokio::spawn(simulate(state.clone()));

    let router = Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/grid", get(grid))
        .route("/api/tiles/:x/:y", get(tile))
        .route("/api/events", get(stream_events))
        .route("/api/paint", post(paint))
        .route("/api/undo", post(undo))
        .route("/api/redo", post(redo))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/save", get(export_save))
        .route("/api/load", post(import_save))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    info!(%addr, scenario = %scenario.name, "city server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Drives the scheduler from the wall clock and fans events out to SSE
/// subscribers.
async fn simulate(state: AppState) {
    let start = Instant::now();
    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    loop {
        interval.tick().await;
        let events = {
            let mut engine = state.engine();
            if let Err(err) = engine.frame(start.elapsed()) {
                warn!(error = %err, "tick failed");
            }
            engine.drain_events()
        };
        for event in events {
            if let Ok(payload) = serde_json::to_string(&event) {
                // No subscribers is fine.
                let _ = state.broadcaster.send(payload);
            }
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down city server");
}

async fn latest_state(State(state): State<AppState>) -> Json<StateEnvelope> {
    let engine = state.engine();
    Json(StateEnvelope {
        scenario: engine.scenario_name().to_string(),
        running: engine.is_running(),
        can_undo: engine.history().can_undo(),
        can_redo: engine.history().can_redo(),
        city: engine.snapshot(),
    })
}

async fn grid(State(state): State<AppState>) -> Json<GridSnapshot> {
    Json(state.engine().world().grid().snapshot())
}

async fn tile(
    State(state): State<AppState>,
    Path((x, y)): Path<(i32, i32)>,
) -> Result<Json<TileInfo>, StatusCode> {
    let engine = state.engine();
    let world = engine.world();
    let tile = world.grid().get_tile(x, y).ok_or(StatusCode::NOT_FOUND)?;
    let power = world
        .power()
        .power_status(world.grid(), x, y)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(TileInfo { x, y, tile, power }))
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

async fn paint(
    State(state): State<AppState>,
    Json(request): Json<PaintRequest>,
) -> Json<PaintResponse> {
    let mut engine = state.engine();
    engine.begin_stroke(request.tile);
    let mut painted = 0;
    for (x, y) in request.tiles {
        if engine.paint(x, y) {
            painted += 1;
        }
    }
    let recorded = engine.end_stroke();
    Json(PaintResponse { painted, recorded })
}

async fn undo(State(state): State<AppState>) -> Json<ActionResponse> {
    Json(ActionResponse {
        ok: state.engine().undo(),
    })
}

async fn redo(State(state): State<AppState>) -> Json<ActionResponse> {
    Json(ActionResponse {
        ok: state.engine().redo(),
    })
}

async fn pause(State(state): State<AppState>) -> Json<ActionResponse> {
    state.engine().pause();
    Json(ActionResponse { ok: true })
}

async fn resume(State(state): State<AppState>) -> Json<ActionResponse> {
    state.engine().resume();
    Json(ActionResponse { ok: true })
}

async fn export_save(State(state): State<AppState>) -> Response {
    let save = state.engine().serialize();
    match save.to_json() {
        Ok(json) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"city.json\""),
            ],
            Bytes::from(json),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "save export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn import_save(State(state): State<AppState>, body: Bytes) -> Response {
    let save = std::str::from_utf8(&body)
        .map_err(|err| err.to_string())
        .and_then(|json| SaveData::from_json(json).map_err(|err| err.to_string()));
    let result = save.and_then(|save| state.engine().load(save).map_err(|err| err.to_string()));
    match result {
        Ok(()) => Json(ActionResponse { ok: true }).into_response(),
        Err(message) => {
            warn!(error = %message, "rejected save import");
            (StatusCode::BAD_REQUEST, message).into_response()
        }
    }
}
