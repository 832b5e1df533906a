//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::ball::{Ball, BALL_RADIUS};
use crate::game::paddle::{Paddle, LEFT_PADDLE_X, PADDLE_HEIGHT, RIGHT_PADDLE_X};
use crate::game::r#match::POINTS_TO_WIN;
use crate::util::time::uptime_secs;
use crate::ws::protocol::GameSummary;
use crate::ws::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/specs", get(specs_handler))
        .route("/games", get(games_handler))
        .route("/games/:id", get(game_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origins))
        .with_state(state)
}

/// CORS for the configured client origins, or any origin when none are set
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins: Vec<header::HeaderValue> = origins
        .iter()
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed_origins)
    }
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.len(),
        active_players: state.rooms.total_players(),
    })
}

// ============================================================================
// Board specs
// ============================================================================

#[derive(Debug, Serialize)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize)]
struct BallSpec {
    radius: f64,
    initial: Point,
}

#[derive(Debug, Serialize)]
struct PaddleInitial {
    y: f64,
}

#[derive(Debug, Serialize)]
struct CollisionBounds {
    left: f64,
    right: f64,
}

#[derive(Debug, Serialize)]
struct PaddleSpec {
    height: f64,
    initial: PaddleInitial,
    collision_bounds: CollisionBounds,
}

#[derive(Debug, Serialize)]
struct Bounds {
    width: f64,
    height: f64,
}

#[derive(Debug, Serialize)]
struct BoardSpec {
    points_to_win: u32,
    bounds: Bounds,
}

/// Constants a client needs to lay out the playing field
#[derive(Debug, Serialize)]
struct SpecsResponse {
    ball: BallSpec,
    paddle: PaddleSpec,
    game: BoardSpec,
}

async fn specs_handler() -> Json<SpecsResponse> {
    let ball = Ball::new();
    let paddle = Paddle::new(LEFT_PADDLE_X);

    Json(SpecsResponse {
        ball: BallSpec {
            radius: BALL_RADIUS,
            initial: Point {
                x: ball.x,
                y: ball.y,
            },
        },
        paddle: PaddleSpec {
            height: PADDLE_HEIGHT,
            initial: PaddleInitial { y: paddle.y },
            collision_bounds: CollisionBounds {
                left: LEFT_PADDLE_X,
                right: RIGHT_PADDLE_X,
            },
        },
        game: BoardSpec {
            points_to_win: POINTS_TO_WIN,
            // Coordinates are normalised to the unit square
            bounds: Bounds {
                width: 1.0,
                height: 1.0,
            },
        },
    })
}

// ============================================================================
// Game listing
// ============================================================================

async fn games_handler(State(state): State<AppState>) -> Json<Vec<GameSummary>> {
    Json(state.rooms.summaries())
}

async fn game_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GameSummary>, StatusCode> {
    let room = state.rooms.get(&id).map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(room.summary()))
}
