//! Snapshot building for network transmission

use crate::ws::protocol::{
    BallView, GameStateView, GameStatus, GameSummary, GameUpdateKind, PaddlesView, ScoreView,
    ServerMsg,
};

use super::{Match, MatchEvent, MatchState, Side};

/// Build the state broadcast for a match
pub fn build(game: &Match) -> ServerMsg {
    ServerMsg::GameState(GameStateView {
        ball: BallView {
            x: game.ball.x,
            y: game.ball.y,
        },
        paddles: PaddlesView {
            left: game.left.y,
            right: game.right.y,
        },
        score: ScoreView {
            left: game.score(Side::Left),
            right: game.score(Side::Right),
        },
        winner: game.winner(),
    })
}

/// Status notification for an engine event, if clients care about it
pub fn status_for(event: &MatchEvent) -> Option<GameStatus> {
    match event {
        MatchEvent::Starting => Some(GameStatus::GameStarting),
        MatchEvent::Started => Some(GameStatus::GameInProgress),
        MatchEvent::Scored { .. } => Some(GameStatus::PointScored),
        MatchEvent::Served { .. } => None,
        MatchEvent::Paused => Some(GameStatus::GamePaused),
        MatchEvent::GameOver { winner: Side::Left } => Some(GameStatus::GameOverLeft),
        MatchEvent::GameOver { winner: Side::Right } => Some(GameStatus::GameOverRight),
    }
}

/// Lobby view of a room's match
pub fn summary(room_id: &str, game: &Match) -> GameSummary {
    GameSummary {
        id: room_id.to_string(),
        state: game.state(),
        player_count: game.player_count(),
        score: ScoreView {
            left: game.score(Side::Left),
            right: game.score(Side::Right),
        },
        winner: game.winner(),
    }
}

/// Lobby feed entry for an engine event
pub fn update_for(event: &MatchEvent) -> Option<GameUpdateKind> {
    match event {
        MatchEvent::Scored { .. } => Some(GameUpdateKind::ScoreUpdate),
        MatchEvent::GameOver { .. } => Some(GameUpdateKind::GameOver),
        _ => None,
    }
}

/// Whether a tick's outcome should be pushed to members
pub fn should_send(game: &Match, events: &[MatchEvent]) -> bool {
    game.state() == MatchState::Playing || !events.is_empty()
}
