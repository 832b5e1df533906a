//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::{Direction, MatchState, Side};

/// Raw inbound envelope, before the payload is interpreted
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Envelope-level decode failures; never answered on the wire
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Command types accepted from clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetName,
    GetGames,
    JoinRoom,
    CreateRoom,
    MovePaddle,
}

impl CommandKind {
    /// Map a wire type to a command; unknown types yield `None`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "set_name" => Some(Self::SetName),
            "get_games" => Some(Self::GetGames),
            "join_room" => Some(Self::JoinRoom),
            "create_room" => Some(Self::CreateRoom),
            "move_paddle" => Some(Self::MovePaddle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetName => "set_name",
            Self::GetGames => "get_games",
            Self::JoinRoom => "join_room",
            Self::CreateRoom => "create_room",
            Self::MovePaddle => "move_paddle",
        }
    }
}

/// Messages sent from client to server, with validated payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    SetName(String),
    GetGames,
    JoinRoom(String),
    CreateRoom,
    MovePaddle(Direction),
}

impl ClientMsg {
    /// Interpret the payload for an already-admitted command kind
    pub fn decode(kind: CommandKind, data: Option<Value>) -> Result<Self, CommandError> {
        match kind {
            CommandKind::SetName => match data {
                Some(Value::String(name)) if !name.is_empty() => Ok(Self::SetName(name)),
                _ => Err(CommandError::EmptyName),
            },
            CommandKind::GetGames => Ok(Self::GetGames),
            CommandKind::JoinRoom => match data {
                Some(Value::String(room_id)) if !room_id.is_empty() => Ok(Self::JoinRoom(room_id)),
                _ => Err(CommandError::InvalidRoomId),
            },
            CommandKind::CreateRoom => Ok(Self::CreateRoom),
            CommandKind::MovePaddle => match data {
                Some(Value::String(raw)) => Direction::parse(&raw)
                    .map(Self::MovePaddle)
                    .ok_or(CommandError::InvalidDirection),
                _ => Err(CommandError::InvalidMoveData),
            },
        }
    }
}

/// Broad class of a rejected command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not allowed in the session's current phase
    Phase,
    /// Payload had the wrong shape or value
    Validation,
    /// Referenced room does not exist or cannot take the session
    NotFound,
}

/// Command rejections; the display text is what the client receives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Name must be set first")]
    NameRequired,

    #[error("You must be in a game to perform this action")]
    NotInGame,

    #[error("You cannot perform this action while in a game")]
    InGame,

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Invalid join_room data")]
    InvalidRoomId,

    #[error("Invalid move_paddle data")]
    InvalidMoveData,

    #[error("Invalid move_paddle direction")]
    InvalidDirection,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Game is already over")]
    GameFinished,
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NameRequired | Self::NotInGame | Self::InGame => ErrorKind::Phase,
            Self::EmptyName
            | Self::InvalidRoomId
            | Self::InvalidMoveData
            | Self::InvalidDirection => ErrorKind::Validation,
            Self::RoomNotFound | Self::RoomFull | Self::GameFinished => ErrorKind::NotFound,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Identifiers of all open rooms
    GetGamesResponse(Vec<String>),

    /// Room the session just joined
    JoinRoomResponse(String),

    /// Room the session just created (and joined)
    CreateRoomResponse(String),

    /// Echo of an accepted paddle move
    MovePaddleResponse(Direction),

    /// Human-readable rejection
    Error(String),

    /// Positions and score, broadcast to room members
    GameState(GameStateView),

    /// Lifecycle notification, broadcast to room members
    GameStatus(GameStatus),

    /// Lobby feed entry, sent to named sessions outside any room
    GameUpdate(GameUpdate),
}

impl From<CommandError> for ServerMsg {
    fn from(err: CommandError) -> Self {
        Self::Error(err.to_string())
    }
}

/// Match lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    WaitingForPlayers,
    GameStarting,
    GameInProgress,
    PointScored,
    GamePaused,
    GameOverLeft,
    GameOverRight,
}

/// Snapshot of a match as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub ball: BallView,
    pub paddles: PaddlesView,
    pub score: ScoreView,
    pub winner: Option<Side>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallView {
    pub x: f64,
    pub y: f64,
}

/// Vertical centre of each paddle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddlesView {
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreView {
    pub left: u32,
    pub right: u32,
}

/// What changed in a lobby feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameUpdateKind {
    NewGame,
    PlayerJoined,
    PlayerLeft,
    ScoreUpdate,
    GameOver,
}

/// Lobby-facing summary of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: String,
    pub state: MatchState,
    pub player_count: usize,
    pub score: ScoreView,
    pub winner: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub kind: GameUpdateKind,
    #[serde(flatten)]
    pub game: GameSummary,
}
