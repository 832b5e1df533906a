//! Per-phase command admission

use super::protocol::{CommandError, CommandKind};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connected, no name yet
    Anonymous,
    /// Named, not seated in a room
    Named,
    /// Seated in a room
    InRoom,
}

/// Decide whether `kind` may run in `phase`.
///
/// Runs before the payload is looked at, so a phase rejection wins over a
/// malformed payload.
pub fn admit(phase: Phase, kind: CommandKind) -> Result<(), CommandError> {
    use CommandKind::*;

    match (phase, kind) {
        (Phase::Anonymous, SetName) => Ok(()),
        (Phase::Anonymous, _) => Err(CommandError::NameRequired),

        (Phase::Named, MovePaddle) => Err(CommandError::NotInGame),
        (Phase::Named, _) => Ok(()),

        (Phase::InRoom, MovePaddle | JoinRoom | CreateRoom) => Ok(()),
        (Phase::InRoom, SetName | GetGames) => Err(CommandError::InGame),
    }
}
