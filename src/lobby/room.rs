//! A single room: one match plus its member connections

use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::r#match::MAX_PLAYERS;
use crate::game::{snapshot, Direction, Match, MatchEvent, MatchState, Side};
use crate::util::time::SharedTime;
use crate::ws::protocol::{
    CommandError, GameStatus, GameSummary, GameUpdate, GameUpdateKind, ServerMsg,
};

/// Outbound queue feeding one connection's writer task
pub type Outbound = mpsc::Sender<ServerMsg>;

/// Lobby-wide stream of room changes
pub type LobbyFeed = broadcast::Sender<GameUpdate>;

/// Everything a room needs to know about a joining session
#[derive(Debug, Clone)]
pub struct Member {
    pub session_id: Uuid,
    pub name: String,
    pub outbound: Outbound,
}

#[derive(Debug)]
struct Seat {
    member: Member,
    side: Side,
}

struct RoomInner {
    game: Match,
    seats: Vec<Seat>,
    /// Set while the room has no members
    emptied_at: Option<Instant>,
}

/// Room lookup and admission failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(String),

    #[error("room {0} is full")]
    Full(String),

    #[error("match in room {0} is over")]
    Finished(String),

    #[error("session is not a member of room {0}")]
    NotMember(String),
}

impl From<RoomError> for CommandError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NotFound(_) => CommandError::RoomNotFound,
            RoomError::Full(_) => CommandError::RoomFull,
            RoomError::Finished(_) => CommandError::GameFinished,
            RoomError::NotMember(_) => CommandError::NotInGame,
        }
    }
}

pub struct Room {
    id: String,
    time: SharedTime,
    feed: LobbyFeed,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: String, time: SharedTime, seed: u64, feed: LobbyFeed) -> Self {
        Self {
            id,
            time,
            feed,
            inner: Mutex::new(RoomInner {
                game: Match::new(seed),
                seats: Vec::with_capacity(MAX_PLAYERS),
                emptied_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().seats.len()
    }

    #[cfg(test)]
    pub fn contains(&self, session_id: Uuid) -> bool {
        self.inner
            .lock()
            .seats
            .iter()
            .any(|s| s.member.session_id == session_id)
    }

    #[cfg(test)]
    pub fn state(&self) -> MatchState {
        self.inner.lock().game.state()
    }

    /// Run `f` against the match under the room lock
    #[cfg(test)]
    pub fn with_match<R>(&self, f: impl FnOnce(&Match) -> R) -> R {
        f(&self.inner.lock().game)
    }

    pub fn summary(&self) -> GameSummary {
        snapshot::summary(&self.id, &self.inner.lock().game)
    }

    /// When the last member left, if the room is currently empty
    pub fn emptied_at(&self) -> Option<Instant> {
        self.inner.lock().emptied_at
    }

    /// Whether a new member could be seated right now
    pub fn check_open(&self) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        Self::ensure_open(&self.id, &inner)
    }

    fn ensure_open(id: &str, inner: &RoomInner) -> Result<(), RoomError> {
        if inner.game.state() == MatchState::GameOver {
            return Err(RoomError::Finished(id.to_string()));
        }
        if inner.seats.len() >= MAX_PLAYERS {
            return Err(RoomError::Full(id.to_string()));
        }
        Ok(())
    }

    /// Seat a member on the first free side and count them in the match
    pub fn admit(&self, member: Member) -> Result<Side, RoomError> {
        let now = self.time.now();
        let mut inner = self.inner.lock();
        Self::ensure_open(&self.id, &inner)?;

        let side = [Side::Left, Side::Right]
            .into_iter()
            .find(|side| inner.seats.iter().all(|s| s.side != *side))
            .ok_or_else(|| RoomError::Full(self.id.clone()))?;

        info!(
            room_id = %self.id,
            session_id = %member.session_id,
            name = %member.name,
            side = %side,
            "Player joined room"
        );

        inner.seats.push(Seat { member, side });
        inner.emptied_at = None;

        let status = match inner.game.add_player(now) {
            Some(event) => snapshot::status_for(&event),
            None => match inner.game.state() {
                MatchState::Waiting => Some(GameStatus::WaitingForPlayers),
                MatchState::Paused => Some(GameStatus::GamePaused),
                _ => None,
            },
        };
        if let Some(status) = status {
            broadcast(&self.id, &inner.seats, &ServerMsg::GameStatus(status));
        }
        self.publish(&inner, GameUpdateKind::PlayerJoined);

        Ok(side)
    }

    /// Remove a member. Returns false if the session was not seated here,
    /// so the match's player count is only ever decremented once per member.
    pub fn leave(&self, session_id: Uuid) -> bool {
        let now = self.time.now();
        let mut inner = self.inner.lock();

        let Some(pos) = inner
            .seats
            .iter()
            .position(|s| s.member.session_id == session_id)
        else {
            return false;
        };
        let seat = inner.seats.remove(pos);

        info!(
            room_id = %self.id,
            session_id = %session_id,
            side = %seat.side,
            "Player left room"
        );

        if let Some(event) = inner.game.remove_player() {
            if let Some(status) = snapshot::status_for(&event) {
                broadcast(&self.id, &inner.seats, &ServerMsg::GameStatus(status));
            }
        }
        if inner.seats.is_empty() {
            inner.emptied_at = Some(now);
        }
        self.publish(&inner, GameUpdateKind::PlayerLeft);
        true
    }

    /// Move the paddle owned by `session_id`
    pub fn move_paddle(&self, session_id: Uuid, direction: Direction) -> Result<Side, RoomError> {
        let mut inner = self.inner.lock();
        let side = inner
            .seats
            .iter()
            .find(|s| s.member.session_id == session_id)
            .map(|s| s.side)
            .ok_or_else(|| RoomError::NotMember(self.id.clone()))?;

        inner.game.move_paddle(side, direction);
        Ok(side)
    }

    /// Advance the match one step and push any changes to members
    pub fn tick(&self) -> Vec<MatchEvent> {
        let now = self.time.now();
        let mut inner = self.inner.lock();
        let events = inner.game.tick(now);

        for event in &events {
            debug!(room_id = %self.id, event = ?event, "Match event");
            if let MatchEvent::GameOver { winner } = event {
                info!(
                    room_id = %self.id,
                    winner = %winner,
                    ticks = inner.game.ticks(),
                    "Match finished"
                );
            }
            if let Some(status) = snapshot::status_for(event) {
                broadcast(&self.id, &inner.seats, &ServerMsg::GameStatus(status));
            }
            if let Some(kind) = snapshot::update_for(event) {
                self.publish(&inner, kind);
            }
        }

        if snapshot::should_send(&inner.game, &events) {
            broadcast(&self.id, &inner.seats, &snapshot::build(&inner.game));
        }

        events
    }

    fn publish(&self, inner: &RoomInner, kind: GameUpdateKind) {
        // No lobby subscribers is not an error
        let _ = self.feed.send(GameUpdate {
            kind,
            game: snapshot::summary(&self.id, &inner.game),
        });
    }
}

/// Queue a message for every seated member without blocking
fn broadcast(room_id: &str, seats: &[Seat], msg: &ServerMsg) {
    for seat in seats {
        if let Err(e) = seat.member.outbound.try_send(msg.clone()) {
            debug!(
                room_id = %room_id,
                session_id = %seat.member.session_id,
                error = %e,
                "Skipping broadcast to slow client"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::{POINTS_TO_WIN, SCORE_DELAY, START_DELAY};
    use crate::util::time::ManualTime;
    use std::sync::Arc;

    fn member(name: &str) -> (Member, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(64);
        let member = Member {
            session_id: Uuid::new_v4(),
            name: name.to_string(),
            outbound: tx,
        };
        (member, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn room() -> (Room, Arc<ManualTime>) {
        let (room, time, _feed) = room_with_feed();
        (room, time)
    }

    fn room_with_feed() -> (Room, Arc<ManualTime>, broadcast::Receiver<GameUpdate>) {
        let time = Arc::new(ManualTime::new());
        let (feed, feed_rx) = broadcast::channel(256);
        (Room::new("r1".into(), time.clone(), 9, feed), time, feed_rx)
    }

    /// Keep the left paddle out of the way until the right side wins
    fn play_out(room: &Room, time: &ManualTime, left: Uuid) {
        time.advance(START_DELAY);
        for _ in 0..10_000 {
            match room.state() {
                MatchState::GameOver => return,
                MatchState::ScorePause => time.advance(SCORE_DELAY),
                _ => {}
            }
            while room.with_match(|m| m.left.y > m.left.height / 2.0) {
                room.move_paddle(left, Direction::Up).unwrap();
            }
            room.tick();
        }
        panic!("match never finished");
    }

    #[test]
    fn members_take_left_then_right() {
        let (room, _) = room();
        let (alice, mut alice_rx) = member("alice");
        let (bob, _bob_rx) = member("bob");
        let (carol, _carol_rx) = member("carol");

        assert_eq!(room.admit(alice), Ok(Side::Left));
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMsg::GameStatus(GameStatus::WaitingForPlayers)]
        );

        assert_eq!(room.admit(bob), Ok(Side::Right));
        assert_eq!(room.state(), MatchState::Starting);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMsg::GameStatus(GameStatus::GameStarting)]
        );

        assert_eq!(room.admit(carol), Err(RoomError::Full("r1".into())));
        assert_eq!(room.member_count(), 2);
        assert_eq!(room.with_match(|m| m.player_count()), 2);
    }

    #[test]
    fn leave_decrements_exactly_once() {
        let (room, _) = room();
        let (alice, _alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        let alice_id = alice.session_id;
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();
        drain(&mut bob_rx);

        assert!(room.leave(alice_id));
        assert!(!room.leave(alice_id));
        assert_eq!(room.with_match(|m| m.player_count()), 1);
        assert_eq!(room.state(), MatchState::Paused);
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMsg::GameStatus(GameStatus::GamePaused)]
        );
        assert!(room.emptied_at().is_none());
    }

    #[test]
    fn freed_side_is_reused() {
        let (room, _) = room();
        let (alice, _a) = member("alice");
        let (bob, _b) = member("bob");
        let (carol, _c) = member("carol");
        let alice_id = alice.session_id;
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();
        room.leave(alice_id);

        assert_eq!(room.admit(carol), Ok(Side::Left));
        assert_eq!(room.state(), MatchState::Starting);
    }

    #[test]
    fn empty_room_records_when_it_emptied() {
        let (room, _) = room();
        let (alice, _a) = member("alice");
        let alice_id = alice.session_id;
        room.admit(alice).unwrap();
        assert!(room.emptied_at().is_none());

        room.leave(alice_id);
        assert!(room.emptied_at().is_some());
        assert_eq!(room.with_match(|m| m.player_count()), 0);
    }

    #[test]
    fn paddle_moves_follow_seat() {
        let (room, _) = room();
        let (alice, _a) = member("alice");
        let (bob, _b) = member("bob");
        let (alice_id, bob_id) = (alice.session_id, bob.session_id);
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();

        assert_eq!(room.move_paddle(alice_id, Direction::Up), Ok(Side::Left));
        assert_eq!(room.move_paddle(bob_id, Direction::Down), Ok(Side::Right));
        room.with_match(|m| {
            assert!(m.left.y < 0.5);
            assert!(m.right.y > 0.5);
        });

        assert_eq!(
            room.move_paddle(Uuid::new_v4(), Direction::Up),
            Err(RoomError::NotMember("r1".into()))
        );
    }

    #[test]
    fn tick_broadcasts_start_and_state() {
        let (room, time) = room();
        let (alice, mut alice_rx) = member("alice");
        let (bob, _b) = member("bob");
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();
        drain(&mut alice_rx);

        assert!(room.tick().is_empty());
        assert!(drain(&mut alice_rx).is_empty());

        time.advance(START_DELAY);
        assert_eq!(room.tick(), vec![MatchEvent::Started]);
        let sent = drain(&mut alice_rx);
        assert_eq!(sent[0], ServerMsg::GameStatus(GameStatus::GameInProgress));
        assert!(matches!(sent[1], ServerMsg::GameState(_)));

        room.tick();
        assert!(matches!(
            drain(&mut alice_rx).as_slice(),
            [ServerMsg::GameState(_)]
        ));
    }

    #[test]
    fn finished_room_turns_new_players_away() {
        let (room, time) = room();
        let (alice, _a) = member("alice");
        let (bob, _b) = member("bob");
        let (alice_id, bob_id) = (alice.session_id, bob.session_id);
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();

        play_out(&room, &time, alice_id);
        assert_eq!(room.with_match(|m| m.winner()), Some(Side::Right));

        room.leave(alice_id);
        room.leave(bob_id);
        let (carol, mut carol_rx) = member("carol");
        assert_eq!(room.check_open(), Err(RoomError::Finished("r1".into())));
        assert_eq!(room.admit(carol), Err(RoomError::Finished("r1".into())));
        assert!(drain(&mut carol_rx).is_empty());
        assert_eq!(room.member_count(), 0);
        assert_eq!(room.state(), MatchState::GameOver);
    }

    #[test]
    fn joining_a_paused_room_reports_the_pause() {
        let (room, _) = room();
        let (alice, _a) = member("alice");
        let (bob, _b) = member("bob");
        let (alice_id, bob_id) = (alice.session_id, bob.session_id);
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();
        room.leave(alice_id);
        room.leave(bob_id);
        assert_eq!(room.state(), MatchState::Paused);

        let (carol, mut carol_rx) = member("carol");
        room.admit(carol).unwrap();
        assert_eq!(
            drain(&mut carol_rx),
            vec![ServerMsg::GameStatus(GameStatus::GamePaused)]
        );

        let (dave, _d) = member("dave");
        room.admit(dave).unwrap();
        assert_eq!(
            drain(&mut carol_rx),
            vec![ServerMsg::GameStatus(GameStatus::GameStarting)]
        );
    }

    #[test]
    fn lobby_feed_follows_the_match() {
        let (room, time, mut feed) = room_with_feed();
        let (alice, _a) = member("alice");
        let (bob, _b) = member("bob");
        let (alice_id, bob_id) = (alice.session_id, bob.session_id);
        room.admit(alice).unwrap();
        room.admit(bob).unwrap();
        play_out(&room, &time, alice_id);
        room.leave(bob_id);

        let mut updates = Vec::new();
        while let Ok(update) = feed.try_recv() {
            updates.push(update);
        }
        let kinds: Vec<_> = updates.iter().map(|u| u.kind).collect();

        let mut expected = vec![GameUpdateKind::PlayerJoined, GameUpdateKind::PlayerJoined];
        expected.extend(std::iter::repeat(GameUpdateKind::ScoreUpdate).take(POINTS_TO_WIN as usize));
        expected.push(GameUpdateKind::GameOver);
        expected.push(GameUpdateKind::PlayerLeft);
        assert_eq!(kinds, expected);

        assert_eq!(updates[1].game.player_count, 2);
        let over = &updates[updates.len() - 2].game;
        assert_eq!(over.state, MatchState::GameOver);
        assert_eq!(over.score.right, POINTS_TO_WIN);
        assert_eq!(over.winner, Some(Side::Right));
        assert_eq!(updates.last().unwrap().game.player_count, 1);
    }
}
