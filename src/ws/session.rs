//! Per-connection command processing

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::lobby::{Member, Outbound, Room};

use super::gatekeeper::{self, Phase};
use super::protocol::{ClientMsg, CommandError, CommandKind, Envelope, GameUpdate, ServerMsg};

/// The connection's writer task has gone away
#[derive(Debug, thiserror::Error)]
#[error("session outbound channel closed")]
pub struct SessionClosed;

/// One client's view of the lobby: its name and the room it sits in
pub struct Session {
    id: Uuid,
    name: Option<String>,
    room: Option<Arc<Room>>,
    state: AppState,
    outbound: Outbound,
}

impl Session {
    pub fn new(state: AppState, outbound: Outbound) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            room: None,
            state,
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[cfg(test)]
    pub fn room(&self) -> Option<&Arc<Room>> {
        self.room.as_ref()
    }

    pub fn phase(&self) -> Phase {
        match (&self.name, &self.room) {
            (None, _) => Phase::Anonymous,
            (Some(_), None) => Phase::Named,
            (Some(_), Some(_)) => Phase::InRoom,
        }
    }

    /// Process one inbound text frame.
    ///
    /// Only a closed outbound channel is an error; everything the client got
    /// wrong is answered (or logged) and the session carries on.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SessionClosed> {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to parse client message");
                return Ok(());
            }
        };

        let Some(kind) = CommandKind::parse(&envelope.kind) else {
            warn!(session_id = %self.id, kind = %envelope.kind, "Ignoring unknown message type");
            return Ok(());
        };

        let outcome = gatekeeper::admit(self.phase(), kind)
            .and_then(|()| ClientMsg::decode(kind, envelope.data))
            .and_then(|msg| self.dispatch(msg));

        let reply = match outcome {
            Ok(reply) => reply,
            Err(err) => {
                debug!(
                    session_id = %self.id,
                    command = kind.as_str(),
                    kind = ?err.kind(),
                    error = %err,
                    "Rejected command"
                );
                Some(err.into())
            }
        };

        match reply {
            Some(msg) => self.send(msg).await,
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, msg: ClientMsg) -> Result<Option<ServerMsg>, CommandError> {
        match msg {
            ClientMsg::SetName(name) => {
                info!(session_id = %self.id, name = %name, "Player set name");
                self.name = Some(name);
                Ok(None)
            }

            ClientMsg::GetGames => Ok(Some(ServerMsg::GetGamesResponse(self.state.rooms.list()))),

            ClientMsg::JoinRoom(room_id) => {
                if self.room.as_ref().is_some_and(|room| room.id() == room_id) {
                    return Ok(Some(ServerMsg::JoinRoomResponse(room_id)));
                }

                let member = self.member();
                let (room, _side) =
                    self.state
                        .rooms
                        .join(&room_id, member, self.room.as_deref())?;
                self.room = Some(room);
                Ok(Some(ServerMsg::JoinRoomResponse(room_id)))
            }

            ClientMsg::CreateRoom => {
                let member = self.member();
                let (room, _side) = self
                    .state
                    .rooms
                    .create_and_join(member, self.room.as_deref())?;
                self.state.clock.spawn(&room);

                let room_id = room.id().to_string();
                self.room = Some(room);
                Ok(Some(ServerMsg::CreateRoomResponse(room_id)))
            }

            ClientMsg::MovePaddle(direction) => {
                let room = self.room.as_ref().ok_or(CommandError::NotInGame)?;
                room.move_paddle(self.id, direction)?;
                Ok(Some(ServerMsg::MovePaddleResponse(direction)))
            }
        }
    }

    /// Forward a lobby feed entry if the session is browsing the lobby
    pub fn notify_lobby(&self, update: GameUpdate) {
        if self.phase() != Phase::Named {
            return;
        }
        if let Err(e) = self.outbound.try_send(ServerMsg::GameUpdate(update)) {
            debug!(session_id = %self.id, error = %e, "Dropping lobby update");
        }
    }

    /// Leave the current room, if any. Safe to call more than once.
    pub fn leave_room(&mut self) {
        if let Some(room) = self.room.take() {
            room.leave(self.id);
        }
    }

    fn member(&self) -> Member {
        Member {
            session_id: self.id,
            name: self.name.clone().unwrap_or_default(),
            outbound: self.outbound.clone(),
        }
    }

    async fn send(&self, msg: ServerMsg) -> Result<(), SessionClosed> {
        self.outbound.send(msg).await.map_err(|_| SessionClosed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.leave_room();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::r#match::START_DELAY;
    use crate::game::{Direction, MatchState};
    use crate::util::time::ManualTime;
    use crate::ws::protocol::{GameStatus, GameUpdateKind};
    use std::f64::consts::PI;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn app() -> (AppState, Arc<ManualTime>) {
        let config = Config::from_source(|_| None).unwrap();
        let time = Arc::new(ManualTime::new());
        (AppState::with_time(config, time.clone()), time)
    }

    fn session(state: &AppState) -> (Session, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(256);
        (Session::new(state.clone(), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Last direct reply, skipping room broadcasts
    fn last_reply(rx: &mut mpsc::Receiver<ServerMsg>) -> Option<ServerMsg> {
        drain(rx)
            .into_iter()
            .filter(|m| !matches!(m, ServerMsg::GameStatus(_) | ServerMsg::GameState(_)))
            .last()
    }

    async fn named(state: &AppState, name: &str) -> (Session, mpsc::Receiver<ServerMsg>) {
        let (mut s, rx) = session(state);
        s.handle_text(&format!(r#"{{"type":"set_name","data":"{name}"}}"#))
            .await
            .unwrap();
        (s, rx)
    }

    fn error(text: &str) -> ServerMsg {
        ServerMsg::Error(text.to_string())
    }

    #[tokio::test]
    async fn get_games_before_name_is_rejected() {
        let (state, _) = app();
        let (mut s, mut rx) = session(&state);

        s.handle_text(r#"{"type":"get_games"}"#).await.unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent, vec![error("Name must be set first")]);
        assert_eq!(
            serde_json::to_string(&sent[0]).unwrap(),
            r#"{"type":"error","data":"Name must be set first"}"#
        );
        assert_eq!(s.phase(), Phase::Anonymous);
    }

    #[tokio::test]
    async fn set_name_is_silent_and_validated() {
        let (state, _) = app();
        let (mut s, mut rx) = session(&state);

        s.handle_text(r#"{"type":"set_name","data":""}"#).await.unwrap();
        assert_eq!(drain(&mut rx), vec![error("Name cannot be empty")]);
        assert_eq!(s.phase(), Phase::Anonymous);

        s.handle_text(r#"{"type":"set_name","data":"Ada"}"#).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(s.name(), Some("Ada"));
        assert_eq!(s.phase(), Phase::Named);
    }

    #[tokio::test]
    async fn malformed_and_unknown_input_is_ignored() {
        let (state, _) = app();
        let (mut s, mut rx) = session(&state);

        s.handle_text("{not json").await.unwrap();
        s.handle_text(r#"{"data":"no type"}"#).await.unwrap();
        s.handle_text(r#"{"type":"spectate","data":"x"}"#).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(s.phase(), Phase::Anonymous);
    }

    #[tokio::test]
    async fn phase_errors_come_before_payload_errors() {
        let (state, _) = app();
        let (mut s, mut rx) = named(&state, "ada").await;

        s.handle_text(r#"{"type":"move_paddle","data":"sideways"}"#)
            .await
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![error("You must be in a game to perform this action")]
        );

        s.handle_text(r#"{"type":"join_room","data":42}"#).await.unwrap();
        assert_eq!(drain(&mut rx), vec![error("Invalid join_room data")]);

        s.handle_text(r#"{"type":"join_room","data":"nope"}"#).await.unwrap();
        assert_eq!(drain(&mut rx), vec![error("Room not found")]);
        assert_eq!(s.phase(), Phase::Named);
    }

    #[tokio::test]
    async fn two_players_start_a_match() {
        let (state, time) = app();
        let (mut alice, mut alice_rx) = named(&state, "alice").await;
        let (mut bob, mut bob_rx) = named(&state, "bob").await;

        alice.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let Some(ServerMsg::CreateRoomResponse(room_id)) = last_reply(&mut alice_rx) else {
            panic!("expected create_room_response");
        };
        assert_eq!(alice.phase(), Phase::InRoom);

        bob.handle_text(r#"{"type":"get_games"}"#).await.unwrap();
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerMsg::GetGamesResponse(vec![room_id.clone()])]
        );

        bob.handle_text(&format!(r#"{{"type":"join_room","data":"{room_id}"}}"#))
            .await
            .unwrap();
        assert_eq!(
            last_reply(&mut bob_rx),
            Some(ServerMsg::JoinRoomResponse(room_id.clone()))
        );

        let room = state.rooms.get(&room_id).unwrap();
        assert_eq!(room.state(), MatchState::Starting);
        assert!(drain(&mut alice_rx).contains(&ServerMsg::GameStatus(GameStatus::GameStarting)));

        time.advance(START_DELAY);
        room.tick();
        assert_eq!(room.state(), MatchState::Playing);
        room.with_match(|m| {
            assert_eq!(m.ball.y, 0.5);
            assert!(m.ball.x <= 0.5);
            assert_eq!(m.ball.angle, PI);
        });

        bob.handle_text(r#"{"type":"move_paddle","data":"up"}"#)
            .await
            .unwrap();
        assert_eq!(
            last_reply(&mut bob_rx),
            Some(ServerMsg::MovePaddleResponse(Direction::Up))
        );
        room.with_match(|m| assert!(m.right.y < 0.5));
    }

    #[tokio::test]
    async fn lobby_commands_rejected_in_room() {
        let (state, _) = app();
        let (mut s, mut rx) = named(&state, "ada").await;
        s.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        drain(&mut rx);

        s.handle_text(r#"{"type":"get_games"}"#).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![error("You cannot perform this action while in a game")]
        );
        s.handle_text(r#"{"type":"set_name","data":"eve"}"#).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![error("You cannot perform this action while in a game")]
        );
        assert_eq!(s.name(), Some("ada"));

        s.handle_text(r#"{"type":"move_paddle","data":"left"}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut rx), vec![error("Invalid move_paddle direction")]);
    }

    #[tokio::test]
    async fn rejoining_current_room_is_a_no_op() {
        let (state, _) = app();
        let (mut s, mut rx) = named(&state, "ada").await;
        s.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let room = s.room().unwrap().clone();
        drain(&mut rx);

        s.handle_text(&format!(r#"{{"type":"join_room","data":"{}"}}"#, room.id()))
            .await
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ServerMsg::JoinRoomResponse(room.id().to_string())]
        );
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.with_match(|m| m.player_count()), 1);
    }

    #[tokio::test]
    async fn switching_rooms_moves_the_member() {
        let (state, _) = app();
        let (mut s, mut rx) = named(&state, "ada").await;
        s.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let first = s.room().unwrap().clone();

        s.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let second = s.room().unwrap().clone();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.member_count(), 0);
        assert_eq!(first.with_match(|m| m.player_count()), 0);
        assert_eq!(second.member_count(), 1);

        // A failed switch stays put
        drain(&mut rx);
        s.handle_text(r#"{"type":"join_room","data":"missing"}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut rx), vec![error("Room not found")]);
        assert!(Arc::ptr_eq(s.room().unwrap(), &second));
        assert!(second.contains(s.id()));
    }

    #[tokio::test]
    async fn full_room_rejects_third_player() {
        let (state, _) = app();
        let (mut alice, mut alice_rx) = named(&state, "alice").await;
        let (mut bob, _bob_rx) = named(&state, "bob").await;
        let (mut carol, mut carol_rx) = named(&state, "carol").await;

        alice.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let Some(ServerMsg::CreateRoomResponse(room_id)) = last_reply(&mut alice_rx) else {
            panic!("expected create_room_response");
        };
        let join = format!(r#"{{"type":"join_room","data":"{room_id}"}}"#);
        bob.handle_text(&join).await.unwrap();
        carol.handle_text(&join).await.unwrap();

        assert_eq!(drain(&mut carol_rx), vec![error("Room is full")]);
        assert_eq!(carol.phase(), Phase::Named);
    }

    #[tokio::test]
    async fn disconnect_pauses_the_opponent() {
        let (state, _) = app();
        let (mut alice, mut alice_rx) = named(&state, "alice").await;
        let (mut bob, _bob_rx) = named(&state, "bob").await;

        alice.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let room = alice.room().unwrap().clone();
        bob.handle_text(&format!(r#"{{"type":"join_room","data":"{}"}}"#, room.id()))
            .await
            .unwrap();
        drain(&mut alice_rx);

        bob.leave_room();
        bob.leave_room();
        drop(bob);

        assert_eq!(room.member_count(), 1);
        assert_eq!(room.with_match(|m| m.player_count()), 1);
        assert_eq!(room.state(), MatchState::Paused);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMsg::GameStatus(GameStatus::GamePaused)]
        );
    }

    #[tokio::test]
    async fn lobby_updates_reach_only_named_sessions_outside_rooms() {
        let (state, _) = app();
        let mut feed = state.rooms.subscribe();
        let (anon, mut anon_rx) = session(&state);
        let (browser, mut browser_rx) = named(&state, "bob").await;
        let (mut host, mut host_rx) = named(&state, "alice").await;

        host.handle_text(r#"{"type":"create_room"}"#).await.unwrap();
        let room_id = host.room().unwrap().id().to_string();
        drain(&mut host_rx);

        while let Ok(update) = feed.try_recv() {
            anon.notify_lobby(update.clone());
            browser.notify_lobby(update.clone());
            host.notify_lobby(update);
        }

        assert!(drain(&mut anon_rx).is_empty());
        assert!(drain(&mut host_rx).is_empty());
        let kinds: Vec<_> = drain(&mut browser_rx)
            .into_iter()
            .map(|msg| match msg {
                ServerMsg::GameUpdate(update) => {
                    assert_eq!(update.game.id, room_id);
                    update.kind
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec![GameUpdateKind::NewGame, GameUpdateKind::PlayerJoined]);
    }

    #[tokio::test]
    async fn closed_outbound_ends_the_session() {
        let (state, _) = app();
        let (mut s, rx) = session(&state);
        drop(rx);

        assert_err!(s.handle_text(r#"{"type":"get_games"}"#).await);
        // Silent commands do not touch the channel
        assert_ok!(s.handle_text(r#"{"type":"set_name","data":"ada"}"#).await);
    }
}
