//! Process-wide directory of rooms

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::game::Side;
use crate::util::time::SharedTime;
use crate::ws::protocol::{GameSummary, GameUpdate, GameUpdateKind};

use super::room::{LobbyFeed, Member, Room, RoomError};

/// Lobby feed entries buffered per subscriber before it starts lagging
const LOBBY_FEED_CAPACITY: usize = 256;

/// Registry of all open rooms.
///
/// Every operation runs under the single registry lock. When a room lock is
/// also needed it is taken after the registry lock, and never two room locks
/// at once.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    time: SharedTime,
    feed: LobbyFeed,
}

impl RoomRegistry {
    pub fn new(time: SharedTime) -> Self {
        let (feed, _) = broadcast::channel(LOBBY_FEED_CAPACITY);
        Self {
            rooms: Mutex::new(HashMap::new()),
            time,
            feed,
        }
    }

    /// Receive lobby updates for every room created from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GameUpdate> {
        self.feed.subscribe()
    }

    /// Allocate an empty room under a fresh identifier
    #[cfg(test)]
    pub fn create(&self) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        self.insert_new(&mut rooms)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(id.to_string()))
    }

    /// Identifiers of all rooms, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Lobby summaries of all rooms, sorted by identifier
    pub fn summaries(&self) -> Vec<GameSummary> {
        let mut games: Vec<GameSummary> =
            self.rooms.lock().values().map(|r| r.summary()).collect();
        games.sort_by(|a, b| a.id.cmp(&b.id));
        games
    }

    /// Seat `member` in room `id`, first leaving `leaving` if given.
    ///
    /// The target is validated before the old room is left, so a failed
    /// join keeps the member where it was.
    pub fn join(
        &self,
        id: &str,
        member: Member,
        leaving: Option<&Room>,
    ) -> Result<(Arc<Room>, Side), RoomError> {
        let rooms = self.rooms.lock();
        let room = rooms
            .get(id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(id.to_string()))?;

        room.check_open()?;
        if let Some(prev) = leaving {
            prev.leave(member.session_id);
        }
        let side = room.admit(member)?;
        Ok((room, side))
    }

    /// Create a room and seat `member` in it as one step
    pub fn create_and_join(
        &self,
        member: Member,
        leaving: Option<&Room>,
    ) -> Result<(Arc<Room>, Side), RoomError> {
        let mut rooms = self.rooms.lock();
        let room = self.insert_new(&mut rooms);
        if let Some(prev) = leaving {
            prev.leave(member.session_id);
        }
        let side = room.admit(member)?;
        Ok((room, side))
    }

    /// Drop rooms that have had no members for longer than `max_idle`
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = self.time.now();
        let mut rooms = self.rooms.lock();
        let before = rooms.len();
        rooms.retain(|id, room| {
            let expired = room
                .emptied_at()
                .is_some_and(|at| now.saturating_duration_since(at) >= max_idle);
            if expired {
                info!(room_id = %id, "Removing idle room");
            }
            !expired
        });
        before - rooms.len()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Members seated across all rooms
    pub fn total_players(&self) -> usize {
        self.rooms.lock().values().map(|r| r.member_count()).sum()
    }

    fn insert_new(&self, rooms: &mut HashMap<String, Arc<Room>>) -> Arc<Room> {
        let id = loop {
            let candidate = generate_room_id();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let room = Arc::new(Room::new(
            id.clone(),
            self.time.clone(),
            rand::random::<u64>(),
            self.feed.clone(),
        ));
        rooms.insert(id.clone(), room.clone());
        info!(room_id = %id, "Created room");

        let _ = self.feed.send(GameUpdate {
            kind: GameUpdateKind::NewGame,
            game: room.summary(),
        });
        room
    }
}

/// Short random room code
fn generate_room_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
