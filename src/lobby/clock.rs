//! Fixed-step driver for a room's match

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::game::MatchEvent;
use crate::util::time::tick_interval;

use super::room::Room;

/// Spawns one periodic tick task per room
#[derive(Debug, Clone, Copy)]
pub struct MatchClock {
    period: Duration,
}

impl MatchClock {
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            period: tick_interval(ticks_per_second),
        }
    }

    #[cfg(test)]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start ticking `room`.
    ///
    /// The task only holds a weak reference and exits once the registry has
    /// dropped the room, or after the match is decided.
    pub fn spawn(&self, room: &Arc<Room>) -> JoinHandle<()> {
        let weak = Arc::downgrade(room);
        let room_id = room.id().to_string();
        let period = self.period;
        tokio::spawn(async move {
            run(weak, period).await;
            debug!(room_id = %room_id, "Match clock stopped");
        })
    }
}

async fn run(room: Weak<Room>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(room) = room.upgrade() else {
            break;
        };

        let events = room.tick();
        if events
            .iter()
            .any(|e| matches!(e, MatchEvent::GameOver { .. }))
        {
            break;
        }
    }
}
