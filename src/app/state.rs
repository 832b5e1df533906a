//! Application state shared across routes and sessions

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::{MatchClock, RoomRegistry};
use crate::util::time::{MonotonicTime, SharedTime};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    pub clock: MatchClock,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_time(config, Arc::new(MonotonicTime))
    }

    /// Build state around an explicit time source
    pub fn with_time(config: Config, time: SharedTime) -> Self {
        let config = Arc::new(config);

        // Initialize room registry
        let rooms = Arc::new(RoomRegistry::new(time));

        let clock = MatchClock::new(config.tick_rate);

        Self {
            config,
            rooms,
            clock,
        }
    }
}
