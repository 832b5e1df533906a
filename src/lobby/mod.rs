//! Rooms, the room registry and per-room match clocks

pub mod clock;
pub mod registry;
pub mod room;

pub use clock::MatchClock;
pub use registry::RoomRegistry;
pub use room::{Member, Outbound, Room};
