//! HTTP surface: health, board specs, game listing and the WebSocket upgrade route

pub mod routes;

pub use routes::build_router;
