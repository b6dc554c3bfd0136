//! Relay for mesh rooms: hands out peer ids, keeps per-room rosters and
//! forwards addressed signaling payloads. It never carries media.

mod app;
mod room;
mod signaling;

pub use app::*;
pub use room::*;
pub use signaling::*;
