//! Mesh signaling and media-track coordinator.
//!
//! A [`MeshSession`] actor owns the local capture ([`MediaSource`]), one
//! direct connection per remote participant ([`PeerConnectionRegistry`]) and
//! the relay connection ([`SignalingChannel`]). It is driven through a
//! cloneable [`SessionHandle`].

mod config;
mod error;
mod media;
mod registry;
mod session;
mod signaling;
mod transport;

pub use config::*;
pub use error::*;
pub use media::*;
pub use registry::*;
pub use session::*;
pub use signaling::*;
pub use transport::*;
