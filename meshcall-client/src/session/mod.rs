mod collaborators;
mod session;
mod session_command;
mod session_handle;
mod session_state;

pub use collaborators::*;
pub use session::*;
pub use session_command::*;
pub use session_handle::*;
pub use session_state::*;
