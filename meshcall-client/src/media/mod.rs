mod capture_backend;
mod local_stream;
mod local_track;
mod media_source;
mod placeholder;
mod synthetic;

pub use capture_backend::*;
pub use local_stream::*;
pub use local_track::*;
pub use media_source::*;
pub use placeholder::*;
pub use synthetic::*;
