use serde::{Deserialize, Serialize};
use std::fmt;

/// External room code. Everyone who joins with the same code shares a mesh.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_owned())
    }

    /// Accepts either a bare code or a full meeting link, keeping the last
    /// non-empty path segment (`https://host/abc123/` -> `abc123`).
    pub fn from_link(link: &str) -> Self {
        let path = link.split(['?', '#']).next().unwrap_or_default();
        let code = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .next_back()
            .unwrap_or_default();
        Self::new(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
