use dashmap::DashMap;
use meshcall_core::{PeerId, RoomCode};
use std::sync::Arc;
use tracing::info;

/// Ordered membership of every live room.
///
/// Membership changes run their notification callback while the room entry
/// is still locked, so every member observes joins and leaves in the same
/// order and a newcomer always sees its own join before anyone else's.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomCode, Vec<PeerId>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join<F>(&self, room: &RoomCode, peer_id: &PeerId, notify: F)
    where
        F: FnOnce(&[PeerId]),
    {
        let mut members = self.rooms.entry(room.clone()).or_insert_with(|| {
            info!("Creating new room: {}", room);
            Vec::new()
        });

        if !members.contains(peer_id) {
            members.push(peer_id.clone());
        }

        notify(members.as_slice());
    }

    /// Removes `peer_id` and notifies the remaining members. Returns `false`
    /// when the peer was not in the room.
    pub fn leave<F>(&self, room: &RoomCode, peer_id: &PeerId, notify: F) -> bool
    where
        F: FnOnce(&[PeerId]),
    {
        let removed = {
            let Some(mut members) = self.rooms.get_mut(room) else {
                return false;
            };
            let before = members.len();
            members.retain(|member| member != peer_id);
            let removed = members.len() != before;
            if removed {
                notify(members.as_slice());
            }
            removed
        };

        if self
            .rooms
            .remove_if(room, |_, members| members.is_empty())
            .is_some()
        {
            info!("Room {} is empty, dropping it", room);
        }

        removed
    }

    pub fn members(&self, room: &RoomCode) -> Vec<PeerId> {
        self.rooms
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomCode, peer_id: &PeerId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(peer_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
