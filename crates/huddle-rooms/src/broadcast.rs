use std::sync::Arc;

use huddle_core::ChatEvent;

use crate::registry::RoomRegistry;

/// Fans one event out to a room's members.
///
/// Delivery is best-effort: the payload is serialized once, then pushed
/// non-blocking onto each member's own bounded queue. A member whose queue
/// is closed or full is skipped; nothing is retried, buffered, or reported
/// back to the caller, and one dead member never affects the rest.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every member of `room`, minus `exclude` when given.
    pub fn deliver(&self, room: &str, event: &ChatEvent, exclude: Option<&str>) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(tag = event.tag(), error = %e, "failed to serialize event");
                return;
            }
        };

        let members = match exclude {
            Some(username) => self.registry.members_excluding(room, username),
            None => self.registry.all_members(room),
        };

        for member in members {
            if let Err(e) = member.tx.try_send(payload.clone()) {
                tracing::trace!(
                    conn = %member.conn,
                    username = %member.username,
                    error = %e,
                    "dropping event for member"
                );
            }
        }
    }
}
