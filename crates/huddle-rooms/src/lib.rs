pub mod broadcast;
pub mod registry;

pub use broadcast::Broadcaster;
pub use registry::{Member, Presence, RoomRegistry, DEFAULT_QUEUE_CAPACITY};
