pub mod errors;
pub mod events;
pub mod id;
pub mod time;

pub use errors::ConfigError;
pub use events::EventBus;
pub use id::{new_correlation_id, new_id, room_key, SessionId};
pub use time::now_iso8601;
