//! Configuration schema types for Huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod identity;
mod realtime;
mod room;
mod system;

pub use identity::*;
pub use realtime::*;
pub use room::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Huddle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HuddleConfig {
    pub identity: IdentityConfig,
    pub directory: DirectoryConfig,
    pub room: RoomSettings,
    pub realtime: RealtimeSettings,
    pub relay: RelaySettings,
    pub logging: LoggingConfig,
}
