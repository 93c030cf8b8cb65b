//! Server entity
//!
//! A server known to the pool, local or remote. Each server carries the
//! channel mode table it advertises; mode strings from that server are
//! interpreted against its own table.

use crate::modes::ModeTable;
use chrono::{DateTime, Utc};

/// A server in the pool
#[derive(Debug, Clone)]
pub struct Server {
    /// Server name
    pub name: String,
    /// Server ID (TS6 SID)
    pub sid: String,
    /// Server description
    pub description: String,
    /// Hops from this server
    pub hopcount: u32,
    /// When the server became known
    pub connected_at: DateTime<Utc>,
    /// Channel mode table this server advertises
    pub mode_table: ModeTable,
}

impl Server {
    /// Create a server entry with the standard mode table
    pub fn new(name: String, sid: String, description: String, hopcount: u32) -> Self {
        Self {
            name,
            sid,
            description,
            hopcount,
            connected_at: Utc::now(),
            mode_table: ModeTable::with_defaults(),
        }
    }

    /// Type of a channel mode by name
    pub fn cmode_type(&self, name: &str) -> Option<crate::modes::ChannelModeType> {
        self.mode_table.cmode_type(name)
    }

    /// Letter of a channel mode by name
    pub fn cmode_letter(&self, name: &str) -> Option<char> {
        self.mode_table.cmode_letter(name)
    }

    /// Parameter discipline of a channel mode
    pub fn cmode_takes_parameter(
        &self,
        name: &str,
        state: bool,
    ) -> Option<crate::modes::ParamNeed> {
        self.mode_table.cmode_takes_parameter(name, state)
    }
}
