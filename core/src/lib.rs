//! oxircd core
//!
//! This crate provides the core of the oxircd IRC daemon: the channel and
//! user entities, the channel mode taxonomy and engine, the in-memory pool,
//! the server linkage lifecycle, and the collaborator contracts the
//! modules build on.

pub mod channel;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod matcher;
pub mod message;
pub mod mode_engine;
pub mod modes;
pub mod numeric;
pub mod server;
pub mod server_connection;
pub mod user;
pub mod utils;


pub use channel::{Channel, ListEntry, ModeRecord, Topic};
pub use client::{Client, ClientMap, ClientState};
pub use config::{Config, LinkBlock};
pub use database::Database;
pub use error::{Error, Result};
pub use events::{event_channel, Event, EventReceiver, EventSender};
pub use message::{Message, MessageType, Prefix};
pub use mode_engine::{ModeCtx, ModeEngine, ModeHandler, ModeSource};
pub use modes::{
    ChannelModeType, ModeChange, ModeStringOpts, ModeTable, ParamNeed, StatusPrefix,
    LEVEL_BASIC, LEVEL_NONE, STATUS_PREFIXES,
};
pub use numeric::NumericReply;
pub use server::Server;
pub use server_connection::{
    LinkEvent, LinkProtocol, ServerConnection, ServerConnectionManager, ServerConnectionState,
    CONNECT_TIMEOUT,
};
pub use user::{AccountRef, User};

/// Re-exports for convenience
pub use tracing::{debug, error, info, warn};
