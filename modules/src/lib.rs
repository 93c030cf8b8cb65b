//! oxircd modules
//!
//! Channel operations, the account pipeline, and the SASL proxy, built on
//! oxircd-core.

pub mod account;
pub mod channel;
pub mod sasl;

pub use account::{AccountModule, AccountRow, AccountStore};
pub use channel::{ChannelEvents, ChannelModule};
pub use sasl::SaslModule;
