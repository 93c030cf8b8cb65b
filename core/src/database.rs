//! In-memory pool of users, servers, and channels
//!
//! Process-wide state every subsystem resolves through. Reads hand out
//! clones; writers mutate through the update methods. Serialization of
//! mutation is the event loop's job, not a lock discipline here.

use crate::{Channel, Error, Result, Server, User};
use dashmap::DashMap;

/// In-memory pool for the IRC daemon
#[derive(Debug, Default)]
pub struct Database {
    /// Active users by UID
    users: DashMap<String, User>,
    /// Users by nickname (case-insensitive)
    users_by_nick: DashMap<String, String>,
    /// Known servers by name (case-insensitive)
    servers: DashMap<String, Server>,
    /// Server names by SID
    servers_by_sid: DashMap<String, String>,
    /// Channels by case-folded name
    channels: DashMap<String, Channel>,
}

impl Database {
    /// Create a new pool
    pub fn new() -> Self {
        Self::default()
    }

    // User management

    /// Add a user to the pool
    pub fn add_user(&self, user: User) -> Result<()> {
        let nick_lower = user.nick.to_lowercase();
        if self.users_by_nick.contains_key(&nick_lower) {
            return Err(Error::User("Nickname already in use".to_string()));
        }
        self.users_by_nick.insert(nick_lower, user.uid.clone());
        self.users.insert(user.uid.clone(), user);
        Ok(())
    }

    /// Remove a user from the pool
    pub fn remove_user(&self, uid: &str) -> Option<User> {
        let (_, user) = self.users.remove(uid)?;
        self.users_by_nick.remove(&user.nick.to_lowercase());
        Some(user)
    }

    /// Look up a user by UID
    pub fn lookup_user(&self, uid: &str) -> Option<User> {
        self.users.get(uid).map(|entry| entry.value().clone())
    }

    /// Look up a user by nickname
    pub fn lookup_user_nick(&self, nick: &str) -> Option<User> {
        self.users_by_nick
            .get(&nick.to_lowercase())
            .and_then(|entry| self.users.get(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Write back an updated user, refreshing the nick index
    pub fn update_user(&self, user: User) -> Result<()> {
        let Some(old) = self.lookup_user(&user.uid) else {
            return Err(Error::User(format!("User {} not in pool", user.uid)));
        };
        if !old.nick.eq_ignore_ascii_case(&user.nick) {
            self.users_by_nick.remove(&old.nick.to_lowercase());
            self.users_by_nick
                .insert(user.nick.to_lowercase(), user.uid.clone());
        }
        self.users.insert(user.uid.clone(), user);
        Ok(())
    }

    /// Number of users in the pool
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // Server management

    /// Add a server to the pool
    pub fn add_server(&self, server: Server) -> Result<()> {
        let name_lower = server.name.to_lowercase();
        if self.servers.contains_key(&name_lower) {
            return Err(Error::Server(format!(
                "Server {} already in pool",
                server.name
            )));
        }
        self.servers_by_sid
            .insert(server.sid.clone(), server.name.clone());
        self.servers.insert(name_lower, server);
        Ok(())
    }

    /// Remove a server from the pool
    pub fn remove_server(&self, name: &str) -> Option<Server> {
        let (_, server) = self.servers.remove(&name.to_lowercase())?;
        self.servers_by_sid.remove(&server.sid);
        Some(server)
    }

    /// Look up a server by name
    pub fn lookup_server(&self, name: &str) -> Option<Server> {
        self.servers
            .get(&name.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// Look up a server by SID
    pub fn lookup_server_sid(&self, sid: &str) -> Option<Server> {
        self.servers_by_sid
            .get(sid)
            .and_then(|entry| self.servers.get(&entry.value().to_lowercase()))
            .map(|entry| entry.value().clone())
    }

    // Channel management

    /// Add a channel; refused if the name is taken
    pub fn add_channel(&self, channel: Channel) -> Result<()> {
        let key = channel.name.to_lowercase();
        if self.channels.contains_key(&key) {
            return Err(Error::Channel(format!(
                "Channel {} already exists",
                channel.name
            )));
        }
        self.channels.insert(key, channel);
        Ok(())
    }

    /// Look up a channel by name
    pub fn get_channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .get(&name.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// Write back an updated channel
    pub fn update_channel(&self, channel: Channel) {
        self.channels.insert(channel.name.to_lowercase(), channel);
    }

    /// Detach a channel from the pool
    pub fn delete_channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .remove(&name.to_lowercase())
            .map(|(_, channel)| channel)
    }

    /// Number of channels in the pool
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// All channels a user is a member of
    pub fn channels_with_user(&self, uid: &str) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|entry| entry.value().has_user(uid))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Resolve a UID to a nickname, for client-perspective serialization
    pub fn resolve_nick(&self, uid: &str) -> Option<String> {
        self.users.get(uid).map(|entry| entry.nick.clone())
    }
}
