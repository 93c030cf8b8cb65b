//! User management and tracking

use crate::events::{Event, EventSender};
use crate::{Message, MessageType, NumericReply, Prefix, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Sanitized account binding attached to a logged-in user.
/// Never carries the stored password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    /// Account row id
    pub id: i64,
    /// Account name
    pub name: String,
}

/// User information and state
#[derive(Debug, Clone)]
pub struct User {
    /// Network-unique user ID (SID followed by six alphanumerics)
    pub uid: String,
    /// Nickname
    pub nick: String,
    /// Username (ident)
    pub ident: String,
    /// Real name
    pub realname: String,
    /// Visible hostname
    pub host: String,
    /// IP address
    pub ip: String,
    /// Name of the server this user is on
    pub server: String,
    /// SID of the server this user is on
    pub sid: String,
    /// Whether the user is connected to this server
    pub local: bool,
    /// User modes
    pub modes: HashSet<char>,
    /// Negotiated IRCv3 capabilities
    pub caps: HashSet<String>,
    /// Account binding, if logged in
    pub account: Option<AccountRef>,
    /// Away message (if any)
    pub away_message: Option<String>,
    /// Registration time
    pub registered_at: DateTime<Utc>,
    /// Outbound message channel; absent for remote users
    sender: Option<mpsc::UnboundedSender<Message>>,
    /// Event channel for cross-component signals; absent when nothing
    /// listens
    events: Option<EventSender>,
}

impl User {
    /// Create a new user
    pub fn new(
        uid: String,
        nick: String,
        ident: String,
        realname: String,
        host: String,
        server: String,
        sid: String,
    ) -> Self {
        Self {
            uid,
            nick,
            ident,
            realname,
            host,
            ip: String::new(),
            server,
            sid,
            local: false,
            modes: HashSet::new(),
            caps: HashSet::new(),
            account: None,
            away_message: None,
            registered_at: Utc::now(),
            sender: None,
            events: None,
        }
    }

    /// Attach an outbound message channel, marking the user local
    pub fn with_sender(mut self, sender: mpsc::UnboundedSender<Message>) -> Self {
        self.sender = Some(sender);
        self.local = true;
        self
    }

    /// Attach an event channel for cross-component signals
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether this user is connected to this server
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Check if user has a specific mode
    pub fn is_mode(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }

    /// Add a mode to the user
    pub fn add_mode(&mut self, mode: char) {
        // The registered mode is monotone: logging in through the account
        // pipeline is the only way to gain it.
        if mode == 'r' {
            tracing::warn!(
                "Refusing direct set of registered mode on {}; use account login",
                self.nick
            );
            return;
        }
        self.modes.insert(mode);
    }

    /// Remove a mode from the user
    pub fn remove_mode(&mut self, mode: char) {
        self.modes.remove(&mode);
    }

    /// Add a mode, bypassing the monotone-mode guard (account pipeline only)
    pub fn add_mode_internal(&mut self, mode: char) {
        self.modes.insert(mode);
    }

    /// Remove a mode, bypassing guards
    pub fn remove_mode_internal(&mut self, mode: char) {
        self.modes.remove(&mode);
    }

    /// Check if a capability was negotiated
    pub fn has_cap(&self, cap: &str) -> bool {
        self.caps.contains(cap)
    }

    /// Check if user is away
    pub fn is_away(&self) -> bool {
        self.away_message.is_some()
    }

    /// Get user prefix for messages
    pub fn prefix(&self) -> Prefix {
        Prefix::User {
            nick: self.nick.clone(),
            user: self.ident.clone(),
            host: self.host.clone(),
        }
    }

    /// Get the nick!user@host mask
    pub fn full_mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.host)
    }

    /// Account name, or `*` when not logged in (extended-join form)
    pub fn account_name(&self) -> &str {
        self.account.as_ref().map(|a| a.name.as_str()).unwrap_or("*")
    }

    /// Send a message to the user. Messages to remote users are dropped
    /// here; routing to their server happens at the call site.
    pub fn send(&self, message: Message) -> Result<()> {
        if let Some(sender) = &self.sender {
            sender
                .send(message)
                .map_err(|_| crate::Error::Connection("User send queue closed".to_string()))?;
        } else {
            tracing::trace!("Dropping direct send to remote user {}", self.nick);
        }
        Ok(())
    }

    /// Send a message with the given source prefix
    pub fn sendfrom(&self, source: Prefix, command: MessageType, params: Vec<String>) -> Result<()> {
        self.send(Message::with_prefix(source, command, params))
    }

    /// Send a numeric reply from this user's server
    pub fn send_numeric(&self, reply: NumericReply, params: Vec<String>) -> Result<()> {
        let mut message = reply.reply(&self.nick, params);
        message.prefix = Some(Prefix::Server(self.server.clone()));
        self.send(message)
    }

    /// Send a prebuilt numeric message, stamping the server prefix
    pub fn send_numeric_message(&self, mut message: Message) -> Result<()> {
        message.prefix = Some(Prefix::Server(self.server.clone()));
        self.send(message)
    }

    /// Fire a named event carrying this user as the source
    pub fn fire_event(&self, name: &str, payload: Vec<String>) {
        if let Some(events) = &self.events {
            let _ = events.send(Event {
                name: name.to_string(),
                source: self.uid.clone(),
                payload,
            });
        } else {
            tracing::trace!("Event {} from {} has no listener", name, self.nick);
        }
    }

    /// Send a server notice to the user
    pub fn server_notice(&self, text: &str) -> Result<()> {
        self.send(Message::with_prefix(
            Prefix::Server(self.server.clone()),
            MessageType::Notice,
            vec![self.nick.clone(), format!("*** {}", text)],
        ))
    }
}
