//! Client connection management
//!
//! A `Client` is a connection that has not finished registration. SASL
//! happens at this stage, so the transient proxy-session state lives here.

use crate::{Message, NumericReply, Prefix, Result};
use std::collections::HashSet;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Client connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Just connected, not registered
    Connected,
    /// Nickname set
    NickSet,
    /// User info provided
    UserSet,
    /// Fully registered
    Registered,
    /// Disconnected
    Disconnected,
}

/// Client connection information
#[derive(Debug)]
pub struct Client {
    /// Unique connection ID
    pub id: Uuid,
    /// Provisional UID, allocated at connect time
    pub uid: String,
    /// Client state
    pub state: ClientState,
    /// Nickname, if one has been set
    pub nick: Option<String>,
    /// Ident, if provided
    pub ident: Option<String>,
    /// Visible hostname
    pub host: String,
    /// IP address
    pub ip: String,
    /// Name of this server (for numeric prefixes)
    pub server: String,
    /// Capabilities negotiated so far
    pub caps: HashSet<String>,
    /// Message sender for the connection
    pub sender: mpsc::UnboundedSender<Message>,

    /// UID of the SASL agent serving this connection, pinned on first contact
    pub sasl_agent: Option<String>,
    /// Number of AUTHENTICATE payloads relayed to the client this attempt
    pub sasl_messages: u32,
    /// Failed SASL attempts on this connection
    pub sasl_failures: u32,
    /// Whether SASL completed successfully
    pub sasl_complete: bool,
    /// Mechanism of the attempt in progress, if any
    pub sasl_mechanism: Option<String>,
    /// Account to log into when registration completes (set by services)
    pub sasl_account: Option<String>,
}

/// Registry of unregistered connections by provisional UID
pub type ClientMap = dashmap::DashMap<String, Client>;

impl Client {
    /// Create a new client
    pub fn new(
        uid: String,
        host: String,
        ip: String,
        server: String,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            uid,
            state: ClientState::Connected,
            nick: None,
            ident: None,
            host,
            ip,
            server,
            caps: HashSet::new(),
            sender,
            sasl_agent: None,
            sasl_messages: 0,
            sasl_failures: 0,
            sasl_complete: false,
            sasl_mechanism: None,
            sasl_account: None,
        }
    }

    /// Send a message to the client
    pub fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| crate::Error::Connection("Client send queue closed".to_string()))?;
        Ok(())
    }

    /// Send a numeric reply; the target is `*` until a nick is set
    pub fn send_numeric_message(&self, mut message: Message) -> Result<()> {
        message.prefix = Some(Prefix::Server(self.server.clone()));
        self.send(message)
    }

    /// Send a numeric reply built from code and params
    pub fn send_numeric(&self, reply: NumericReply, params: Vec<String>) -> Result<()> {
        let target = self.nick.as_deref().unwrap_or("*");
        let mut message = reply.reply(target, params);
        message.prefix = Some(Prefix::Server(self.server.clone()));
        self.send(message)
    }

    /// Check if client is registered
    pub fn is_registered(&self) -> bool {
        self.state == ClientState::Registered
    }

    /// Whether a SASL attempt is in progress
    pub fn sasl_in_progress(&self) -> bool {
        self.sasl_agent.is_some() || self.sasl_mechanism.is_some()
    }

    /// Clear the per-attempt SASL state, keeping the failure counter
    pub fn clear_sasl_attempt(&mut self) {
        self.sasl_agent = None;
        self.sasl_messages = 0;
        self.sasl_mechanism = None;
    }

    /// Numeric reply target (`*` until a nick is known)
    pub fn numeric_target(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }
}
