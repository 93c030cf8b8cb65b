//! IRC message parsing and handling
//!
//! This module implements the IRC message format as defined in RFC 1459.
//! Transport framing stays at the connection layer; everything above it
//! consumes commands with the parameters already split.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IRC message prefix (server or user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prefix {
    /// Server name
    Server(String),
    /// User prefix (nick!user@host)
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => write!(f, "{}!{}@{}", nick, user, host),
        }
    }
}

/// IRC message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    // Connection registration
    Password,
    Nick,
    User,
    Server,
    Quit,

    // Channel operations
    Join,
    Part,
    Mode,
    Topic,
    Names,
    Kick,

    // Messaging
    PrivMsg,
    Notice,

    // Miscellaneous
    Ping,
    Pong,
    Error,
    Away,
    Connect,

    // Server-to-server
    ChannelBurst,
    Cmode,
    Encap,

    // IRCv3 extensions
    Cap,
    Authenticate,

    // Custom/unknown (includes numeric replies)
    Custom(String),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Password => "PASS",
            MessageType::Nick => "NICK",
            MessageType::User => "USER",
            MessageType::Server => "SERVER",
            MessageType::Quit => "QUIT",
            MessageType::Join => "JOIN",
            MessageType::Part => "PART",
            MessageType::Mode => "MODE",
            MessageType::Topic => "TOPIC",
            MessageType::Names => "NAMES",
            MessageType::Kick => "KICK",
            MessageType::PrivMsg => "PRIVMSG",
            MessageType::Notice => "NOTICE",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
            MessageType::Away => "AWAY",
            MessageType::Connect => "CONNECT",
            MessageType::ChannelBurst => "CBURST",
            MessageType::Cmode => "CMODE",
            MessageType::Encap => "ENCAP",
            MessageType::Cap => "CAP",
            MessageType::Authenticate => "AUTHENTICATE",
            MessageType::Custom(cmd) => cmd,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PASS" => MessageType::Password,
            "NICK" => MessageType::Nick,
            "USER" => MessageType::User,
            "SERVER" => MessageType::Server,
            "QUIT" => MessageType::Quit,
            "JOIN" => MessageType::Join,
            "PART" => MessageType::Part,
            "MODE" => MessageType::Mode,
            "TOPIC" => MessageType::Topic,
            "NAMES" => MessageType::Names,
            "KICK" => MessageType::Kick,
            "PRIVMSG" => MessageType::PrivMsg,
            "NOTICE" => MessageType::Notice,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            "ERROR" => MessageType::Error,
            "AWAY" => MessageType::Away,
            "CONNECT" => MessageType::Connect,
            "CBURST" => MessageType::ChannelBurst,
            "CMODE" => MessageType::Cmode,
            "ENCAP" => MessageType::Encap,
            "CAP" => MessageType::Cap,
            "AUTHENTICATE" => MessageType::Authenticate,
            _ => MessageType::Custom(s.to_string()),
        }
    }
}

/// IRC message as defined in RFC 1459
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Optional prefix (server or user)
    pub prefix: Option<Prefix>,
    /// Message command/type
    pub command: MessageType,
    /// Message parameters
    pub params: Vec<String>,
}

impl Message {
    /// Create a new message
    pub fn new(command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command,
            params,
        }
    }

    /// Create a new message with prefix
    pub fn with_prefix(prefix: Prefix, command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: Some(prefix),
            command,
            params,
        }
    }

    /// Parse an IRC message from a string
    pub fn parse(input: &str) -> crate::Result<Self> {
        let input = input.trim_end_matches(['\r', '\n']);
        if input.is_empty() {
            return Err(crate::Error::MessageParse("Empty message".to_string()));
        }

        let (prefix, rest) = if let Some(stripped) = input.strip_prefix(':') {
            let (prefix_str, rest) = stripped
                .split_once(' ')
                .ok_or_else(|| crate::Error::MessageParse("Prefix without command".to_string()))?;
            (Some(Prefix::parse(prefix_str)?), rest)
        } else {
            (None, input)
        };

        let (command_str, rest) = match rest.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest),
            None => (rest, ""),
        };
        if command_str.is_empty() {
            return Err(crate::Error::MessageParse("No command found".to_string()));
        }

        let mut params = Vec::new();
        let mut remaining = rest.trim_start();
        while !remaining.is_empty() {
            if let Some(trailing) = remaining.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match remaining.split_once(' ') {
                Some((word, rest)) => {
                    if !word.is_empty() {
                        params.push(word.to_string());
                    }
                    remaining = rest.trim_start();
                }
                None => {
                    params.push(remaining.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: MessageType::from(command_str),
            params,
        })
    }

    /// Serialize message to wire form, CRLF-terminated
    pub fn to_line(&self) -> String {
        let mut result = String::new();

        if let Some(ref prefix) = self.prefix {
            result.push(':');
            result.push_str(&prefix.to_string());
            result.push(' ');
        }

        result.push_str(&self.command.to_string());

        for (i, param) in self.params.iter().enumerate() {
            result.push(' ');
            let last = i == self.params.len() - 1;
            if last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                result.push(':');
            }
            result.push_str(param);
        }

        result.push_str("\r\n");
        result
    }
}

impl Prefix {
    /// Parse a message prefix (without the leading colon)
    pub fn parse(prefix_str: &str) -> crate::Result<Self> {
        if prefix_str.contains('!') {
            let (nick, user_host) = prefix_str
                .split_once('!')
                .ok_or_else(|| crate::Error::MessageParse("Invalid user prefix".to_string()))?;
            let (user, host) = user_host
                .split_once('@')
                .ok_or_else(|| crate::Error::MessageParse("Invalid user prefix".to_string()))?;
            Ok(Prefix::User {
                nick: nick.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            })
        } else {
            Ok(Prefix::Server(prefix_str.to_string()))
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line().trim_end())
    }
}
