//! SASL proxy
//!
//! This server does not verify SASL credentials itself; it tunnels the
//! exchange between a connecting client and the authentication agent on
//! the services link. Client AUTHENTICATE lines become ENCAP SASL frames
//! toward the agent; agent frames come back as AUTHENTICATE payloads and
//! terminal numerics. SVSLOGIN rides the same path to stamp identity onto
//! a connection before registration completes.

use base64::engine::general_purpose;
use base64::Engine as _;
use oxircd_core::client::{Client, ClientMap};
use oxircd_core::{
    Database, Message, MessageType, NumericReply, Prefix, Result, ServerConnectionManager, User,
};
use oxircd_services::ts6;

/// The SASL proxy for the local server
pub struct SaslModule {
    me_name: String,
    me_sid: String,
    agent_nick: String,
}

impl SaslModule {
    /// Create the proxy. `agent_nick` names the authentication agent on
    /// the services link.
    pub fn new(me_name: &str, me_sid: &str, agent_nick: &str) -> Self {
        Self {
            me_name: me_name.to_string(),
            me_sid: me_sid.to_string(),
            agent_nick: agent_nick.to_string(),
        }
    }

    fn find_agent(&self, pool: &Database) -> Option<User> {
        pool.lookup_user_nick(&self.agent_nick)
    }

    /// AUTHENTICATE from a connecting client. The first line selects a
    /// mechanism, later lines carry base64 blobs, `*` aborts.
    pub fn handle_authenticate(
        &self,
        pool: &Database,
        clients: &ClientMap,
        links: &ServerConnectionManager,
        uid: &str,
        param: &str,
    ) -> Result<()> {
        let Some(mut client) = clients.get_mut(uid) else {
            return Ok(());
        };

        if param == "*" {
            if let (Some(agent), true) = (self.find_agent(pool), client.sasl_in_progress()) {
                let abort =
                    ts6::sasl_abort(&self.me_sid, &agent.server, &client.uid, &agent.uid);
                let _ = links.send_to_server(&agent.server, abort);
            }
            client.clear_sasl_attempt();
            return Ok(());
        }

        let Some(agent) = self.find_agent(pool) else {
            tracing::debug!("SASL attempt with no agent online");
            return client.send_numeric(
                NumericReply::ErrSaslFail,
                vec!["SASL authentication failed".to_string()],
            );
        };

        if client.sasl_mechanism.is_none() {
            let mechanism = param.to_uppercase();
            client.sasl_mechanism = Some(mechanism.clone());
            let host_info = ts6::sasl_host_info(
                &self.me_sid,
                &agent.server,
                &client.uid,
                &agent.uid,
                &client.host,
                &client.ip,
            );
            let initiate = ts6::sasl_initiate(
                &self.me_sid,
                &agent.server,
                &client.uid,
                &agent.uid,
                &mechanism,
            );
            links.send_to_server(&agent.server, host_info)?;
            links.send_to_server(&agent.server, initiate)?;
            return Ok(());
        }

        // data line: must be `+` (empty) or base64
        if param != "+" && general_purpose::STANDARD.decode(param).is_err() {
            let abort = ts6::sasl_abort(&self.me_sid, &agent.server, &client.uid, &agent.uid);
            let _ = links.send_to_server(&agent.server, abort);
            client.clear_sasl_attempt();
            return client.send_numeric(
                NumericReply::ErrSaslFail,
                vec!["SASL authentication failed".to_string()],
            );
        }

        let frame =
            ts6::sasl_client_data(&self.me_sid, &agent.server, &client.uid, &agent.uid, param);
        links.send_to_server(&agent.server, frame)?;
        Ok(())
    }

    /// Inbound `ENCAP <mask> SASL …` from the services link
    pub fn handle_encap_sasl(
        &self,
        pool: &Database,
        clients: &ClientMap,
        links: &ServerConnectionManager,
        source_sid: &str,
        mask: &str,
        params: &[String],
    ) -> Result<()> {
        if self.forward_unless_mine(links, source_sid, mask, "SASL", params) {
            return Ok(());
        }

        let Some(frame) = ts6::parse_sasl(params) else {
            tracing::debug!("Malformed SASL frame from {}", source_sid);
            return Ok(());
        };

        let Some(agent) = pool.lookup_user(&frame.agent) else {
            tracing::debug!("SASL frame from unknown agent {}", frame.agent);
            return Ok(());
        };
        if agent.sid != source_sid {
            tracing::warn!(
                "SASL agent {} not owned by source server {}",
                agent.nick,
                source_sid
            );
            return Ok(());
        }

        let Some(mut client) = clients.get_mut(&frame.target) else {
            tracing::debug!("SASL frame for unknown connection {}", frame.target);
            return Ok(());
        };

        match &client.sasl_agent {
            None => client.sasl_agent = Some(agent.uid.clone()),
            Some(pinned) if pinned != &agent.uid => {
                tracing::warn!(
                    "SASL frame from agent {} but {} is pinned to {}",
                    agent.uid,
                    client.uid,
                    pinned
                );
                return Ok(());
            }
            _ => {}
        }

        match frame.mode {
            'C' => {
                let Some(data) = frame.data.first() else {
                    return Ok(());
                };
                client.send(Message::new(
                    MessageType::Authenticate,
                    vec![data.clone()],
                ))?;
                client.sasl_messages += 1;
            }
            'D' => match frame.data.first().map(String::as_str) {
                Some("F") => {
                    client.send_numeric(
                        NumericReply::ErrSaslFail,
                        vec!["SASL authentication failed".to_string()],
                    )?;
                    if client.sasl_messages > 0 {
                        client.sasl_failures += 1;
                    }
                    // no data seen means the mechanism was unknown; that
                    // attempt does not count
                    client.clear_sasl_attempt();
                }
                Some("S") => {
                    client.send_numeric(
                        NumericReply::RplSaslSuccess,
                        vec!["SASL authentication successful".to_string()],
                    )?;
                    client.sasl_failures = 0;
                    client.sasl_complete = true;
                    client.clear_sasl_attempt();
                }
                other => {
                    tracing::debug!("Unknown SASL done payload {:?}", other);
                }
            },
            'M' => {
                let mechanisms = frame.data.first().cloned().unwrap_or_default();
                client.send_numeric(
                    NumericReply::RplSaslMechs,
                    vec![
                        mechanisms,
                        "are available SASL mechanisms".to_string(),
                    ],
                )?;
            }
            other => {
                tracing::debug!("Unknown SASL mode {:?} from {}", other, agent.nick);
            }
        }
        Ok(())
    }

    /// Inbound `ENCAP <mask> SVSLOGIN …` from the services link
    pub fn handle_encap_svslogin(
        &self,
        pool: &Database,
        clients: &ClientMap,
        links: &ServerConnectionManager,
        source_sid: &str,
        mask: &str,
        params: &[String],
    ) -> Result<()> {
        if self.forward_unless_mine(links, source_sid, mask, "SVSLOGIN", params) {
            return Ok(());
        }

        let Some(frame) = ts6::parse_svslogin(params) else {
            tracing::debug!("Malformed SVSLOGIN frame from {}", source_sid);
            return Ok(());
        };

        // a registered user cannot be retargeted in place; services must
        // log the account out first
        if pool.lookup_user(&frame.target).is_some() {
            tracing::warn!(
                "Rejecting SVSLOGIN for registered user {}",
                frame.target
            );
            return Ok(());
        }

        let Some(mut client) = clients.get_mut(&frame.target) else {
            tracing::debug!("SVSLOGIN for unknown connection {}", frame.target);
            return Ok(());
        };

        update_user_info(&mut client, &frame.nick, &frame.ident, &frame.cloak);
        match frame.account.as_str() {
            "0" => update_account(&mut client, None),
            name => update_account(&mut client, Some(name)),
        }
        Ok(())
    }

    /// Dispatch an inbound ENCAP message to the SASL handlers. Returns
    /// false when the sub-command is not ours.
    pub fn handle_encap(
        &self,
        pool: &Database,
        clients: &ClientMap,
        links: &ServerConnectionManager,
        message: &Message,
    ) -> Result<bool> {
        let Some(Prefix::Server(source_sid)) = &message.prefix else {
            return Ok(false);
        };
        if message.params.len() < 2 {
            return Ok(false);
        }
        let mask = &message.params[0];
        let rest = &message.params[2..];
        match message.params[1].as_str() {
            "SASL" => {
                self.handle_encap_sasl(pool, clients, links, source_sid, mask, rest)?;
                Ok(true)
            }
            "SVSLOGIN" => {
                self.handle_encap_svslogin(pool, clients, links, source_sid, mask, rest)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// ENCAP frames not addressed exactly to this server are forwarded and
    /// not consumed; only agents may respond to broadcast masks.
    fn forward_unless_mine(
        &self,
        links: &ServerConnectionManager,
        source_sid: &str,
        mask: &str,
        cmd: &str,
        params: &[String],
    ) -> bool {
        if mask.eq_ignore_ascii_case(&self.me_name) {
            return false;
        }
        let mut forward = vec![mask.to_string(), cmd.to_string()];
        forward.extend(params.iter().cloned());
        links.broadcast_to_servers(Message::with_prefix(
            Prefix::Server(source_sid.to_string()),
            MessageType::Encap,
            forward,
        ));
        true
    }
}

/// Apply identity fields from services; `*` means unchanged
pub fn update_user_info(client: &mut Client, nick: &str, ident: &str, cloak: &str) {
    if nick != "*" {
        client.nick = Some(nick.to_string());
    }
    if ident != "*" {
        client.ident = Some(ident.to_string());
    }
    if cloak != "*" {
        client.host = cloak.to_string();
    }
}

/// Set or clear the account this connection will log into on registration
pub fn update_account(client: &mut Client, account: Option<&str>) {
    client.sasl_account = account.map(|a| a.to_string());
}
