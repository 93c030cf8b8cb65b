//! The authoritative channel mode engine
//!
//! Takes a proposed mode delta, runs each change through per-mode handlers
//! with permission and parameter discipline, applies survivors to the
//! channel entity, and renders the applied list in both the client and the
//! server perspective. Recoverable problems skip the one change and the
//! rest of the batch proceeds.

use crate::channel::{status_level, Channel};
use crate::modes::{ChannelModeType, ModeChange, ModeStringOpts, ModeTable, ParamNeed};
use crate::server_connection::ServerConnectionManager;
use crate::{Database, Message, MessageType, NumericReply, Prefix, User};
use std::collections::HashMap;

/// Who is changing modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSource {
    /// A user, by UID
    User(String),
    /// A server, by name
    Server(String),
}

impl ModeSource {
    /// Whether the source is a server
    pub fn is_server(&self) -> bool {
        matches!(self, ModeSource::Server(_))
    }

    /// The UID or server name, for the s2s source field
    pub fn id(&self) -> &str {
        match self {
            ModeSource::User(uid) => uid,
            ModeSource::Server(name) => name,
        }
    }

    /// Human-readable name, used as list-entry setter
    pub fn describe(&self, pool: &Database) -> String {
        match self {
            ModeSource::User(uid) => pool
                .lookup_user(uid)
                .map(|u| u.nick)
                .unwrap_or_else(|| uid.clone()),
            ModeSource::Server(name) => name.clone(),
        }
    }

    /// Message prefix for fan-out
    pub fn prefix(&self, pool: &Database) -> Prefix {
        match self {
            ModeSource::User(uid) => match pool.lookup_user(uid) {
                Some(user) => user.prefix(),
                None => Prefix::Server(uid.clone()),
            },
            ModeSource::Server(name) => Prefix::Server(name.clone()),
        }
    }

    /// The source user, when it is a local user
    fn local_user(&self, pool: &Database) -> Option<User> {
        match self {
            ModeSource::User(uid) => pool.lookup_user(uid).filter(|u| u.is_local()),
            ModeSource::Server(_) => None,
        }
    }
}

/// Mutable per-change record handed to mode handlers
#[derive(Debug)]
pub struct ModeCtx {
    /// true to set, false to unset
    pub state: bool,
    /// Parameter as supplied; handlers may normalize it
    pub param: Option<String>,
    /// Skip permission checks
    pub force: bool,
    /// Parameters are in server perspective (UIDs)
    pub over_protocol: bool,
    /// Precomputed: force, server source, or basic status on the channel
    pub has_basic_status: bool,
    /// Handler demands ERR_CHANOPRIVSNEEDED regardless of other outcomes
    pub send_no_privs: bool,
    /// Handler already reported the failure; suppress the privilege numeric
    pub hide_no_privs: bool,
}

/// Per-mode handler: returns whether the change goes through. Handlers for
/// list, status, and key modes apply their own entity mutations.
pub type ModeHandler =
    Box<dyn Fn(&Database, &mut Channel, &ModeSource, &str, &mut ModeCtx) -> bool + Send + Sync>;

/// The mode engine for the local server
pub struct ModeEngine {
    /// The mode table changes are interpreted against
    pub table: ModeTable,
    handlers: HashMap<String, ModeHandler>,
    me_name: String,
    me_sid: String,
}

impl ModeEngine {
    /// Create an engine with the standard table and handlers
    pub fn new(me_name: &str, me_sid: &str) -> Self {
        let mut engine = Self {
            table: ModeTable::with_defaults(),
            handlers: HashMap::new(),
            me_name: me_name.to_string(),
            me_sid: me_sid.to_string(),
        };
        engine.register_defaults();
        engine
    }

    /// Register (or replace) the handler for a mode
    pub fn register_handler(&mut self, name: &str, handler: ModeHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    fn register_defaults(&mut self) {
        for name in [
            "moderated",
            "invite_only",
            "no_ext",
            "protect_topic",
            "secret",
            "private",
        ] {
            self.register_handler(name, Box::new(hmode_normal));
        }
        self.register_handler("limit", Box::new(hmode_limit));
        self.register_handler("key", Box::new(hmode_key));
        self.register_handler(
            "ban",
            banlike_handler(NumericReply::RplBanList, NumericReply::RplEndOfBanList, "ban"),
        );
        self.register_handler(
            "except",
            banlike_handler(
                NumericReply::RplExceptList,
                NumericReply::RplEndOfExceptList,
                "exception",
            ),
        );
        for name in ["owner", "admin", "op", "halfop", "voice"] {
            self.register_handler(name, Box::new(hmode_status));
        }
    }

    /// Run a change list through the pipeline against a channel. Returns
    /// the changes that were actually applied.
    pub fn handle_modes(
        &self,
        pool: &Database,
        channel: &mut Channel,
        source: &ModeSource,
        changes: Vec<ModeChange>,
        force: bool,
        over_protocol: bool,
    ) -> Vec<ModeChange> {
        let mut applied = Vec::new();

        for change in changes {
            let Some(mode_type) = self.table.cmode_type(&change.name) else {
                tracing::debug!("Skipping unknown mode {} on {}", change.name, channel.name);
                continue;
            };

            if self.table.cmode_takes_parameter(&change.name, change.state)
                == Some(ParamNeed::Mandatory)
                && change.param.is_none()
            {
                tracing::debug!(
                    "Skipping mode {} on {}: missing parameter",
                    change.name,
                    channel.name
                );
                continue;
            }

            let has_basic_status = force
                || source.is_server()
                || match source {
                    ModeSource::User(uid) => channel.user_has_basic_status(uid),
                    ModeSource::Server(_) => true,
                };

            let mut ctx = ModeCtx {
                state: change.state,
                param: change.param.clone(),
                force,
                over_protocol,
                has_basic_status,
                send_no_privs: false,
                hide_no_privs: false,
            };

            let ok = match self.handlers.get(&change.name) {
                Some(handler) => handler(pool, channel, source, &change.name, &mut ctx),
                None => true,
            };

            if let Some(user) = source.local_user(pool) {
                if ctx.send_no_privs || (!ok && !ctx.has_basic_status && !ctx.hide_no_privs) {
                    let _ = user.send_numeric_message(NumericReply::chanop_privs_needed(
                        &user.nick,
                        &channel.name,
                    ));
                }
            }

            if !ok {
                continue;
            }

            match mode_type {
                ChannelModeType::Normal => {
                    if ctx.state {
                        channel.set_mode(&change.name, None);
                    } else {
                        channel.unset_mode(&change.name);
                    }
                }
                ChannelModeType::Parameter | ChannelModeType::ParameterSet => {
                    if ctx.state {
                        channel.set_mode(&change.name, ctx.param.clone());
                    } else {
                        channel.unset_mode(&change.name);
                    }
                }
                // list, status, and key handlers mutate the entity themselves
                ChannelModeType::List | ChannelModeType::Status | ChannelModeType::Key => {}
            }

            applied.push(ModeChange {
                state: ctx.state,
                name: change.name,
                param: ctx.param,
            });
        }

        applied
    }

    /// Parse a mode string and run it through `handle_modes`
    pub fn handle_mode_string(
        &self,
        pool: &Database,
        channel: &mut Channel,
        source: &ModeSource,
        mode_string: &str,
        force: bool,
        over_protocol: bool,
    ) -> Vec<ModeChange> {
        let changes = self.table.cmodes_from_string(mode_string, over_protocol);
        self.handle_modes(pool, channel, source, changes, force, over_protocol)
    }

    /// Apply a change list and fan the result out: MODE lines to local
    /// members and, unless `local_only`, a CMODE broadcast to peers.
    pub fn do_modes(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        channel: &mut Channel,
        source: &ModeSource,
        changes: Vec<ModeChange>,
        force: bool,
        over_protocol: bool,
        local_only: bool,
    ) -> Vec<ModeChange> {
        let applied = self.handle_modes(pool, channel, source, changes, force, over_protocol);
        if applied.is_empty() {
            return applied;
        }

        let resolve = |uid: &str| pool.resolve_nick(uid);
        let user_lines = self.table.strings_from_cmodes(
            &applied,
            ModeStringOpts {
                split: true,
                ..Default::default()
            },
            &resolve,
        );
        let prefix = source.prefix(pool);
        for line in &user_lines {
            let mut params = vec![channel.name.clone()];
            params.extend(line.split_whitespace().map(String::from));
            let message = Message::with_prefix(prefix.clone(), MessageType::Mode, params);
            sendfrom_all(pool, channel, &message);
        }

        if !local_only {
            let server_line = self
                .table
                .strings_from_cmodes(
                    &applied,
                    ModeStringOpts {
                        over_protocol: true,
                        ..Default::default()
                    },
                    &resolve,
                )
                .remove(0);
            let mut params = vec![
                source.id().to_string(),
                channel.name.clone(),
                channel.time.to_string(),
                self.me_sid.clone(),
            ];
            params.extend(server_line.split_whitespace().map(String::from));
            let message = Message::with_prefix(
                Prefix::Server(self.me_sid.clone()),
                MessageType::Cmode,
                params,
            );
            links.broadcast_to_servers(message);
        }

        applied
    }

    /// Parse a mode string, apply it, and fan the result out
    pub fn do_mode_string(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        channel: &mut Channel,
        source: &ModeSource,
        mode_string: &str,
        force: bool,
        over_protocol: bool,
        local_only: bool,
    ) -> Vec<ModeChange> {
        let changes = self.table.cmodes_from_string(mode_string, over_protocol);
        self.do_modes(
            pool,
            links,
            channel,
            source,
            changes,
            force,
            over_protocol,
            local_only,
        )
    }

    /// Name of the local server
    pub fn me_name(&self) -> &str {
        &self.me_name
    }

    /// SID of the local server
    pub fn me_sid(&self) -> &str {
        &self.me_sid
    }
}

/// Send a message to every local member of a channel
pub fn sendfrom_all(pool: &Database, channel: &Channel, message: &Message) {
    for uid in channel.members() {
        if let Some(user) = pool.lookup_user(uid) {
            if user.is_local() {
                let _ = user.send(message.clone());
            }
        }
    }
}

// Shared handler for modes that only need basic status
fn hmode_normal(
    _pool: &Database,
    _channel: &mut Channel,
    _source: &ModeSource,
    _name: &str,
    ctx: &mut ModeCtx,
) -> bool {
    ctx.force || ctx.has_basic_status
}

fn hmode_limit(
    _pool: &Database,
    _channel: &mut Channel,
    _source: &ModeSource,
    name: &str,
    ctx: &mut ModeCtx,
) -> bool {
    if !(ctx.force || ctx.has_basic_status) {
        return false;
    }
    if ctx.state {
        match ctx.param.as_deref().and_then(|p| p.parse::<u32>().ok()) {
            Some(limit) if limit > 0 => {
                ctx.param = Some(limit.to_string());
            }
            _ => {
                tracing::debug!("Skipping {} with non-numeric parameter", name);
                ctx.hide_no_privs = true;
                return false;
            }
        }
    }
    true
}

fn hmode_key(
    _pool: &Database,
    channel: &mut Channel,
    _source: &ModeSource,
    name: &str,
    ctx: &mut ModeCtx,
) -> bool {
    if !(ctx.force || ctx.has_basic_status) {
        return false;
    }
    if ctx.state {
        channel.set_mode(name, ctx.param.clone());
    } else {
        // a parameter, if supplied, is consumed but not required to match
        channel.unset_mode(name);
    }
    true
}

fn banlike_handler(
    list_reply: NumericReply,
    end_reply: NumericReply,
    label: &'static str,
) -> ModeHandler {
    Box::new(
        move |pool: &Database,
              channel: &mut Channel,
              source: &ModeSource,
              name: &str,
              ctx: &mut ModeCtx| {
            let Some(param) = ctx.param.clone() else {
                // view path: no parameter means list the entries
                if let ModeSource::User(uid) = source {
                    if let Some(user) = pool.lookup_user(uid) {
                        if user.is_local() {
                            for entry in channel.list_elements(name) {
                                let _ = user.send_numeric_message(list_reply.reply(
                                    &user.nick,
                                    vec![
                                        channel.name.clone(),
                                        entry.value.clone(),
                                        entry.setby.clone(),
                                        entry.time.to_string(),
                                    ],
                                ));
                            }
                            let _ = user.send_numeric_message(end_reply.reply(
                                &user.nick,
                                vec![
                                    channel.name.clone(),
                                    format!("End of channel {} list", label),
                                ],
                            ));
                        }
                    }
                }
                ctx.hide_no_privs = true;
                return false;
            };

            if !(ctx.force || ctx.has_basic_status) {
                ctx.send_no_privs = true;
                return false;
            }

            let applied = if ctx.state {
                let setby = source.describe(pool);
                channel.add_to_list(name, &param, &setby)
            } else {
                channel.remove_from_list(name, &param)
            };
            if !applied {
                ctx.hide_no_privs = true;
            }
            applied
        },
    )
}

// Shared handler for status modes (voice through owner)
fn hmode_status(
    pool: &Database,
    channel: &mut Channel,
    source: &ModeSource,
    name: &str,
    ctx: &mut ModeCtx,
) -> bool {
    let Some(param) = ctx.param.clone() else {
        return false;
    };

    let target = if ctx.over_protocol {
        pool.lookup_user(&param)
    } else {
        pool.lookup_user_nick(&param)
    };
    let local_source = source.local_user(pool);

    let Some(target) = target else {
        if let Some(user) = &local_source {
            if !ctx.force {
                let _ = user.send_numeric_message(NumericReply::no_such_nick(&user.nick, &param));
            }
        }
        ctx.hide_no_privs = true;
        return false;
    };

    if !channel.has_user(&target.uid) {
        if let Some(user) = &local_source {
            if !ctx.force {
                let _ = user.send_numeric_message(NumericReply::user_not_in_channel(
                    &user.nick,
                    &target.nick,
                    &channel.name,
                ));
            }
        }
        ctx.hide_no_privs = true;
        return false;
    }

    if !ctx.force && !source.is_server() {
        if !ctx.has_basic_status {
            return false;
        }
        if let ModeSource::User(source_uid) = source {
            let source_level = channel.user_get_highest_level(source_uid);
            let target_level = channel.user_get_highest_level(&target.uid);
            let mode_level = status_level(name).unwrap_or(0);
            let outranks_target = ctx.state || source_level >= target_level;
            if !outranks_target || source_level < mode_level {
                ctx.send_no_privs = true;
                return false;
            }
        }
    }

    let applied = if ctx.state {
        let setby = source.describe(pool);
        channel.add_to_list(name, &target.uid, &setby)
    } else {
        channel.remove_from_list(name, &target.uid)
    };
    if !applied {
        ctx.hide_no_privs = true;
        return false;
    }

    // normalized to the UID for serialization in both perspectives
    ctx.param = Some(target.uid);
    true
}
