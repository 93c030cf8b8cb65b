//! Channel operations module
//!
//! Join, part, kick, topic, NAMES, message fan-out, and channel timestamp
//! reconciliation, built on the core channel entity and mode engine. Local
//! members always see an event before it is forwarded to peers.

use oxircd_core::channel::status_level;
use oxircd_core::mode_engine::sendfrom_all;
use oxircd_core::modes::{ChannelModeType, ModeChange, LEVEL_BASIC};
use oxircd_core::{
    Channel, Database, Message, MessageType, ModeEngine, ModeSource, NumericReply, Prefix, Result,
    ServerConnectionManager, User,
};
use std::collections::{HashMap, HashSet};

/// Maximum length of one RPL_NAMREPLY name payload
const NAMES_BUCKET_LEN: usize = 500;

/// Listener returning false to stop a join; the listener sends its own
/// numeric if it wants one.
pub type CanJoinHook = Box<dyn Fn(&Database, &Channel, &User) -> bool + Send + Sync>;
/// Listener returning false to hide a member from NAMES
pub type ShowInNamesHook = Box<dyn Fn(&Channel, &User) -> bool + Send + Sync>;
/// Listener returning false to veto destruction of an empty channel
pub type CanDestroyHook = Box<dyn Fn(&Channel) -> bool + Send + Sync>;
/// Listener returning false to stop a PRIVMSG/NOTICE
pub type CanMessageHook = Box<dyn Fn(&Channel, &User, &MessageType, &str) -> bool + Send + Sync>;
/// Notification listener for completed joins
pub type UserJoinedHook = Box<dyn Fn(&Channel, &User) + Send + Sync>;

/// Listener vectors for channel lifecycle events
#[derive(Default)]
pub struct ChannelEvents {
    can_join: Vec<CanJoinHook>,
    show_in_names: Vec<ShowInNamesHook>,
    can_destroy: Vec<CanDestroyHook>,
    can_message: Vec<CanMessageHook>,
    /// Per-command message gates, keyed by lowercased command name
    can_command: HashMap<String, Vec<CanMessageHook>>,
    user_joined: Vec<UserJoinedHook>,
}

impl ChannelEvents {
    pub fn on_can_join(&mut self, hook: CanJoinHook) {
        self.can_join.push(hook);
    }

    pub fn on_show_in_names(&mut self, hook: ShowInNamesHook) {
        self.show_in_names.push(hook);
    }

    pub fn on_can_destroy(&mut self, hook: CanDestroyHook) {
        self.can_destroy.push(hook);
    }

    pub fn on_can_message(&mut self, hook: CanMessageHook) {
        self.can_message.push(hook);
    }

    /// Gate a single command (privmsg, notice) instead of all messages
    pub fn on_can_command(&mut self, command: &str, hook: CanMessageHook) {
        self.can_command
            .entry(command.to_lowercase())
            .or_default()
            .push(hook);
    }

    pub fn on_user_joined(&mut self, hook: UserJoinedHook) {
        self.user_joined.push(hook);
    }
}

/// Channel operations module
pub struct ChannelModule {
    /// The local mode engine
    pub engine: ModeEngine,
    /// Modes applied to newly created channels (`+user` becomes the UID)
    automodes: Option<String>,
    /// Lifecycle listeners
    pub events: ChannelEvents,
}

impl ChannelModule {
    /// Create the module for the local server
    pub fn new(me_name: &str, me_sid: &str, automodes: Option<String>) -> Self {
        Self {
            engine: ModeEngine::new(me_name, me_sid),
            automodes,
            events: ChannelEvents::default(),
        }
    }

    /// Dispatch one decoded command from a registered local user
    pub fn handle_message(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        uid: &str,
        message: &Message,
    ) -> Result<()> {
        match &message.command {
            MessageType::Join => {
                let Some(name) = message.params.first() else {
                    return self.need_more_params(pool, uid, "JOIN");
                };
                let key = message.params.get(1).map(|s| s.as_str());
                self.attempt_local_join(pool, links, name, uid, key)
            }
            MessageType::Part => {
                let Some(name) = message.params.first() else {
                    return self.need_more_params(pool, uid, "PART");
                };
                let reason = message.params.get(1).cloned();
                self.handle_part(pool, links, name, uid, reason)
            }
            MessageType::Kick => {
                if message.params.len() < 2 {
                    return self.need_more_params(pool, uid, "KICK");
                }
                let reason = message.params.get(2).cloned();
                self.handle_kick(
                    pool,
                    links,
                    &message.params[0],
                    uid,
                    &message.params[1],
                    reason,
                )
            }
            MessageType::Mode => {
                let Some(name) = message.params.first() else {
                    return self.need_more_params(pool, uid, "MODE");
                };
                self.handle_mode_command(pool, links, name, uid, &message.params[1..])
            }
            MessageType::Topic => {
                let Some(name) = message.params.first() else {
                    return self.need_more_params(pool, uid, "TOPIC");
                };
                self.handle_topic(pool, links, name, uid, message.params.get(1).cloned())
            }
            MessageType::Names => {
                let Some(name) = message.params.first() else {
                    return Ok(());
                };
                if let (Some(channel), Some(user)) =
                    (pool.get_channel(name), pool.lookup_user(uid))
                {
                    self.names(pool, &channel, &user, false);
                }
                Ok(())
            }
            MessageType::PrivMsg | MessageType::Notice => {
                if message.params.len() < 2 {
                    return self.need_more_params(pool, uid, "PRIVMSG");
                }
                self.handle_privmsgnotice(
                    pool,
                    links,
                    message.command.clone(),
                    uid,
                    &message.params[0],
                    &message.params[1],
                )
            }
            _ => Ok(()),
        }
    }

    /// A local user asked to join a channel
    pub fn attempt_local_join(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        uid: &str,
        key: Option<&str>,
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(uid).filter(|u| u.is_local()) else {
            return Ok(());
        };

        if !oxircd_core::utils::string::is_valid_channel_name(name) {
            return user.send_numeric(
                NumericReply::ErrNoSuchChannel,
                vec![name.to_string(), "Invalid channel name".to_string()],
            );
        }

        let (mut channel, is_new) = match pool.get_channel(name) {
            Some(channel) => (channel, false),
            None => (Channel::new(name.to_string()), true),
        };

        if channel.has_user(uid) {
            return Ok(());
        }

        if !self.can_join(pool, &channel, &user, key)? {
            user.fire_event("join_failed", vec![channel.name.clone()]);
            return Ok(());
        }

        if is_new {
            // pre-add, then automodes, then burst, then the join proper
            channel.add(uid);
            if let Some(automodes) = &self.automodes {
                let mode_string = automodes.replace("+user", uid);
                self.engine.handle_mode_string(
                    pool,
                    &mut channel,
                    &ModeSource::Server(self.engine.me_name().to_string()),
                    &mode_string,
                    false,
                    true,
                );
            }
            pool.add_channel(channel.clone())?;
            self.channel_burst(pool, links, &channel);
        } else {
            links.broadcast_to_servers(Message::with_prefix(
                Prefix::Server(uid.to_string()),
                MessageType::Join,
                vec![channel.time.to_string(), channel.name.clone(), "+".to_string()],
            ));
        }

        self.do_join(pool, &mut channel, uid, is_new);
        pool.update_channel(channel);
        Ok(())
    }

    /// Add a user to a channel and tell everyone. With `allow_already`,
    /// a pre-added member still gets the join treatment.
    pub fn do_join(&self, pool: &Database, channel: &mut Channel, uid: &str, allow_already: bool) {
        if channel.has_user(uid) && !allow_already {
            return;
        }
        channel.add(uid);

        let Some(user) = pool.lookup_user(uid) else {
            return;
        };

        let plain = Message::with_prefix(
            user.prefix(),
            MessageType::Join,
            vec![channel.name.clone()],
        );
        let extended = Message::with_prefix(
            user.prefix(),
            MessageType::Join,
            vec![
                channel.name.clone(),
                user.account_name().to_string(),
                user.realname.clone(),
            ],
        );
        for member_uid in channel.members() {
            let Some(member) = pool.lookup_user(member_uid).filter(|m| m.is_local()) else {
                continue;
            };
            let message = if member.has_cap("extended-join") {
                extended.clone()
            } else {
                plain.clone()
            };
            let _ = member.send(message);
        }

        if let Some(away) = &user.away_message {
            let away_message = Message::with_prefix(
                user.prefix(),
                MessageType::Away,
                vec![away.clone()],
            );
            for member_uid in channel.members() {
                if member_uid == uid {
                    continue;
                }
                if let Some(member) = pool.lookup_user(member_uid).filter(|m| m.is_local()) {
                    if member.has_cap("away-notify") {
                        let _ = member.send(away_message.clone());
                    }
                }
            }
        }

        if user.is_local() {
            self.send_topic(pool, channel, &user, false);
            self.names(pool, channel, &user, false);
        }

        for hook in &self.events.user_joined {
            hook(channel, &user);
        }
        tracing::debug!("{} joined {}", user.nick, channel.name);
    }

    fn can_join(
        &self,
        pool: &Database,
        channel: &Channel,
        user: &User,
        key: Option<&str>,
    ) -> Result<bool> {
        if channel.is_mode("invite_only") {
            user.send_numeric(
                NumericReply::ErrInviteOnlyChan,
                vec![
                    channel.name.clone(),
                    "Cannot join channel (+i)".to_string(),
                ],
            )?;
            return Ok(false);
        }

        if let Some(wanted) = channel.mode_parameter("key") {
            if key != Some(wanted) {
                user.send_numeric(
                    NumericReply::ErrBadChannelKey,
                    vec![
                        channel.name.clone(),
                        "Cannot join channel (+k)".to_string(),
                    ],
                )?;
                return Ok(false);
            }
        }

        if let Some(limit) = channel
            .mode_parameter("limit")
            .and_then(|l| l.parse::<usize>().ok())
        {
            if channel.member_count() >= limit {
                user.send_numeric(
                    NumericReply::ErrChannelIsFull,
                    vec![
                        channel.name.clone(),
                        "Cannot join channel (+l)".to_string(),
                    ],
                )?;
                return Ok(false);
            }
        }

        if user_matches_list(channel, "ban", user) && !user_matches_list(channel, "except", user) {
            user.send_numeric(
                NumericReply::ErrBannedFromChan,
                vec![
                    channel.name.clone(),
                    "Cannot join channel (+b)".to_string(),
                ],
            )?;
            return Ok(false);
        }

        for hook in &self.events.can_join {
            if !hook(pool, channel, user) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn handle_part(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        uid: &str,
        reason: Option<String>,
    ) -> Result<()> {
        let Some(mut channel) = pool.get_channel(name) else {
            return self.not_on_channel(pool, uid, name);
        };
        if !channel.has_user(uid) {
            return self.not_on_channel(pool, uid, name);
        }

        self.do_part(pool, &mut channel, uid, reason.clone(), false);

        let mut params = vec![channel.name.clone()];
        params.extend(reason);
        links.broadcast_to_servers(Message::with_prefix(
            Prefix::Server(uid.to_string()),
            MessageType::Part,
            params,
        ));

        self.finish_channel(pool, channel);
        Ok(())
    }

    /// Remove a parting user, telling the channel first
    pub fn do_part(
        &self,
        pool: &Database,
        channel: &mut Channel,
        uid: &str,
        reason: Option<String>,
        quiet: bool,
    ) -> bool {
        if !channel.has_user(uid) {
            return false;
        }
        let Some(user) = pool.lookup_user(uid) else {
            return false;
        };

        let mut params = vec![channel.name.clone()];
        params.extend(reason.clone());
        let message = Message::with_prefix(user.prefix(), MessageType::Part, params);
        sendfrom_all(pool, channel, &message);

        channel.remove(&self.engine.table, uid);
        if !quiet {
            tracing::info!(
                target: "snotice",
                "user_part: {} parted {} ({})",
                user.nick,
                channel.name,
                reason.as_deref().unwrap_or("no reason")
            );
        }
        true
    }

    fn handle_kick(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        uid: &str,
        target_nick: &str,
        reason: Option<String>,
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(uid) else {
            return Ok(());
        };
        let Some(mut channel) = pool.get_channel(name) else {
            return self.not_on_channel(pool, uid, name);
        };
        let Some(target) = pool.lookup_user_nick(target_nick) else {
            return user.send_numeric_message(NumericReply::no_such_nick(&user.nick, target_nick));
        };
        if !channel.has_user(&target.uid) {
            return user.send_numeric_message(NumericReply::user_not_in_channel(
                &user.nick,
                &target.nick,
                &channel.name,
            ));
        }

        let source_level = channel.user_get_highest_level(uid);
        let target_level = channel.user_get_highest_level(&target.uid);
        if source_level < LEVEL_BASIC || source_level < target_level {
            return user.send_numeric_message(NumericReply::chanop_privs_needed(
                &user.nick,
                &channel.name,
            ));
        }

        self.user_get_kicked(
            pool,
            &mut channel,
            &target.uid,
            &ModeSource::User(uid.to_string()),
            reason.clone(),
        );

        let mut params = vec![channel.name.clone(), target.uid.clone()];
        params.push(reason.unwrap_or_else(|| user.nick.clone()));
        links.broadcast_to_servers(Message::with_prefix(
            Prefix::Server(uid.to_string()),
            MessageType::Kick,
            params,
        ));

        self.finish_channel(pool, channel);
        Ok(())
    }

    /// Remove a kicked user, telling the channel first. The reason
    /// defaults to the kicker's name.
    pub fn user_get_kicked(
        &self,
        pool: &Database,
        channel: &mut Channel,
        target_uid: &str,
        source: &ModeSource,
        reason: Option<String>,
    ) -> bool {
        if !channel.has_user(target_uid) {
            return false;
        }
        let Some(target) = pool.lookup_user(target_uid) else {
            return false;
        };
        let reason = reason.unwrap_or_else(|| source.describe(pool));

        let message = Message::with_prefix(
            source.prefix(pool),
            MessageType::Kick,
            vec![channel.name.clone(), target.nick.clone(), reason.clone()],
        );
        sendfrom_all(pool, channel, &message);

        if !source.is_server() {
            tracing::info!(
                target: "snotice",
                "user_kick: {} kicked {} from {} ({})",
                source.describe(pool),
                target.nick,
                channel.name,
                reason
            );
        }
        channel.remove(&self.engine.table, target_uid)
    }

    fn handle_topic(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        uid: &str,
        new_topic: Option<String>,
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(uid) else {
            return Ok(());
        };
        let Some(mut channel) = pool.get_channel(name) else {
            return self.not_on_channel(pool, uid, name);
        };

        let Some(text) = new_topic else {
            self.send_topic(pool, &channel, &user, true);
            return Ok(());
        };

        if channel.is_mode("protect_topic") && !channel.user_has_basic_status(uid) {
            return user.send_numeric_message(NumericReply::chanop_privs_needed(
                &user.nick,
                &channel.name,
            ));
        }

        if text.is_empty() {
            channel.clear_topic();
        } else {
            channel.set_topic(text.clone(), user.full_mask());
        }
        let message = Message::with_prefix(
            user.prefix(),
            MessageType::Topic,
            vec![channel.name.clone(), text.clone()],
        );
        sendfrom_all(pool, &channel, &message);
        links.broadcast_to_servers(Message::with_prefix(
            Prefix::Server(uid.to_string()),
            MessageType::Topic,
            vec![channel.name.clone(), text],
        ));

        pool.update_channel(channel);
        Ok(())
    }

    /// Send the topic numerics to a user. With `with_notopic`, an unset
    /// topic produces RPL_NOTOPIC instead of silence.
    pub fn send_topic(
        &self,
        _pool: &Database,
        channel: &Channel,
        user: &User,
        with_notopic: bool,
    ) {
        match channel.topic() {
            Some(topic) => {
                let _ = user.send_numeric(
                    NumericReply::RplTopic,
                    vec![channel.name.clone(), topic.text.clone()],
                );
                let _ = user.send_numeric(
                    NumericReply::RplTopicWhoTime,
                    vec![
                        channel.name.clone(),
                        topic.setby.clone(),
                        topic.time.to_string(),
                    ],
                );
            }
            None if with_notopic => {
                let _ = user.send_numeric(
                    NumericReply::RplNoTopic,
                    vec![channel.name.clone(), "No topic is set".to_string()],
                );
            }
            None => {}
        }
    }

    /// Send RPL_NAMREPLY buckets for a channel
    pub fn names(&self, pool: &Database, channel: &Channel, user: &User, no_endof: bool) {
        let channel_char = if channel.is_mode("secret") {
            "@"
        } else if channel.is_mode("private") {
            "*"
        } else {
            "="
        };
        let multi = user.has_cap("multi-prefix");
        let shares_channel = channel.has_user(&user.uid);

        let mut buckets: Vec<String> = Vec::new();
        let mut current = String::new();
        for member_uid in channel.members() {
            let Some(member) = pool.lookup_user(member_uid) else {
                continue;
            };
            if !self
                .events
                .show_in_names
                .iter()
                .all(|hook| hook(channel, &member))
            {
                continue;
            }
            if member.is_mode('i') && !shares_channel && !user.is_mode('o') {
                continue;
            }

            let token = format!("{}{}", channel.prefixes(member_uid, multi), member.nick);
            if !current.is_empty() && current.len() + token.len() + 1 > NAMES_BUCKET_LEN {
                buckets.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&token);
        }
        if !current.is_empty() {
            buckets.push(current);
        }

        for bucket in buckets {
            let _ = user.send_numeric(
                NumericReply::RplNameReply,
                vec![channel_char.to_string(), channel.name.clone(), bucket],
            );
        }
        if !no_endof {
            let _ = user.send_numeric(
                NumericReply::RplEndOfNames,
                vec![channel.name.clone(), "End of /NAMES list".to_string()],
            );
        }
    }

    /// PRIVMSG/NOTICE fan-out: local members first, then each remote
    /// location once, skipping locations reachable through the source.
    pub fn handle_privmsgnotice(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        command: MessageType,
        source_uid: &str,
        name: &str,
        text: &str,
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(source_uid) else {
            return Ok(());
        };
        let Some(channel) = pool.get_channel(name) else {
            if user.is_local() {
                return user.send_numeric_message(NumericReply::no_such_nick(&user.nick, name));
            }
            return Ok(());
        };

        if !self.can_message(&channel, &user, &command, text) {
            if user.is_local() && command == MessageType::PrivMsg {
                user.send_numeric(
                    NumericReply::ErrCannotSendToChan,
                    vec![channel.name.clone(), "Cannot send to channel".to_string()],
                )?;
            }
            return Ok(());
        }

        let message = Message::with_prefix(
            user.prefix(),
            command.clone(),
            vec![channel.name.clone(), text.to_string()],
        );
        for member_uid in channel.members() {
            if member_uid == source_uid {
                continue;
            }
            let Some(member) = pool.lookup_user(member_uid).filter(|m| m.is_local()) else {
                continue;
            };
            if member.is_mode('D') {
                continue;
            }
            let _ = member.send(message.clone());
        }

        let wire = Message::with_prefix(
            Prefix::Server(source_uid.to_string()),
            command,
            vec![channel.name.clone(), text.to_string()],
        );
        let mut locations: HashSet<String> = HashSet::new();
        for member_uid in channel.members() {
            let Some(member) = pool.lookup_user(member_uid).filter(|m| !m.is_local()) else {
                continue;
            };
            if member.sid == user.sid {
                continue;
            }
            if !locations.insert(member.sid.clone()) {
                continue;
            }
            if let Err(e) = links.send_to_server(&member.server, wire.clone()) {
                tracing::debug!("Dropping forward to {}: {}", member.server, e);
            }
        }

        user.fire_event(
            &wire.command.to_string().to_lowercase(),
            vec![channel.name.clone(), text.to_string()],
        );
        Ok(())
    }

    fn can_message(
        &self,
        channel: &Channel,
        user: &User,
        command: &MessageType,
        text: &str,
    ) -> bool {
        let level = channel.user_get_highest_level(&user.uid);
        let voiced = level >= status_level("voice").unwrap_or(-1);

        if channel.is_mode("no_ext") && !channel.has_user(&user.uid) {
            return false;
        }
        if channel.is_mode("moderated") && !voiced {
            return false;
        }
        if channel.has_user(&user.uid)
            && !voiced
            && user_matches_list(channel, "ban", user)
            && !user_matches_list(channel, "except", user)
        {
            return false;
        }

        // can_message and the per-command gate fire together
        if !self
            .events
            .can_message
            .iter()
            .all(|hook| hook(channel, user, command, text))
        {
            return false;
        }
        self.events
            .can_command
            .get(&command.to_string().to_lowercase())
            .map(|hooks| hooks.iter().all(|hook| hook(channel, user, command, text)))
            .unwrap_or(true)
    }

    /// MODE command for a channel: a bare target is the view path,
    /// anything else goes through the engine.
    pub fn handle_mode_command(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        uid: &str,
        args: &[String],
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(uid) else {
            return Ok(());
        };
        let Some(mut channel) = pool.get_channel(name) else {
            return user.send_numeric_message(NumericReply::no_such_nick(&user.nick, name));
        };

        if args.is_empty() {
            let show_hidden = channel.has_user(uid);
            let mut params = vec![channel.name.clone()];
            params.extend(
                channel
                    .mode_string(&self.engine.table, show_hidden)
                    .split_whitespace()
                    .map(String::from),
            );
            user.send_numeric(NumericReply::RplChannelModeIs, params)?;
            return user.send_numeric(
                NumericReply::RplCreationTime,
                vec![channel.name.clone(), channel.time.to_string()],
            );
        }

        let mode_string = args.join(" ");
        self.engine.do_mode_string(
            pool,
            links,
            &mut channel,
            &ModeSource::User(uid.to_string()),
            &mode_string,
            false,
            false,
            false,
        );
        pool.update_channel(channel);
        Ok(())
    }

    /// Reconcile the channel timestamp against an incoming claim. A lower
    /// incoming time wins: the topic is dropped and, unless
    /// `ignore_modes`, every mode is cleared with a forced negative mode
    /// change announced to members.
    pub fn take_lower_time(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        channel: &mut Channel,
        time: i64,
        ignore_modes: bool,
    ) -> i64 {
        if time >= channel.time {
            return channel.time;
        }

        channel.set_time(time);

        if channel.topic().is_some() {
            let message = Message::with_prefix(
                Prefix::Server(self.engine.me_name().to_string()),
                MessageType::Topic,
                vec![channel.name.clone(), String::new()],
            );
            sendfrom_all(pool, channel, &message);
            channel.clear_topic();
        }

        if !ignore_modes {
            let negated: Vec<ModeChange> = channel
                .current_changes(&self.engine.table, false)
                .into_iter()
                .map(|change| {
                    let param = match self.engine.table.cmode_type(&change.name) {
                        Some(ChannelModeType::Normal) | Some(ChannelModeType::ParameterSet) => {
                            None
                        }
                        _ => change.param,
                    };
                    ModeChange {
                        state: false,
                        name: change.name,
                        param,
                    }
                })
                .collect();
            self.engine.do_modes(
                pool,
                links,
                channel,
                &ModeSource::Server(self.engine.me_name().to_string()),
                negated,
                true,
                true,
                true,
            );
        }

        for member_uid in channel.members() {
            if let Some(member) = pool.lookup_user(member_uid).filter(|m| m.is_local()) {
                let _ = member.server_notice(&format!(
                    "New channel time for {}: {}",
                    channel.name, channel.time
                ));
            }
        }

        channel.time
    }

    /// Describe the channel to peers: `CBURST <name> <ts> <modes…>`
    pub fn channel_burst(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        channel: &Channel,
    ) {
        let resolve = |uid: &str| pool.resolve_nick(uid);
        let (_, server_view) = channel.mode_string_all(&self.engine.table, false, &resolve);
        let mut params = vec![channel.name.clone(), channel.time.to_string()];
        params.extend(server_view.split_whitespace().map(String::from));
        links.broadcast_to_servers(Message::with_prefix(
            Prefix::Server(self.engine.me_sid().to_string()),
            MessageType::ChannelBurst,
            params,
        ));
    }

    /// Apply an incoming channel burst: TS reconciliation, then the
    /// asserted modes under force.
    pub fn handle_channel_burst(
        &self,
        pool: &Database,
        links: &ServerConnectionManager,
        name: &str,
        time: i64,
        mode_string: &str,
    ) -> Result<()> {
        let mut channel = match pool.get_channel(name) {
            Some(channel) => channel,
            None => {
                let mut channel = Channel::new(name.to_string());
                channel.set_time(time);
                pool.add_channel(channel.clone())?;
                channel
            }
        };

        self.take_lower_time(pool, links, &mut channel, time, false);
        if channel.time == time {
            self.engine.handle_mode_string(
                pool,
                &mut channel,
                &ModeSource::Server(self.engine.me_name().to_string()),
                mode_string,
                true,
                true,
            );
        }
        pool.update_channel(channel);
        Ok(())
    }

    /// Destroy an empty channel unless a listener vetoes it
    pub fn destroy_maybe(&self, pool: &Database, channel: &Channel) -> bool {
        if !channel.is_empty() {
            return false;
        }
        if !self.events.can_destroy.iter().all(|hook| hook(channel)) {
            tracing::debug!("Destruction of {} vetoed", channel.name);
            return false;
        }
        pool.delete_channel(&channel.name);
        tracing::debug!("Destroyed empty channel {}", channel.name);
        true
    }

    /// Write a channel back, or destroy it if it emptied
    fn finish_channel(&self, pool: &Database, channel: Channel) {
        if !self.destroy_maybe(pool, &channel) {
            pool.update_channel(channel);
        }
    }

    fn need_more_params(&self, pool: &Database, uid: &str, command: &str) -> Result<()> {
        if let Some(user) = pool.lookup_user(uid) {
            user.send_numeric_message(NumericReply::need_more_params(&user.nick, command))?;
        }
        Ok(())
    }

    fn not_on_channel(&self, pool: &Database, uid: &str, name: &str) -> Result<()> {
        if let Some(user) = pool.lookup_user(uid) {
            user.send_numeric(
                NumericReply::ErrNotOnChannel,
                vec![name.to_string(), "You're not on that channel".to_string()],
            )?;
        }
        Ok(())
    }
}

/// Match a user's masks (and account tokens) against a channel list mode
pub fn user_matches_list(channel: &Channel, list: &str, user: &User) -> bool {
    channel.list_elements(list).iter().any(|entry| {
        if let Some(matched) = crate::account::account_matches(user, &entry.value) {
            return matched;
        }
        oxircd_core::matcher::mask_match(&entry.value, &user.full_mask())
            || oxircd_core::matcher::mask_match(
                &entry.value,
                &format!("{}!{}@{}", user.nick, user.ident, user.ip),
            )
    })
}
