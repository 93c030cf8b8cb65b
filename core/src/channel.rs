//! Channel entity and state
//!
//! The in-memory representation of a channel: ordered membership, the mode
//! record map, list metadata, the channel timestamp, and the serialized
//! mode-string forms. Operations on channels (join, part, modes over the
//! wire) live in the channel module; this type only enforces its own
//! invariants.

use crate::matcher;
use crate::modes::{
    prefix_symbols, status_by_name, ChannelModeType, ModeChange, ModeTable, LEVEL_BASIC,
    LEVEL_NONE,
};
use chrono::Utc;
use std::collections::HashMap;

/// One entry in a list mode's list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// The listed value: a mask for list modes, a UID for status modes
    pub value: String,
    /// Who set the entry
    pub setby: String,
    /// When the entry was set (unix seconds)
    pub time: i64,
}

/// Channel topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Topic text
    pub text: String,
    /// Who set it
    pub setby: String,
    /// When it was set (unix seconds)
    pub time: i64,
}

/// Stored state for one channel mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeRecord {
    /// Normal modes
    Simple { time: i64 },
    /// Parameter, parameter-set, and key modes
    Parametric { time: i64, parameter: String },
    /// List and status modes
    Listed { time: i64, list: Vec<ListEntry> },
}

/// Channel state
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel name (display form; pool keys are case-folded)
    pub name: String,
    /// Channel timestamp; the lower TS wins during reconciliation
    pub time: i64,
    /// Member UIDs in join order
    users: Vec<String>,
    /// Mode records by mode name
    modes: HashMap<String, ModeRecord>,
    /// Topic, if set
    topic: Option<Topic>,
}

impl Channel {
    /// Create a new channel stamped with the current time
    pub fn new(name: String) -> Self {
        Self {
            name,
            time: Utc::now().timestamp(),
            users: Vec::new(),
            modes: HashMap::new(),
            topic: None,
        }
    }

    // Simple and parametric modes

    /// Check whether a mode is set
    pub fn is_mode(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    /// Parameter of a parametric mode, if set
    pub fn mode_parameter(&self, name: &str) -> Option<&str> {
        match self.modes.get(name) {
            Some(ModeRecord::Parametric { parameter, .. }) => Some(parameter.as_str()),
            _ => None,
        }
    }

    /// Set a simple or parametric mode
    pub fn set_mode(&mut self, name: &str, parameter: Option<String>) {
        if matches!(self.modes.get(name), Some(ModeRecord::Listed { .. })) {
            tracing::warn!("Refusing set_mode on list mode {} of {}", name, self.name);
            return;
        }
        let time = Utc::now().timestamp();
        let record = match parameter {
            Some(parameter) => ModeRecord::Parametric { time, parameter },
            None => ModeRecord::Simple { time },
        };
        self.modes.insert(name.to_string(), record);
    }

    /// Unset a simple or parametric mode
    pub fn unset_mode(&mut self, name: &str) {
        if matches!(self.modes.get(name), Some(ModeRecord::Listed { .. })) {
            tracing::warn!("Refusing unset_mode on list mode {} of {}", name, self.name);
            return;
        }
        self.modes.remove(name);
    }

    // List modes

    /// Check whether a value is in a mode's list
    pub fn list_has(&self, name: &str, value: &str) -> bool {
        self.list_elements(name)
            .iter()
            .any(|e| e.value.eq_ignore_ascii_case(value))
    }

    /// Pattern-match a subject against a mode's list entries
    pub fn list_matches(&self, name: &str, subject: &str) -> bool {
        self.list_elements(name)
            .iter()
            .any(|e| matcher::mask_match(&e.value, subject))
    }

    /// Entries of a mode's list
    pub fn list_elements(&self, name: &str) -> &[ListEntry] {
        match self.modes.get(name) {
            Some(ModeRecord::Listed { list, .. }) => list.as_slice(),
            _ => &[],
        }
    }

    /// Add a value to a mode's list. Duplicates are refused.
    pub fn add_to_list(&mut self, name: &str, value: &str, setby: &str) -> bool {
        if self.list_has(name, value) {
            tracing::debug!(
                "Refusing duplicate {} list entry {} on {}",
                name,
                value,
                self.name
            );
            return false;
        }
        let time = Utc::now().timestamp();
        let record = self
            .modes
            .entry(name.to_string())
            .or_insert(ModeRecord::Listed {
                time,
                list: Vec::new(),
            });
        match record {
            ModeRecord::Listed { list, .. } => {
                list.push(ListEntry {
                    value: value.to_string(),
                    setby: setby.to_string(),
                    time,
                });
                true
            }
            _ => {
                tracing::warn!("Refusing list entry on non-list mode {} of {}", name, self.name);
                false
            }
        }
    }

    /// Remove a value from a mode's list
    pub fn remove_from_list(&mut self, name: &str, value: &str) -> bool {
        let removed = match self.modes.get_mut(name) {
            Some(ModeRecord::Listed { list, .. }) => {
                let before = list.len();
                list.retain(|e| !e.value.eq_ignore_ascii_case(value));
                before != list.len()
            }
            _ => false,
        };
        if removed {
            // drop the record once the list empties
            if self.list_elements(name).is_empty() {
                self.modes.remove(name);
            }
        }
        removed
    }

    // Membership

    /// Add a user. Returns false if already present.
    pub fn add(&mut self, uid: &str) -> bool {
        if self.has_user(uid) {
            return false;
        }
        self.users.push(uid.to_string());
        true
    }

    /// Remove a user, purging every status list first. Returns whether the
    /// user was present.
    pub fn remove(&mut self, table: &ModeTable, uid: &str) -> bool {
        for def in table.modes_of_type(ChannelModeType::Status) {
            self.remove_from_list(&def.name, uid);
        }
        let before = self.users.len();
        self.users.retain(|u| u != uid);
        before != self.users.len()
    }

    /// Check if a user is a member
    pub fn has_user(&self, uid: &str) -> bool {
        self.users.iter().any(|u| u == uid)
    }

    /// Member UIDs in join order
    pub fn members(&self) -> &[String] {
        &self.users
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.users.len()
    }

    /// Whether the channel has no members (destruction-eligible)
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    // Timestamp

    /// Set the channel time. Raising the time is suspect outside of
    /// channel creation and gets logged.
    pub fn set_time(&mut self, time: i64) {
        if time > self.time {
            tracing::warn!(
                "Channel {} time rising from {} to {}",
                self.name,
                self.time,
                time
            );
        }
        self.time = time;
    }

    // Topic

    /// Current topic
    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Set the topic
    pub fn set_topic(&mut self, text: String, setby: String) {
        self.topic = Some(Topic {
            text,
            setby,
            time: Utc::now().timestamp(),
        });
    }

    /// Drop the topic
    pub fn clear_topic(&mut self) {
        self.topic = None;
    }

    // Status queries

    /// Check if a user holds a particular status
    pub fn user_is(&self, uid: &str, status: &str) -> bool {
        self.list_has(status, uid)
    }

    /// Whether a user holds halfop-or-greater status
    pub fn user_has_basic_status(&self, uid: &str) -> bool {
        self.user_get_levels(uid).first().map(|l| *l >= LEVEL_BASIC) == Some(true)
    }

    /// All status levels a user holds, highest first
    pub fn user_get_levels(&self, uid: &str) -> Vec<i32> {
        let mut levels: Vec<i32> = crate::modes::STATUS_PREFIXES
            .iter()
            .filter(|p| self.list_has(p.name, uid))
            .map(|p| p.level)
            .collect();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        levels
    }

    /// Highest status level a user holds. `LEVEL_NONE` for a statusless
    /// member, `i32::MIN` for a non-member.
    pub fn user_get_highest_level(&self, uid: &str) -> i32 {
        if !self.has_user(uid) {
            return i32::MIN;
        }
        self.user_get_levels(uid).first().copied().unwrap_or(LEVEL_NONE)
    }

    /// Nick-list prefix symbols for a member
    pub fn prefixes(&self, uid: &str, multi_prefix: bool) -> String {
        prefix_symbols(&self.user_get_levels(uid), multi_prefix)
    }

    // Serialization

    /// Set modes of types normal, parameter, and parameter-set as a mode
    /// string with parameters. The key appears only with `show_hidden`
    /// (keys are visible only to members).
    pub fn mode_string(&self, table: &ModeTable, show_hidden: bool) -> String {
        let mut parts: Vec<(char, Option<String>)> = Vec::new();
        for (name, record) in &self.modes {
            let Some(mode_type) = table.cmode_type(name) else {
                continue;
            };
            let include = match mode_type {
                ChannelModeType::Normal
                | ChannelModeType::Parameter
                | ChannelModeType::ParameterSet => true,
                ChannelModeType::Key => show_hidden,
                _ => false,
            };
            if !include {
                continue;
            }
            let param = match record {
                ModeRecord::Parametric { parameter, .. } => Some(parameter.clone()),
                _ => None,
            };
            parts.push((table.cmode_letter(name).unwrap_or('?'), param));
        }
        parts.sort_by_key(|(letter, _)| *letter);

        let mut out = String::from("+");
        for (letter, _) in &parts {
            out.push(*letter);
        }
        for (_, param) in &parts {
            if let Some(param) = param {
                out.push(' ');
                out.push_str(param);
            }
        }
        out
    }

    /// The complete mode state in both perspectives: (client view with
    /// nicknames, server view with UIDs). `no_status` omits status modes.
    pub fn mode_string_all(
        &self,
        table: &ModeTable,
        no_status: bool,
        resolve_nick: &dyn Fn(&str) -> Option<String>,
    ) -> (String, String) {
        let mut letters = String::new();
        let mut user_params = Vec::new();
        let mut server_params = Vec::new();

        for def in self.mode_defs_sorted(table) {
            match def.mode_type {
                ChannelModeType::Normal => {
                    if self.is_mode(&def.name) {
                        letters.push(def.letter);
                    }
                }
                ChannelModeType::Parameter
                | ChannelModeType::ParameterSet
                | ChannelModeType::Key => {
                    if let Some(param) = self.mode_parameter(&def.name) {
                        letters.push(def.letter);
                        user_params.push(param.to_string());
                        server_params.push(param.to_string());
                    }
                }
                ChannelModeType::List => {
                    for entry in self.list_elements(&def.name) {
                        letters.push(def.letter);
                        user_params.push(entry.value.clone());
                        server_params.push(entry.value.clone());
                    }
                }
                ChannelModeType::Status => {
                    if no_status {
                        continue;
                    }
                    for entry in self.list_elements(&def.name) {
                        letters.push(def.letter);
                        user_params.push(
                            resolve_nick(&entry.value).unwrap_or_else(|| entry.value.clone()),
                        );
                        server_params.push(entry.value.clone());
                    }
                }
            }
        }

        (
            join_mode_string(&letters, &user_params),
            join_mode_string(&letters, &server_params),
        )
    }

    /// Status modes only, in both perspectives
    pub fn mode_string_status(
        &self,
        table: &ModeTable,
        resolve_nick: &dyn Fn(&str) -> Option<String>,
    ) -> (String, String) {
        let mut letters = String::new();
        let mut user_params = Vec::new();
        let mut server_params = Vec::new();

        for def in table.modes_of_type(ChannelModeType::Status) {
            for entry in self.list_elements(&def.name) {
                letters.push(def.letter);
                user_params
                    .push(resolve_nick(&entry.value).unwrap_or_else(|| entry.value.clone()));
                server_params.push(entry.value.clone());
            }
        }

        (
            join_mode_string(&letters, &user_params),
            join_mode_string(&letters, &server_params),
        )
    }

    /// The complete mode state as a positive change list, for bursts and
    /// TS reconciliation
    pub fn current_changes(&self, table: &ModeTable, no_status: bool) -> Vec<ModeChange> {
        let mut changes = Vec::new();
        for def in self.mode_defs_sorted(table) {
            match def.mode_type {
                ChannelModeType::Normal => {
                    if self.is_mode(&def.name) {
                        changes.push(ModeChange::new(true, &def.name, None));
                    }
                }
                ChannelModeType::Parameter
                | ChannelModeType::ParameterSet
                | ChannelModeType::Key => {
                    if let Some(param) = self.mode_parameter(&def.name) {
                        changes.push(ModeChange::new(true, &def.name, Some(param.to_string())));
                    }
                }
                ChannelModeType::List => {
                    for entry in self.list_elements(&def.name) {
                        changes.push(ModeChange::new(true, &def.name, Some(entry.value.clone())));
                    }
                }
                ChannelModeType::Status => {
                    if no_status {
                        continue;
                    }
                    for entry in self.list_elements(&def.name) {
                        changes.push(ModeChange::new(true, &def.name, Some(entry.value.clone())));
                    }
                }
            }
        }
        changes
    }

    fn mode_defs_sorted<'a>(&self, table: &'a ModeTable) -> Vec<&'a crate::modes::ModeDef> {
        let mut defs: Vec<&crate::modes::ModeDef> = [
            ChannelModeType::Normal,
            ChannelModeType::Parameter,
            ChannelModeType::ParameterSet,
            ChannelModeType::Key,
            ChannelModeType::List,
            ChannelModeType::Status,
        ]
        .iter()
        .flat_map(|t| table.modes_of_type(*t))
        .collect();
        defs.sort_by_key(|d| d.letter);
        defs
    }
}

/// Level of a status mode by name, for permission checks
pub fn status_level(name: &str) -> Option<i32> {
    status_by_name(name).map(|p| p.level)
}

fn join_mode_string(letters: &str, params: &[String]) -> String {
    let mut out = String::from("+");
    out.push_str(letters);
    for param in params {
        out.push(' ');
        out.push_str(param);
    }
    out
}
